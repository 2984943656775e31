use std::fs;
use std::path::Path;

use mpq_engine::driver;
use mpq_engine::{Archive, CancelFlag, Error, FormatVersion};
use tempfile::TempDir;

fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
    for (name, contents) in files {
        let path = root.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }
}

fn sample_tree() -> Vec<(&'static str, Vec<u8>)> {
    let text: Vec<u8> = b"war3map.j function main takes nothing returns nothing\r\n"
        .iter()
        .cycle()
        .take(50_000)
        .cloned()
        .collect();
    let noise: Vec<u8> = (0..9000u32)
        .map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8)
        .collect();

    vec![
        ("war3map.j", text),
        ("units/noise.bin", noise),
        ("units/deep/empty.txt", Vec::new()),
        ("readme.md", b"# hello".to_vec()),
    ]
}

#[test]
fn directory_round_trip() {
    for version in &[FormatVersion::V1, FormatVersion::V2] {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("map");
        let tree = sample_tree();
        let files: Vec<(&str, &[u8])> = tree.iter().map(|(n, c)| (*n, c.as_slice())).collect();
        write_tree(&source, &files);

        let archive = driver::create_archive(&source, *version, None).unwrap();
        assert_eq!(archive, dir.path().join("map.mpq"));

        let out = dir.path().join("out");
        let report = driver::extract_all(&archive, &out).unwrap();
        assert!(report.is_complete());
        assert_eq!(report.extracted.len(), tree.len() + 1);

        for (name, contents) in &tree {
            assert_eq!(&fs::read(out.join(name)).unwrap(), contents, "{}", name);
        }

        let opened = Archive::open_file(&archive).unwrap();
        assert_eq!(opened.format_version(), *version);
    }
}

#[test]
fn identical_input_builds_identical_archives() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("data");
    let tree = sample_tree();
    let files: Vec<(&str, &[u8])> = tree.iter().map(|(n, c)| (*n, c.as_slice())).collect();
    write_tree(&source, &files);

    let first_path = dir.path().join("a.mpq");
    let second_path = dir.path().join("b");
    let first =
        driver::create_archive(&source, FormatVersion::V2, Some(first_path.as_path())).unwrap();
    let second =
        driver::create_archive(&source, FormatVersion::V2, Some(second_path.as_path())).unwrap();

    assert_eq!(second, dir.path().join("b.mpq"));
    assert_eq!(fs::read(first).unwrap(), fs::read(second).unwrap());
}

#[test]
fn small_v2_example() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("example");
    write_tree(&source, &[("a.txt", &b"hi"[..]), ("b/c.txt", &b"world"[..])]);

    let archive = driver::create_archive(&source, FormatVersion::V2, None).unwrap();

    assert_eq!(
        driver::list_files(&archive).unwrap(),
        vec!["a.txt", "b\\c.txt", "(listfile)"]
    );
    assert_eq!(driver::search_files(&archive, "C.TXT").unwrap(), vec!["b\\c.txt"]);

    let out = dir.path().join("out");
    let path = driver::extract_one(&archive, "a.txt", Some(out.as_path())).unwrap();
    assert_eq!(fs::read(path).unwrap(), b"hi");

    let mut opened = Archive::open_file(&archive).unwrap();
    assert_eq!(opened.read_file("B/C.TXT").unwrap(), b"world");
    match opened.read_file("missing.txt") {
        Err(Error::FileNotFound) => {}
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn missing_source_directory() {
    let dir = TempDir::new().unwrap();

    match driver::create_archive(dir.path().join("nope"), FormatVersion::V1, None) {
        Err(Error::IoError { .. }) => {}
        other => panic!("unexpected {:?}", other),
    }
    assert!(!dir.path().join("nope.mpq").exists());
}

#[test]
fn cancelled_build_leaves_nothing_behind() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("data");
    write_tree(&source, &[("a.txt", &b"hi"[..])]);

    let cancel = CancelFlag::new();
    cancel.cancel();

    match driver::create_archive_cancellable(&source, FormatVersion::V1, None, &cancel) {
        Err(Error::Cancelled) => {}
        other => panic!("unexpected {:?}", other),
    }

    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(leftovers, vec![std::ffi::OsString::from("data")]);
}

#[test]
fn not_an_archive() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("junk.mpq");
    fs::write(&path, vec![0u8; 4096]).unwrap();

    match driver::list_files(&path) {
        Err(err) => assert!(err.is_format_error(), "{:?}", err),
        Ok(files) => panic!("unexpected {:?}", files),
    }
}
