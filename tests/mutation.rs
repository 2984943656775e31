use std::fs;

use mpq_engine::{driver, mutator};
use mpq_engine::{Archive, BuildOptions, Creator, Error, FileOptions, FormatVersion};
use tempfile::TempDir;

fn build_archive(path: &std::path::Path, options: BuildOptions, files: &[(&str, Vec<u8>)]) {
    let mut creator = Creator::new(options);
    for (name, contents) in files {
        creator.add_file(name, contents.clone(), FileOptions::compressed());
    }

    let mut file = fs::File::create(path).unwrap();
    creator.write(&mut file).unwrap();
}

#[test]
fn append_adds_and_keeps_the_rest() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("map.w3x");
    let big: Vec<u8> = (0..40_000u32).map(|i| (i % 251) as u8).collect();
    let options = BuildOptions {
        version: FormatVersion::V2,
        sector_size_shift: 2,
        ..BuildOptions::default()
    };
    build_archive(
        &path,
        options,
        &[("war3map.j", big.clone()), ("scripts\\common.j", b"native".to_vec())],
    );

    mutator::append(
        &path,
        vec![
            ("war3map.lua".to_string(), b"print(1)".to_vec()),
            ("scripts/common.j".to_string(), b"replaced".to_vec()),
        ],
    )
    .unwrap();

    let mut archive = Archive::open_file(&path).unwrap();
    assert_eq!(archive.format_version(), FormatVersion::V2);
    assert_eq!(archive.sector_size_shift(), 2);
    assert_eq!(archive.read_file("war3map.lua").unwrap(), b"print(1)");
    assert_eq!(archive.read_file("war3map.j").unwrap(), big);
    assert_eq!(archive.read_file("scripts\\common.j").unwrap(), b"replaced");
    assert_eq!(
        archive.list().unwrap(),
        vec!["scripts\\common.j", "war3map.j", "war3map.lua", "(listfile)"]
    );

    let leftovers = fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(leftovers, 1);
}

#[test]
fn failed_append_leaves_the_archive_alone() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.mpq");
    build_archive(
        &path,
        BuildOptions::default(),
        &[("a.txt", b"the quick brown fox jumps over the lazy dog".repeat(100))],
    );

    // flip a byte inside the first sector of a.txt, past its offset table
    let mut data = fs::read(&path).unwrap();
    data[32 + 12 + 10] ^= 0xFF;
    fs::write(&path, &data).unwrap();

    let result = mutator::append(&path, vec![("b.txt".to_string(), b"new".to_vec())]);
    match result {
        Err(ref err) if err.is_format_error() => {}
        other => panic!("unexpected {:?}", other),
    }

    assert_eq!(fs::read(&path).unwrap(), data);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn unreadable_listfile_fails_the_append() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("many.mpq");
    let files: Vec<(String, Vec<u8>)> = (0..200)
        .map(|i| {
            (
                format!("units\\unit_{:03}.txt", i),
                format!("unit {} ", i).repeat(50).into_bytes(),
            )
        })
        .collect();
    let borrowed: Vec<(&str, Vec<u8>)> = files
        .iter()
        .map(|(name, contents)| (name.as_str(), contents.clone()))
        .collect();
    build_archive(&path, BuildOptions::default(), &borrowed);

    let info = Archive::open_file(&path)
        .unwrap()
        .file_info("(listfile)")
        .unwrap();
    assert!(info.is_compressed());

    let mut data = fs::read(&path).unwrap();
    data[(info.position + info.compressed_size / 2) as usize] ^= 0xFF;
    fs::write(&path, &data).unwrap();

    let result = mutator::append(&path, vec![("new.txt".to_string(), b"new".to_vec())]);
    match result {
        Err(ref err) if err.is_format_error() => {}
        other => panic!("unexpected {:?}", other),
    }

    assert_eq!(fs::read(&path).unwrap(), data);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    assert!(driver::list_files(&path).unwrap_err().is_format_error());
}

#[test]
fn append_to_missing_archive() {
    let dir = TempDir::new().unwrap();

    match mutator::append(dir.path().join("missing.mpq"), Vec::new()) {
        Err(Error::IoError { .. }) => {}
        other => panic!("unexpected {:?}", other),
    }
}
