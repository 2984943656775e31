//! Path-based operations on archive files, as exposed by the `mpqcli` tool.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;
use tempfile::NamedTempFile;

use super::archive::{Archive, ExtractReport};
use super::cancel::CancelFlag;
use super::creator::{BuildOptions, Creator};
use super::error::Error;
use super::header::FormatVersion;
use super::mutator;
use super::util::*;

/// Every file name the archive knows about, `(listfile)` included.
pub fn list_files<P: AsRef<Path>>(archive_path: P) -> Result<Vec<String>, Error> {
    let mut archive = Archive::open_file(archive_path)?;

    archive.list()
}

/// Listed names containing `pattern`, ignoring ASCII case.
pub fn search_files<P: AsRef<Path>>(archive_path: P, pattern: &str) -> Result<Vec<String>, Error> {
    let pattern = pattern.to_ascii_lowercase();

    Ok(list_files(archive_path)?
        .into_iter()
        .filter(|name| name.to_ascii_lowercase().contains(&pattern))
        .collect())
}

/// Extracts every listed file under `out_dir`.
pub fn extract_all<P, Q>(archive_path: P, out_dir: Q) -> Result<ExtractReport, Error>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let mut archive = Archive::open_file(archive_path)?;

    archive.extract_all(out_dir)
}

/// Extracts a single file, keeping its in-archive directories, and returns
/// where it was written. Without `out_dir` the current directory is used.
pub fn extract_one<P: AsRef<Path>>(
    archive_path: P,
    name: &str,
    out_dir: Option<&Path>,
) -> Result<PathBuf, Error> {
    let mut archive = Archive::open_file(archive_path)?;

    let root = out_dir.unwrap_or_else(|| Path::new("."));
    let path = archive_path_to_fs(root, &normalize_archive_path(name))?;

    // read first so a missing or broken file leaves nothing behind
    let contents = archive.read_file(name)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, contents)?;

    Ok(path)
}

/// Packs every regular file under `source_dir` into a new archive and
/// returns its path.
///
/// Without `output` the archive is written next to the source directory as
/// `<source_dir>.mpq`. An `output` lacking the `.mpq` extension gets it appended.
pub fn create_archive<P: AsRef<Path>>(
    source_dir: P,
    version: FormatVersion,
    output: Option<&Path>,
) -> Result<PathBuf, Error> {
    create_archive_cancellable(source_dir, version, output, &CancelFlag::new())
}

pub fn create_archive_cancellable<P: AsRef<Path>>(
    source_dir: P,
    version: FormatVersion,
    output: Option<&Path>,
    cancel: &CancelFlag,
) -> Result<PathBuf, Error> {
    let source_dir = source_dir.as_ref();
    let output = archive_output_path(source_dir, output)?;

    let creator = Creator::from_directory(source_dir, BuildOptions::with_version(version))?
        .with_cancel_flag(cancel.clone());

    let directory = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(directory)?;

    // nothing appears at `output` unless the whole build succeeds
    let temp = NamedTempFile::new_in(directory)?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        creator.write(&mut writer)?;
        writer.flush()?;
    }
    temp.persist(&output).map_err(|err| err.error)?;

    info!("created {}", output.display());

    Ok(output)
}

fn archive_output_path(source_dir: &Path, output: Option<&Path>) -> Result<PathBuf, Error> {
    let mut path = match output {
        Some(output) => output.to_path_buf(),
        None => {
            // "." and friends have no name of their own
            let source_dir = if source_dir.file_name().is_some() {
                source_dir.to_path_buf()
            } else {
                fs::canonicalize(source_dir)?
            };
            let name = source_dir.file_name().ok_or_else(|| Error::InvalidPath {
                path: source_dir.display().to_string(),
            })?;
            // also drops a trailing separator
            source_dir.with_file_name(name)
        }
    };

    let has_extension = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("mpq"))
        .unwrap_or(false);
    if !has_extension {
        let mut name = path.clone().into_os_string();
        name.push(".mpq");
        path = PathBuf::from(name);
    }

    Ok(path)
}

/// Adds files from disk to an existing archive.
///
/// Each source is stored under its target name, or its own file name when no
/// target is given. Either way, separators become backslashes.
pub fn add_files<P: AsRef<Path>>(
    archive_path: P,
    files: &[(&Path, Option<&str>)],
) -> Result<(), Error> {
    let mut new_files = Vec::with_capacity(files.len());

    for (source, target) in files {
        let invalid = || Error::InvalidPath {
            path: source.display().to_string(),
        };

        let name = match target {
            Some(target) => normalize_archive_path(target),
            None => source
                .file_name()
                .and_then(|name| name.to_str())
                .map(normalize_archive_path)
                .ok_or_else(invalid)?,
        };
        if name.is_empty() {
            return Err(invalid());
        }

        let contents = fs::read(source)?;
        new_files.push((name, contents));
    }

    mutator::append(archive_path, new_files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn empty_archive(path: &Path) -> Result<(), Error> {
        let mut file = BufWriter::new(File::create(path)?);
        Creator::default().write(&mut file)?;
        file.flush()?;
        Ok(())
    }

    #[test]
    fn default_output_sits_next_to_source() {
        let path = archive_output_path(Path::new("/tmp/maps/Map01"), None).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/maps/Map01.mpq"));
    }

    #[test]
    fn output_gets_an_extension() {
        let path = archive_output_path(Path::new("src"), Some(Path::new("out/data"))).unwrap();
        assert_eq!(path, PathBuf::from("out/data.mpq"));

        let path = archive_output_path(Path::new("src"), Some(Path::new("out/data.MPQ"))).unwrap();
        assert_eq!(path, PathBuf::from("out/data.MPQ"));
    }

    #[test]
    fn add_then_extract_one() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("test.mpq");
        empty_archive(&archive).unwrap();

        let source = dir.path().join("notes.txt");
        fs::write(&source, "some notes").unwrap();

        add_files(
            &archive,
            &[(source.as_path(), None), (source.as_path(), Some("docs/copy.txt"))],
        )
        .unwrap();

        assert_eq!(
            list_files(&archive).unwrap(),
            vec!["docs\\copy.txt", "notes.txt", "(listfile)"]
        );
        assert_eq!(search_files(&archive, "COPY").unwrap(), vec!["docs\\copy.txt"]);

        let out = dir.path().join("out");
        let path = extract_one(&archive, "docs/copy.txt", Some(out.as_path())).unwrap();
        assert_eq!(path, out.join("docs").join("copy.txt"));
        assert_eq!(fs::read(&path).unwrap(), b"some notes");
    }

    #[test]
    fn extract_one_missing_file_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("test.mpq");
        empty_archive(&archive).unwrap();

        let out = dir.path().join("out");
        match extract_one(&archive, "nope.txt", Some(out.as_path())) {
            Err(Error::FileNotFound) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert!(!out.join("nope.txt").exists());
    }

    #[test]
    fn unsafe_names_are_rejected() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("test.mpq");
        empty_archive(&archive).unwrap();

        match extract_one(&archive, "..\\escape.txt", Some(dir.path())) {
            Err(Error::InvalidPath { .. }) => {}
            other => panic!("unexpected {:?}", other),
        }
    }
}
