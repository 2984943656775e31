//! Adding files to an existing archive.
//!
//! Archives are never patched in place. The listed contents are read back,
//! merged with the new files and written out as a fresh archive that keeps
//! the original format version and sector size.

use std::collections::HashSet;
use std::io::{BufWriter, Read, Seek, Write};
use std::path::Path;

use log::{debug, info, warn};
use tempfile::NamedTempFile;

use super::archive::Archive;
use super::consts::*;
use super::creator::{BuildOptions, Creator, FileOptions};
use super::error::Error;

/// Rebuilds `archive` with `new_files` merged in and writes the result to `writer`.
///
/// Every file named in the `(listfile)` is carried over with its encryption
/// flags. Files with the same name as an existing one replace it.
///
/// Nothing is written when existing data would be lost: an unreadable
/// `(listfile)` or listed file fails the rebuild, and so do files the
/// `(listfile)` doesn't name ([`Error::UnlistedFiles`]). Listed names with no
/// file behind them are skipped.
pub fn rebuild<R, W>(
    archive: &mut Archive<R>,
    new_files: Vec<(String, Vec<u8>)>,
    writer: W,
) -> Result<(), Error>
where
    R: Read + Seek,
    W: Write + Seek,
{
    let options = BuildOptions {
        version: archive.format_version(),
        sector_size_shift: archive.sector_size_shift(),
        ..BuildOptions::default()
    };
    let mut creator = Creator::new(options);

    let mut carried = HashSet::new();
    if let Some(index) = archive.block_index(LISTFILE_NAME) {
        carried.insert(index);
    }

    let existing = archive.files()?.unwrap_or_default();
    for name in &existing {
        if name.eq_ignore_ascii_case(LISTFILE_NAME) {
            continue;
        }

        let info = match archive.file_info(name) {
            Ok(info) => info,
            Err(err) if err.is_not_found() => {
                warn!("{} is listed but not in the archive, skipping", name);
                continue;
            }
            Err(err) => return Err(err),
        };
        let contents = archive.read_file(name)?;
        creator.add_file(
            name,
            contents,
            FileOptions {
                encrypt: info.is_encrypted(),
                compress: true,
                adjust_key: (info.flags & MPQ_FILE_ADJUST_KEY) != 0,
            },
        );

        if let Some(index) = archive.block_index(name) {
            carried.insert(index);
        }
    }

    let unlisted = archive.live_blocks().difference(&carried).count();
    if unlisted > 0 {
        return Err(Error::UnlistedFiles { count: unlisted });
    }

    debug!("carrying over {} files", creator.len());

    for (name, contents) in new_files {
        creator.add_file(&name, contents, FileOptions::compressed());
    }

    creator.write(writer)
}

/// Adds `new_files` to the archive at `archive_path`.
///
/// The new archive is written next to the old one and moved over it only
/// once it is complete, so a failed append leaves the original untouched.
pub fn append<P: AsRef<Path>>(
    archive_path: P,
    new_files: Vec<(String, Vec<u8>)>,
) -> Result<(), Error> {
    let archive_path = archive_path.as_ref();
    let count = new_files.len();

    let directory = match archive_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let temp = NamedTempFile::new_in(directory)?;

    {
        let mut archive = Archive::open_file(archive_path)?;
        let mut writer = BufWriter::new(temp.as_file());
        rebuild(&mut archive, new_files, &mut writer)?;
        writer.flush()?;
    }

    temp.as_file().sync_all()?;
    temp.persist(archive_path).map_err(|err| err.error)?;

    info!(
        "added {} files to {}",
        count,
        archive_path.display()
    );

    Ok(())
}
