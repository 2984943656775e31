use std::path::{Component, Path, PathBuf};

use super::consts::*;
use super::error::Error;

pub fn sector_count_from_size(size: u64, sector_size: u64) -> u64 {
    if size == 0 {
        0
    } else {
        ((size - 1) / sector_size) + 1
    }
}

pub fn sector_size_from_shift(shift: u16) -> u64 {
    512u64 << shift
}

/// Smallest power of two that can hold `count` entries, never below [`MIN_HASH_TABLE_SIZE`].
pub fn hash_table_size_for(count: usize) -> usize {
    count.max(MIN_HASH_TABLE_SIZE).next_power_of_two()
}

/// Converts any mix of `/` and `\` into the canonical backslash form,
/// dropping empty segments.
pub fn normalize_archive_path(name: &str) -> String {
    name.split(|c| c == '/' || c == '\\')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\\")
}

/// Maps an in-archive path onto a location under `root`.
///
/// Rejects absolute paths and anything that would climb out of `root`.
pub fn archive_path_to_fs(root: &Path, name: &str) -> Result<PathBuf, Error> {
    let invalid = || Error::InvalidPath {
        path: name.to_string(),
    };

    let mut out = root.to_path_buf();
    let mut pushed = false;
    for segment in name.split(|c| c == '/' || c == '\\') {
        if segment.is_empty() || segment == "." {
            continue;
        }

        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => {
                out.push(part);
                pushed = true;
            }
            _ => return Err(invalid()),
        }
    }

    if pushed {
        Ok(out)
    } else {
        Err(invalid())
    }
}
