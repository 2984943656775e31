use std::io::Error as IoError;

use err_derive::Error;

#[derive(Debug, Error)]
pub enum MpqError {
    #[error(display = "No header found")]
    NoHeader,
    #[error(display = "IO Error: {}", cause)]
    IoError { cause: IoError },
    #[error(display = "Unsupported MPQ version")]
    UnsupportedVersion,
    #[error(display = "Corrupted archive")]
    Corrupted,
    #[error(
        display = "Checksum mismatch in sector {}: expected {:08X}, got {:08X}",
        sector,
        expected,
        actual
    )]
    ChecksumMismatch {
        sector: usize,
        expected: u32,
        actual: u32,
    },
    #[error(display = "File not found")]
    FileNotFound,
    #[error(display = "Compression type unsupported: {}", kind)]
    UnsupportedCompression { kind: String },
    #[error(display = "Archive capacity exceeded: {}", reason)]
    Capacity { reason: String },
    #[error(display = "Invalid in-archive path: {}", path)]
    InvalidPath { path: String },
    #[error(display = "{} files are not named in the (listfile)", count)]
    UnlistedFiles { count: usize },
    #[error(display = "Operation cancelled")]
    Cancelled,
}

pub type Error = MpqError;

impl MpqError {
    /// Returns `true` for errors that mean the archive itself is unusable:
    /// missing header, unknown version, corrupted tables or sectors, checksum
    /// failures and codecs this crate cannot decode.
    pub fn is_format_error(&self) -> bool {
        match self {
            MpqError::NoHeader
            | MpqError::UnsupportedVersion
            | MpqError::Corrupted
            | MpqError::ChecksumMismatch { .. }
            | MpqError::UnsupportedCompression { .. } => true,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, MpqError::FileNotFound)
    }

    pub(crate) fn capacity<S: Into<String>>(reason: S) -> MpqError {
        MpqError::Capacity {
            reason: reason.into(),
        }
    }
}

impl From<IoError> for MpqError {
    fn from(other: IoError) -> Self {
        MpqError::IoError { cause: other }
    }
}
