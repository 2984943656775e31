use std::io::Error as IoError;
use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};

use super::consts::*;
use super::error::MpqError;

/// On-disk format version of an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FormatVersion {
    /// Original format with a 32-byte header.
    V1,
    /// Adds the hi-block table and 48-bit table offsets, 44-byte header.
    V2,
}

impl Default for FormatVersion {
    fn default() -> FormatVersion {
        FormatVersion::V1
    }
}

impl FormatVersion {
    /// Maps the user-facing version number (`1` or `2`).
    pub fn from_number(number: u32) -> Option<FormatVersion> {
        match number {
            1 => Some(FormatVersion::V1),
            2 => Some(FormatVersion::V2),
            _ => None,
        }
    }

    pub fn number(self) -> u32 {
        match self {
            FormatVersion::V1 => 1,
            FormatVersion::V2 => 2,
        }
    }

    pub(crate) fn from_raw(raw: u16) -> Result<FormatVersion, MpqError> {
        match raw {
            0 => Ok(FormatVersion::V1),
            1 => Ok(FormatVersion::V2),
            _ => Err(MpqError::UnsupportedVersion),
        }
    }

    pub(crate) fn raw(self) -> u16 {
        match self {
            FormatVersion::V1 => 0,
            FormatVersion::V2 => 1,
        }
    }

    pub(crate) fn header_size(self) -> u32 {
        match self {
            FormatVersion::V1 => HEADER_MPQ_SIZE_V1,
            FormatVersion::V2 => HEADER_MPQ_SIZE_V2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FileHeader {
    pub header_size: u32,
    pub archive_size: u32,
    pub format_version: FormatVersion,
    pub sector_size_shift: u16,
    pub hash_table_offset: u64,
    pub block_table_offset: u64,
    pub hash_table_entries: u32,
    pub block_table_entries: u32,
    pub hi_block_table_offset: u64,
}

impl FileHeader {
    /// Reads everything after the magic.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<FileHeader, MpqError> {
        let header_size = reader.read_u32::<LE>()?;
        let archive_size = reader.read_u32::<LE>()?;
        let format_version = FormatVersion::from_raw(reader.read_u16::<LE>()?)?;
        let sector_size_shift = reader.read_u16::<LE>()?;
        let hash_table_offset = reader.read_u32::<LE>()?;
        let block_table_offset = reader.read_u32::<LE>()?;
        let hash_table_entries = reader.read_u32::<LE>()?;
        let block_table_entries = reader.read_u32::<LE>()?;

        if header_size < format_version.header_size() || sector_size_shift > MAX_SECTOR_SIZE_SHIFT
        {
            return Err(MpqError::Corrupted);
        }

        let mut header = FileHeader {
            header_size,
            archive_size,
            format_version,
            sector_size_shift,
            hash_table_offset: u64::from(hash_table_offset),
            block_table_offset: u64::from(block_table_offset),
            hash_table_entries,
            block_table_entries,
            hi_block_table_offset: 0,
        };

        if format_version == FormatVersion::V2 {
            header.hi_block_table_offset = reader.read_u64::<LE>()?;
            let hash_table_offset_hi = reader.read_u16::<LE>()?;
            let block_table_offset_hi = reader.read_u16::<LE>()?;

            header.hash_table_offset |= u64::from(hash_table_offset_hi) << 32;
            header.block_table_offset |= u64::from(block_table_offset_hi) << 32;
        }

        Ok(header)
    }

    pub fn write<W: Write>(&self, mut writer: W) -> Result<(), IoError> {
        writer.write_u32::<LE>(HEADER_MPQ_MAGIC)?;
        writer.write_u32::<LE>(self.header_size)?;
        writer.write_u32::<LE>(self.archive_size)?;
        writer.write_u16::<LE>(self.format_version.raw())?;
        writer.write_u16::<LE>(self.sector_size_shift)?;
        writer.write_u32::<LE>(self.hash_table_offset as u32)?;
        writer.write_u32::<LE>(self.block_table_offset as u32)?;
        writer.write_u32::<LE>(self.hash_table_entries)?;
        writer.write_u32::<LE>(self.block_table_entries)?;

        if self.format_version == FormatVersion::V2 {
            writer.write_u64::<LE>(self.hi_block_table_offset)?;
            writer.write_u16::<LE>((self.hash_table_offset >> 32) as u16)?;
            writer.write_u16::<LE>((self.block_table_offset >> 32) as u16)?;
        }

        Ok(())
    }
}

#[derive(Debug)]
pub struct UserHeader {
    pub(crate) user_data_size: u32,
    pub(crate) file_header_offset: u32,
}

impl UserHeader {
    pub fn new<R: Read>(mut reader: R) -> Result<UserHeader, MpqError> {
        let user_data_size = reader.read_u32::<LE>()?;
        let file_header_offset = reader.read_u32::<LE>()?;

        Ok(UserHeader {
            user_data_size,
            file_header_offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(version: FormatVersion) -> FileHeader {
        FileHeader {
            header_size: version.header_size(),
            archive_size: 0x1234,
            format_version: version,
            sector_size_shift: DEFAULT_SECTOR_SIZE_SHIFT,
            hash_table_offset: 0x1000,
            block_table_offset: 0x1100,
            hash_table_entries: 16,
            block_table_entries: 3,
            hi_block_table_offset: 0,
        }
    }

    #[test]
    fn v1_layout_is_32_bytes() {
        let mut buf = Vec::new();
        sample(FormatVersion::V1).write(&mut buf).unwrap();

        assert_eq!(buf.len(), 32);
        assert_eq!(&buf[0..4], b"MPQ\x1A");
        assert_eq!(&buf[4..8], &32u32.to_le_bytes());
        assert_eq!(&buf[12..14], &0u16.to_le_bytes());
        assert_eq!(&buf[14..16], &3u16.to_le_bytes());
        assert_eq!(&buf[24..28], &16u32.to_le_bytes());
    }

    #[test]
    fn v2_carries_high_offset_bits() {
        let mut header = sample(FormatVersion::V2);
        header.block_table_offset = 0x0002_0000_1100;
        header.hi_block_table_offset = 0x0002_0000_2000;

        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        assert_eq!(buf.len(), 44);

        let parsed = FileHeader::from_reader(&buf[4..]).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn unknown_versions_are_rejected() {
        let mut buf = Vec::new();
        sample(FormatVersion::V1).write(&mut buf).unwrap();
        buf[12] = 3;

        match FileHeader::from_reader(&buf[4..]) {
            Err(MpqError::UnsupportedVersion) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn version_numbers() {
        assert_eq!(FormatVersion::from_number(2), Some(FormatVersion::V2));
        assert_eq!(FormatVersion::from_number(4), None);
        assert_eq!(FormatVersion::V1.number(), 1);
    }
}
