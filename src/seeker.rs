use std::io::{Read, Seek, SeekFrom};

use byteorder::{ReadBytesExt, LE};
use log::debug;

use super::consts::*;
use super::error::Error;
use super::header::*;
use super::util::*;

#[derive(Debug)]
pub(crate) struct Seeker<R: Read + Seek> {
    reader: R,
    archive_info: ArchiveInfo,
}

impl<R: Read + Seek> Seeker<R> {
    pub fn new(mut reader: R) -> Result<Seeker<R>, Error> {
        let archive_info = find_headers(&mut reader)?;

        Ok(Seeker {
            reader,
            archive_info,
        })
    }

    fn archive_offset(&self, offset: u64) -> u64 {
        offset + self.archive_info.header_offset
    }

    pub fn info(&self) -> &ArchiveInfo {
        &self.archive_info
    }

    /// Reads `size` bytes at an archive-relative `offset`.
    pub fn read(&mut self, offset: u64, size: u64) -> Result<Vec<u8>, Error> {
        let offset = self.archive_offset(offset);

        match offset.checked_add(size) {
            Some(end) if end <= self.archive_info.file_size => {}
            _ => return Err(Error::Corrupted),
        }

        self.reader.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; size as usize];
        self.reader.read_exact(&mut buf)?;

        Ok(buf)
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

#[derive(Debug, Copy, Clone)]
pub(crate) struct TableInfo {
    pub entries: u64,
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug)]
pub(crate) struct ArchiveInfo {
    pub hash_table_info: TableInfo,
    pub block_table_info: TableInfo,
    pub hi_block_table_info: Option<TableInfo>,

    pub format_version: FormatVersion,
    pub sector_size_shift: u16,
    pub sector_size: u64,
    pub file_size: u64,
    pub archive_size: u64,
    pub header_offset: u64,
}

impl ArchiveInfo {
    fn new(file_size: u64, header_offset: u64, header: &FileHeader) -> Result<ArchiveInfo, Error> {
        let hash_entries = u64::from(header.hash_table_entries);
        let block_entries = u64::from(header.block_table_entries);

        if !hash_entries.is_power_of_two() || block_entries > hash_entries {
            return Err(Error::Corrupted);
        }

        let hash_table_info = TableInfo {
            entries: hash_entries,
            offset: header.hash_table_offset,
            size: hash_entries * HASH_TABLE_ENTRY_SIZE,
        };

        let block_table_info = TableInfo {
            entries: block_entries,
            offset: header.block_table_offset,
            size: block_entries * BLOCK_TABLE_ENTRY_SIZE,
        };

        let hi_block_table_info = if header.hi_block_table_offset != 0 {
            Some(TableInfo {
                entries: block_entries,
                offset: header.hi_block_table_offset,
                size: block_entries * HI_BLOCK_TABLE_ENTRY_SIZE,
            })
        } else {
            None
        };

        let tables = [Some(hash_table_info), Some(block_table_info), hi_block_table_info];
        for table in tables.iter().flatten() {
            let end = header_offset + table.offset + table.size;
            if end > file_size {
                return Err(Error::Corrupted);
            }
        }

        Ok(ArchiveInfo {
            hash_table_info,
            block_table_info,
            hi_block_table_info,
            format_version: header.format_version,
            sector_size_shift: header.sector_size_shift,
            sector_size: sector_size_from_shift(header.sector_size_shift),
            file_size,
            archive_size: u64::from(header.archive_size),
            header_offset,
        })
    }
}

fn find_headers<R: Read + Seek>(mut reader: R) -> Result<ArchiveInfo, Error> {
    let file_size = reader.seek(SeekFrom::End(0))?;

    let mut candidate_offset = 0;
    while candidate_offset + u64::from(HEADER_MPQ_SIZE_V1) <= file_size {
        reader.seek(SeekFrom::Start(candidate_offset))?;

        let magic = reader.read_u32::<LE>()?;

        if magic == HEADER_USER_MAGIC {
            let user_header = UserHeader::new(&mut reader)?;
            let file_header_offset = u64::from(user_header.file_header_offset) + candidate_offset;
            debug!(
                "user data header at {:#x} ({} bytes), archive at {:#x}",
                candidate_offset, user_header.user_data_size, file_header_offset
            );

            if file_header_offset + 4 > file_size {
                return Err(Error::Corrupted);
            }

            reader.seek(SeekFrom::Start(file_header_offset))?;
            if reader.read_u32::<LE>()? != HEADER_MPQ_MAGIC {
                return Err(Error::Corrupted);
            }

            let header = FileHeader::from_reader(&mut reader)?;
            return ArchiveInfo::new(file_size, file_header_offset, &header);
        } else if magic == HEADER_MPQ_MAGIC {
            let header = FileHeader::from_reader(&mut reader)?;
            debug!(
                "archive header at {:#x}, version {}",
                candidate_offset,
                header.format_version.number()
            );

            return ArchiveInfo::new(file_size, candidate_offset, &header);
        }

        candidate_offset += HEADER_BOUNDARY;
    }

    Err(Error::NoHeader)
}
