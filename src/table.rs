use std::io::Error as IoError;
use std::io::{Read, Seek, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};

use super::consts::*;
use super::crypto::*;
use super::error::Error;
use super::seeker::*;

/// The three hashes that place a file name in the hash table.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub(crate) struct FileKey {
    pub hash_a: u32,
    pub hash_b: u32,
    pub index: u32,
}

impl FileKey {
    pub fn new(name: &str) -> FileKey {
        let hash_a = hash_string(name.as_bytes(), MPQ_HASH_NAME_A);
        let hash_b = hash_string(name.as_bytes(), MPQ_HASH_NAME_B);
        let index = hash_string(name.as_bytes(), MPQ_HASH_TABLE_INDEX);

        FileKey {
            hash_a,
            hash_b,
            index,
        }
    }
}

/// Open-addressed table with linear probing.
///
/// Deleted slots stay in place as tombstones: lookups probe past them and
/// inserts may reuse them, but the table is never compacted.
#[derive(Debug, Clone)]
pub(crate) struct FileHashTable {
    entries: Vec<HashEntry>,
}

impl FileHashTable {
    pub fn new(size: usize) -> Result<FileHashTable, Error> {
        if !size.is_power_of_two() {
            return Err(Error::capacity(format!(
                "hash table size {} is not a power of two",
                size
            )));
        }

        Ok(FileHashTable {
            entries: vec![HashEntry::blank(); size],
        })
    }

    pub fn from_seeker<R>(seeker: &mut Seeker<R>) -> Result<FileHashTable, Error>
    where
        R: Read + Seek,
    {
        let info = seeker.info().hash_table_info;
        let mut raw_data = seeker.read(info.offset, info.size)?;
        decrypt_mpq_block(&mut raw_data, HASH_TABLE_KEY);

        let mut entries = Vec::with_capacity(info.entries as usize);
        let mut slice = &raw_data[..];
        for _ in 0..info.entries {
            entries.push(HashEntry::from_reader(&mut slice)?);
        }

        Ok(FileHashTable { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[HashEntry] {
        &self.entries
    }

    fn mask(&self) -> usize {
        self.entries.len() - 1
    }

    /// Walks the probe chain for `key` and returns the slot holding it.
    ///
    /// A language-neutral entry wins over a localized one with the same name.
    fn slot_of(&self, key: &FileKey) -> Option<usize> {
        let hash_mask = self.mask();
        let start_index = key.index as usize & hash_mask;
        let mut index = start_index;
        let mut localized = None;

        loop {
            let inspected = &self.entries[index];

            if inspected.is_empty() {
                break;
            }

            if !inspected.is_deleted()
                && inspected.hash_a == key.hash_a
                && inspected.hash_b == key.hash_b
            {
                if inspected.locale == 0 {
                    return Some(index);
                }
                localized = localized.or(Some(index));
            }

            index = (index + 1) & hash_mask;
            if index == start_index {
                break;
            }
        }

        localized
    }

    pub fn find_entry(&self, name: &str) -> Option<&HashEntry> {
        self.slot_of(&FileKey::new(name))
            .map(|slot| &self.entries[slot])
    }

    pub fn locate(&self, name: &str) -> Option<u32> {
        self.find_entry(name).map(|entry| entry.block_index)
    }

    /// Points `name` at `block_index`.
    ///
    /// A name that is already present is updated in place, otherwise the first
    /// empty or deleted slot on its probe chain is taken.
    pub fn insert(&mut self, name: &str, block_index: u32) -> Result<(), Error> {
        self.insert_key(&FileKey::new(name), block_index)
    }

    pub fn insert_key(&mut self, key: &FileKey, block_index: u32) -> Result<(), Error> {
        if block_index >= HASH_TABLE_DELETED_ENTRY {
            return Err(Error::capacity("block index collides with a sentinel value"));
        }

        if let Some(slot) = self.slot_of(key) {
            self.entries[slot].block_index = block_index;
            return Ok(());
        }

        let hash_mask = self.mask();
        let start_index = key.index as usize & hash_mask;
        let mut index = start_index;

        loop {
            if self.entries[index].is_free() {
                self.entries[index] = HashEntry::new(key.hash_a, key.hash_b, block_index);
                return Ok(());
            }

            index = (index + 1) & hash_mask;
            if index == start_index {
                return Err(Error::capacity(format!(
                    "hash table is full ({} entries)",
                    self.entries.len()
                )));
            }
        }
    }

    /// Marks the slot of `name` as deleted and returns the block it pointed at.
    #[cfg(test)]
    pub fn remove(&mut self, name: &str) -> Option<u32> {
        let slot = self.slot_of(&FileKey::new(name))?;
        let block_index = self.entries[slot].block_index;
        self.entries[slot].block_index = HASH_TABLE_DELETED_ENTRY;

        Some(block_index)
    }

    pub fn write<W: Write>(&self, mut writer: W) -> Result<(), IoError> {
        let mut buf = vec![0u8; self.entries.len() * HASH_TABLE_ENTRY_SIZE as usize];

        let mut cursor = buf.as_mut_slice();
        for entry in &self.entries {
            entry.write(&mut cursor)?;
        }
        encrypt_mpq_block(&mut buf, HASH_TABLE_KEY);

        writer.write_all(&buf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HashEntry {
    pub hash_a: u32,
    pub hash_b: u32,
    pub locale: u16,
    pub platform: u16,
    pub block_index: u32,
}

impl HashEntry {
    pub fn new(hash_a: u32, hash_b: u32, block_index: u32) -> HashEntry {
        HashEntry {
            hash_a,
            hash_b,
            locale: 0,
            platform: 0,
            block_index,
        }
    }

    pub fn from_reader<R: Read>(mut reader: R) -> Result<HashEntry, Error> {
        let hash_a = reader.read_u32::<LE>()?;
        let hash_b = reader.read_u32::<LE>()?;
        let locale = reader.read_u16::<LE>()?;
        let platform = reader.read_u16::<LE>()?;
        let block_index = reader.read_u32::<LE>()?;

        Ok(HashEntry {
            hash_a,
            hash_b,
            locale,
            platform,
            block_index,
        })
    }

    pub fn blank() -> HashEntry {
        HashEntry {
            hash_a: 0xFFFF_FFFF,
            hash_b: 0xFFFF_FFFF,
            locale: 0xFFFF,
            platform: 0x00FF,
            block_index: HASH_TABLE_EMPTY_ENTRY,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.block_index == HASH_TABLE_EMPTY_ENTRY
    }

    pub fn is_deleted(&self) -> bool {
        self.block_index == HASH_TABLE_DELETED_ENTRY
    }

    pub fn is_free(&self) -> bool {
        self.is_empty() || self.is_deleted()
    }

    pub fn write<W: Write>(&self, mut writer: W) -> Result<(), IoError> {
        writer.write_u32::<LE>(self.hash_a)?;
        writer.write_u32::<LE>(self.hash_b)?;
        writer.write_u16::<LE>(self.locale)?;
        writer.write_u16::<LE>(self.platform)?;
        writer.write_u32::<LE>(self.block_index)?;

        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FileBlockTable {
    entries: Vec<BlockEntry>,
}

impl FileBlockTable {
    pub fn from_seeker<R>(seeker: &mut Seeker<R>) -> Result<FileBlockTable, Error>
    where
        R: Read + Seek,
    {
        let info = seeker.info().block_table_info;
        let mut raw_data = seeker.read(info.offset, info.size)?;
        decrypt_mpq_block(&mut raw_data, BLOCK_TABLE_KEY);

        let mut entries = Vec::with_capacity(info.entries as usize);
        let mut slice = &raw_data[..];
        for _ in 0..info.entries {
            entries.push(BlockEntry::from_reader(&mut slice)?);
        }

        // v2 keeps bits 32..48 of every file position in a separate table
        if let Some(hi_info) = seeker.info().hi_block_table_info {
            let raw_data = seeker.read(hi_info.offset, hi_info.size)?;
            let mut slice = &raw_data[..];
            for entry in entries.iter_mut() {
                let hi = slice.read_u16::<LE>()?;
                entry.file_pos |= u64::from(hi) << 32;
            }
        }

        Ok(FileBlockTable { entries })
    }

    pub fn get(&self, index: usize) -> Option<&BlockEntry> {
        self.entries.get(index)
    }

    pub fn push(&mut self, entry: BlockEntry) -> u32 {
        self.entries.push(entry);
        (self.entries.len() - 1) as u32
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn needs_hi_block_table(&self) -> bool {
        self.entries.iter().any(|e| e.file_pos > u64::from(u32::MAX))
    }

    pub fn write<W: Write>(&self, mut writer: W) -> Result<(), IoError> {
        let mut buf = vec![0u8; self.entries.len() * BLOCK_TABLE_ENTRY_SIZE as usize];

        let mut cursor = buf.as_mut_slice();
        for entry in &self.entries {
            entry.write(&mut cursor)?;
        }
        encrypt_mpq_block(&mut buf, BLOCK_TABLE_KEY);

        writer.write_all(&buf)
    }

    pub fn write_hi_block_table<W: Write>(&self, mut writer: W) -> Result<(), IoError> {
        for entry in &self.entries {
            writer.write_u16::<LE>((entry.file_pos >> 32) as u16)?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BlockEntry {
    pub file_pos: u64,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub flags: u32,
}

impl BlockEntry {
    pub fn new(
        file_pos: u64,
        compressed_size: u64,
        uncompressed_size: u64,
        flags: u32,
    ) -> BlockEntry {
        BlockEntry {
            file_pos,
            compressed_size,
            uncompressed_size,
            flags,
        }
    }

    pub fn from_reader<R: Read>(mut reader: R) -> Result<BlockEntry, Error> {
        let file_pos = u64::from(reader.read_u32::<LE>()?);
        let compressed_size = u64::from(reader.read_u32::<LE>()?);
        let uncompressed_size = u64::from(reader.read_u32::<LE>()?);
        let flags = reader.read_u32::<LE>()?;

        Ok(BlockEntry {
            file_pos,
            compressed_size,
            uncompressed_size,
            flags,
        })
    }

    /// Writes the low 32 bits of the position; the rest goes to the hi-block table.
    pub fn write<W: Write>(&self, mut writer: W) -> Result<(), IoError> {
        writer.write_u32::<LE>(self.file_pos as u32)?;
        writer.write_u32::<LE>(self.compressed_size as u32)?;
        writer.write_u32::<LE>(self.uncompressed_size as u32)?;
        writer.write_u32::<LE>(self.flags)?;

        Ok(())
    }

    pub fn exists(&self) -> bool {
        (self.flags & MPQ_FILE_EXISTS) != 0
    }

    pub fn is_imploded(&self) -> bool {
        (self.flags & MPQ_FILE_IMPLODE) != 0
    }

    pub fn is_compressed(&self) -> bool {
        (self.flags & MPQ_FILE_COMPRESS) != 0
    }

    pub fn is_encrypted(&self) -> bool {
        (self.flags & MPQ_FILE_ENCRYPTED) != 0
    }

    pub fn is_key_adjusted(&self) -> bool {
        (self.flags & MPQ_FILE_ADJUST_KEY) != 0
    }

    pub fn is_single_unit(&self) -> bool {
        (self.flags & MPQ_FILE_SINGLE_UNIT) != 0
    }

    pub fn has_sector_crc(&self) -> bool {
        (self.flags & MPQ_FILE_SECTOR_CRC) != 0
    }
}

/// Sector offset table of a compressed file.
///
/// Offsets are relative to the file start. With sector checksums enabled one
/// extra entry marks the end of the checksum table that follows the sectors.
#[derive(Debug)]
pub(crate) struct SectorOffsets {
    offsets: Vec<u32>,
    sector_count: usize,
}

impl SectorOffsets {
    pub fn from_offsets(offsets: Vec<u32>, sector_count: usize) -> SectorOffsets {
        SectorOffsets {
            offsets,
            sector_count,
        }
    }

    pub fn from_seeker<R>(
        seeker: &mut Seeker<R>,
        block_entry: &BlockEntry,
        sector_count: usize,
        encryption_key: Option<u32>,
    ) -> Result<SectorOffsets, Error>
    where
        R: Read + Seek,
    {
        let entry_count = Self::entry_count(sector_count, block_entry.has_sector_crc());
        let mut raw_data = seeker.read(block_entry.file_pos, entry_count as u64 * 4)?;

        if let Some(encryption_key) = encryption_key {
            decrypt_mpq_block(&mut raw_data, encryption_key);
        }

        let mut slice = &raw_data[..];
        let mut offsets = Vec::with_capacity(entry_count);
        for _ in 0..entry_count {
            offsets.push(slice.read_u32::<LE>()?);
        }

        let well_formed = offsets[0] as usize >= entry_count * 4
            && offsets.windows(2).all(|pair| pair[0] <= pair[1])
            && u64::from(offsets[sector_count]) <= block_entry.compressed_size;
        if !well_formed {
            return Err(Error::Corrupted);
        }

        Ok(SectorOffsets::from_offsets(offsets, sector_count))
    }

    pub fn entry_count(sector_count: usize, with_crc: bool) -> usize {
        sector_count + if with_crc { 2 } else { 1 }
    }

    /// Offset and stored length of sector `index`.
    pub fn one(&self, index: usize) -> Option<(u32, u32)> {
        if index >= self.sector_count {
            None
        } else {
            Some((
                self.offsets[index],
                self.offsets[index + 1] - self.offsets[index],
            ))
        }
    }

    /// Offset and length of the checksum table, if there is one.
    pub fn checksums(&self) -> Option<(u32, u32)> {
        if self.offsets.len() == self.sector_count + 2 {
            let start = self.offsets[self.sector_count];
            Some((start, self.offsets[self.sector_count + 1] - start))
        } else {
            None
        }
    }

    pub fn count(&self) -> usize {
        self.sector_count
    }

    pub fn to_bytes(&self, encryption_key: Option<u32>) -> Result<Vec<u8>, IoError> {
        let mut buf = Vec::with_capacity(self.offsets.len() * 4);
        for offset in &self.offsets {
            buf.write_u32::<LE>(*offset)?;
        }

        if let Some(key) = encryption_key {
            encrypt_mpq_block(&mut buf, key);
        }

        Ok(buf)
    }
}
