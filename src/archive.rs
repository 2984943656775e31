use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Error as IoError;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use log::{debug, warn};

use super::cancel::CancelFlag;
use super::codec::*;
use super::consts::*;
use super::crypto::*;
use super::error::*;
use super::header::FormatVersion;
use super::seeker::*;
use super::table::*;
use super::util::*;

#[derive(Debug)]
/// Implementation of a MoPaQ archive viewer.
///
/// Refer to top-level documentation to see which features are supported.
///
/// Will work on any reader that implements `Read + Seek`. A handle owns its
/// reader, so concurrent readers each open their own handle.
pub struct Archive<R: Read + Seek> {
    seeker: Seeker<R>,
    hash_table: FileHashTable,
    block_table: FileBlockTable,
}

/// Block table metadata of a single archived file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    /// Offset of the file data from the archive start.
    pub position: u64,
    /// Bytes occupied in the archive, sector offset table included.
    pub compressed_size: u64,
    /// Size of the extracted file.
    pub size: u64,
    pub flags: u32,
}

impl FileInfo {
    pub fn is_compressed(&self) -> bool {
        (self.flags & MPQ_FILE_COMPRESS) != 0
    }

    pub fn is_encrypted(&self) -> bool {
        (self.flags & MPQ_FILE_ENCRYPTED) != 0
    }

    pub fn is_single_unit(&self) -> bool {
        (self.flags & MPQ_FILE_SINGLE_UNIT) != 0
    }

    pub fn has_sector_crc(&self) -> bool {
        (self.flags & MPQ_FILE_SECTOR_CRC) != 0
    }
}

/// Outcome of [`Archive::extract_all`]: what was written and what could not be read.
#[derive(Debug, Default)]
pub struct ExtractReport {
    /// In-archive name and number of bytes written.
    pub extracted: Vec<(String, u64)>,
    pub failed: Vec<(String, Error)>,
}

impl ExtractReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

// Keeps archive-side failures apart from failures of the destination writer.
enum ExtractError {
    Archive(Error),
    Sink(IoError),
}

impl From<Error> for ExtractError {
    fn from(other: Error) -> Self {
        ExtractError::Archive(other)
    }
}

impl From<ExtractError> for Error {
    fn from(other: ExtractError) -> Self {
        match other {
            ExtractError::Archive(err) => err,
            ExtractError::Sink(cause) => Error::IoError { cause },
        }
    }
}

impl Archive<BufReader<File>> {
    /// Opens the archive stored at `path`.
    pub fn open_file<P: AsRef<Path>>(path: P) -> Result<Archive<BufReader<File>>, Error> {
        let file = File::open(path)?;
        Archive::open(BufReader::new(file))
    }
}

impl<R: Read + Seek> Archive<R> {
    /// Try to open an MPQ archive from the specified `reader`.
    ///
    /// Immediately, this will perform the following:
    ///
    /// 1. Locate an MPQ header.
    /// 2. Check that both tables fit inside the file.
    /// 3. Locate and read the Hash Table.
    /// 4. Locate and read the Block Table (and the hi-block table for v2).
    ///
    /// If any of these steps fail, the archive is deemed corrupted and
    /// an appropriate error is returned.
    ///
    /// No other operations will be performed.
    pub fn open(reader: R) -> Result<Archive<R>, Error> {
        let mut seeker = Seeker::new(reader)?;

        let hash_table = FileHashTable::from_seeker(&mut seeker)?;
        let block_table = FileBlockTable::from_seeker(&mut seeker)?;

        debug!(
            "opened v{} archive: {} hash slots, {} blocks, {} byte sectors",
            seeker.info().format_version.number(),
            hash_table.len(),
            block_table.len(),
            seeker.info().sector_size
        );

        Ok(Archive {
            seeker,
            hash_table,
            block_table,
        })
    }

    pub fn format_version(&self) -> FormatVersion {
        self.seeker.info().format_version
    }

    pub fn sector_size_shift(&self) -> u16 {
        self.seeker.info().sector_size_shift
    }

    pub fn sector_size(&self) -> u64 {
        self.seeker.info().sector_size
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_ok()
    }

    pub fn file_info(&self, name: &str) -> Result<FileInfo, Error> {
        let block_entry = self.lookup(name)?;

        Ok(FileInfo {
            position: block_entry.file_pos,
            compressed_size: block_entry.compressed_size,
            size: block_entry.uncompressed_size,
            flags: block_entry.flags,
        })
    }

    pub fn into_inner(self) -> R {
        self.seeker.into_inner()
    }

    fn lookup(&self, name: &str) -> Result<&BlockEntry, Error> {
        // find the hash entry and use it to find the block entry
        let block_index = self.hash_table.locate(name).ok_or(Error::FileNotFound)?;
        let block_entry = self
            .block_table
            .get(block_index as usize)
            .ok_or(Error::FileNotFound)?;

        if !block_entry.exists() {
            return Err(Error::FileNotFound);
        }

        Ok(block_entry)
    }

    /// Read a file's contents.
    ///
    /// Notably, the filename resolution algorithm
    /// is case-insensitive, and will treat backslashes (`\`) and forward slashes (`/`)
    /// as the same character.
    pub fn read_file(&mut self, name: &str) -> Result<Vec<u8>, Error> {
        let mut result = Vec::new();
        self.extract_to(name, &mut result)?;

        Ok(result)
    }

    /// Streams a file's contents into `writer` one sector at a time and
    /// returns the number of bytes written.
    pub fn extract_to<W: Write>(&mut self, name: &str, mut writer: W) -> Result<u64, Error> {
        let written = self.extract_sectors(name, &mut |sector| writer.write_all(sector))?;

        Ok(written)
    }

    fn extract_sectors(
        &mut self,
        name: &str,
        sink: &mut dyn FnMut(&[u8]) -> Result<(), IoError>,
    ) -> Result<u64, ExtractError> {
        let block_entry = self.lookup(name)?.clone();

        if block_entry.uncompressed_size == 0 {
            return Ok(0);
        }

        if block_entry.is_imploded() {
            return Err(Error::UnsupportedCompression {
                kind: "PKWare DCL".to_string(),
            }
            .into());
        }

        // calculate the file key
        let encryption_key = if block_entry.is_encrypted() {
            Some(calculate_file_key(
                name,
                block_entry.file_pos as u32,
                block_entry.uncompressed_size as u32,
                block_entry.is_key_adjusted(),
            ))
        } else {
            None
        };

        let sector_size = self.seeker.info().sector_size;
        let file_size = block_entry.uncompressed_size;
        let mut written = 0u64;

        if block_entry.is_single_unit() {
            let mut data = self
                .seeker
                .read(block_entry.file_pos, block_entry.compressed_size)?;

            if let Some(key) = encryption_key {
                decrypt_mpq_block(&mut data, key);
            }

            let decoded = decompress_sector(
                &data,
                block_entry.is_compressed() && block_entry.compressed_size < file_size,
                file_size,
            )?;
            sink(&decoded).map_err(ExtractError::Sink)?;
            written += decoded.len() as u64;
        } else if block_entry.is_compressed() {
            let sector_count = sector_count_from_size(file_size, sector_size) as usize;
            let sector_offsets = SectorOffsets::from_seeker(
                &mut self.seeker,
                &block_entry,
                sector_count,
                encryption_key.map(|k| k.wrapping_sub(1)),
            )?;
            let checksums = self.read_checksums(&block_entry, &sector_offsets)?;

            for i in 0..sector_offsets.count() {
                let (offset, length) = sector_offsets.one(i).ok_or(Error::Corrupted)?;
                let mut raw = self
                    .seeker
                    .read(block_entry.file_pos + u64::from(offset), u64::from(length))?;

                if let Some(key) = encryption_key {
                    decrypt_mpq_block(&mut raw, key.wrapping_add(i as u32));
                }

                // the last sector of a file is usually short
                let expected = sector_size.min(file_size - i as u64 * sector_size);
                let sector = decode_sector(&raw, expected)?;

                if let Some(checksums) = &checksums {
                    verify_checksum(i, checksums[i], &sector)?;
                }

                sink(&sector).map_err(ExtractError::Sink)?;
                written += sector.len() as u64;
            }
        } else {
            let sector_count = sector_count_from_size(file_size, sector_size);

            for i in 0..sector_count {
                let expected = sector_size.min(file_size - i * sector_size);
                let mut sector = self
                    .seeker
                    .read(block_entry.file_pos + i * sector_size, expected)?;

                if let Some(key) = encryption_key {
                    decrypt_mpq_block(&mut sector, key.wrapping_add(i as u32));
                }

                sink(&sector).map_err(ExtractError::Sink)?;
                written += sector.len() as u64;
            }
        }

        if written != file_size {
            return Err(Error::Corrupted.into());
        }

        Ok(written)
    }

    fn read_checksums(
        &mut self,
        block_entry: &BlockEntry,
        sector_offsets: &SectorOffsets,
    ) -> Result<Option<Vec<u32>>, Error> {
        if !block_entry.has_sector_crc() {
            return Ok(None);
        }

        let (offset, length) = match sector_offsets.checksums() {
            Some((_, 0)) | None => return Ok(None),
            Some(range) => range,
        };

        let expected = sector_offsets.count() as u64 * 4;
        let raw = self
            .seeker
            .read(block_entry.file_pos + u64::from(offset), u64::from(length))?;
        let table = decode_sector(&raw, expected)?;

        Ok(Some(
            table
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ))
    }

    /// If the archive contains a `(listfile)`, this will method
    /// parse it and return a `Vec` containing all known filenames.
    ///
    /// Returns `Ok(None)` when there is no `(listfile)`. A `(listfile)` that
    /// exists but can't be read is an error.
    pub fn files(&mut self) -> Result<Option<Vec<String>>, Error> {
        let listfile = match self.read_file(LISTFILE_NAME) {
            Ok(listfile) => listfile,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };

        Ok(Some(
            listfile
                .split(|b| *b == b'\r' || *b == b'\n')
                .filter(|line| !line.is_empty())
                .filter_map(|line| std::str::from_utf8(line).ok())
                .map(|line| line.to_string())
                .collect(),
        ))
    }

    /// Every known file name, `(listfile)` included, without duplicates.
    ///
    /// An archive without a `(listfile)` lists as empty.
    pub fn list(&mut self) -> Result<Vec<String>, Error> {
        let mut names = self.files()?.unwrap_or_default();
        if self.contains(LISTFILE_NAME) {
            names.push(LISTFILE_NAME.to_string());
        }

        let mut seen = HashSet::new();
        names.retain(|name| seen.insert(FileKey::new(name)));
        Ok(names)
    }

    /// Block index `name` resolves to, if it names an existing file.
    pub(crate) fn block_index(&self, name: &str) -> Option<u32> {
        self.lookup(name).ok()?;
        self.hash_table.locate(name)
    }

    /// Blocks of every existing file reachable from the hash table, named or not.
    pub(crate) fn live_blocks(&self) -> HashSet<u32> {
        self.hash_table
            .entries()
            .iter()
            .filter(|entry| !entry.is_free())
            .map(|entry| entry.block_index)
            .filter(|&index| {
                self.block_table
                    .get(index as usize)
                    .map_or(false, |block| block.exists())
            })
            .collect()
    }

    /// Extracts every listed file under `destination`, see [`Archive::extract_all_cancellable`].
    pub fn extract_all<P: AsRef<Path>>(&mut self, destination: P) -> Result<ExtractReport, Error> {
        self.extract_all_cancellable(destination, &CancelFlag::new())
    }

    /// Extracts every listed file under `destination`, creating directories
    /// as needed.
    ///
    /// A file that can't be read from the archive is recorded in
    /// [`ExtractReport::failed`] and extraction moves on. Failing to create or
    /// write a file on disk aborts the whole run.
    pub fn extract_all_cancellable<P: AsRef<Path>>(
        &mut self,
        destination: P,
        cancel: &CancelFlag,
    ) -> Result<ExtractReport, Error> {
        let destination = destination.as_ref();
        fs::create_dir_all(destination)?;

        let mut report = ExtractReport::default();
        for name in self.list()? {
            cancel.check()?;

            let path = match archive_path_to_fs(destination, &name) {
                Ok(path) => path,
                Err(err) => {
                    warn!("skipping {}: {}", name, err);
                    report.failed.push((name, err));
                    continue;
                }
            };

            if let Err(err) = self.lookup(&name) {
                warn!("skipping {}: {}", name, err);
                report.failed.push((name, err));
                continue;
            }

            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }

            let mut out = BufWriter::new(File::create(&path)?);
            let mut result = self.extract_sectors(&name, &mut |sector| out.write_all(sector));
            if result.is_ok() {
                if let Err(cause) = out.flush() {
                    result = Err(ExtractError::Sink(cause));
                }
            }

            match result {
                Ok(size) => {
                    debug!("extracted {} ({} bytes)", name, size);
                    report.extracted.push((name, size));
                }
                Err(ExtractError::Archive(err)) => {
                    warn!("failed to extract {}: {}", name, err);
                    drop(out);
                    let _ = fs::remove_file(&path);
                    report.failed.push((name, err));
                }
                Err(ExtractError::Sink(cause)) => return Err(Error::IoError { cause }),
            }
        }

        Ok(report)
    }
}

fn verify_checksum(sector: usize, expected: u32, data: &[u8]) -> Result<(), Error> {
    // a stored zero means the sector was never checksummed
    if expected == 0 {
        return Ok(());
    }

    let actual = sector_checksum(data);
    if actual != expected {
        return Err(Error::ChecksumMismatch {
            sector,
            expected,
            actual,
        });
    }

    Ok(())
}
