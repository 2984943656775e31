use std::borrow::Cow;
use std::fs;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{WriteBytesExt, LE};
use indexmap::IndexMap;
use log::{debug, info};
use walkdir::WalkDir;

use super::cancel::CancelFlag;
use super::codec::*;
use super::consts::*;
use super::crypto::*;
use super::error::Error;
use super::header::*;
use super::table::*;
use super::util::*;

#[derive(Debug)]
enum FileSource {
    Data(Vec<u8>),
    /// Read from disk only when the file is written out.
    Path(PathBuf),
}

#[derive(Debug)]
struct FileRecord {
    file_name: String,
    source: FileSource,
    options: FileOptions,
}

impl FileRecord {
    fn contents(&self) -> Result<Cow<'_, [u8]>, Error> {
        match &self.source {
            FileSource::Data(data) => Ok(Cow::Borrowed(data)),
            FileSource::Path(path) => Ok(Cow::Owned(fs::read(path)?)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Represents various options that can be used when adding a file to an archive.
pub struct FileOptions {
    /// Whether to encrypt the file using MPQ's encryption scheme.
    /// The encryption key is derived from the file name, so in practice
    /// this is pretty useless.
    pub encrypt: bool,
    /// Whether to compress the file with the archive's [`Codec`]. Sectors that
    /// don't shrink are stored as-is, and a file where no sector shrinks is
    /// stored uncompressed.
    pub compress: bool,
    /// If the file is encrypted, this will "adjust" the encryption key by
    /// performing some simple transformations on it. By default, this is used for
    /// "technical" files such as `(listfile)`.
    pub adjust_key: bool,
}

impl FileOptions {
    pub fn compressed() -> FileOptions {
        FileOptions {
            compress: true,
            ..FileOptions::default()
        }
    }
}

/// Archive-wide settings for [`Creator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    pub version: FormatVersion,
    /// Sectors are `512 << sector_size_shift` bytes.
    pub sector_size_shift: u16,
    pub codec: Codec,
    /// Store an Adler-32 checksum for every sector of compressed files.
    pub sector_crc: bool,
}

impl Default for BuildOptions {
    fn default() -> BuildOptions {
        BuildOptions {
            version: FormatVersion::V1,
            sector_size_shift: DEFAULT_SECTOR_SIZE_SHIFT,
            codec: Codec::Zlib,
            sector_crc: true,
        }
    }
}

impl BuildOptions {
    pub fn with_version(version: FormatVersion) -> BuildOptions {
        BuildOptions {
            version,
            ..BuildOptions::default()
        }
    }
}

#[derive(Debug, Default)]
/// Creator capable of creating MPQ Version 1 and Version 2 archives.
///
/// Files added with [`add_file`](struct.Creator.html#method.add_file) are held
/// in memory, files added with [`add_path`](struct.Creator.html#method.add_path)
/// are read one at a time while writing.
///
/// Files are written in byte order of their archive names, so the same input
/// always produces the same archive. When writing, a `(listfile)` will be
/// automatically appended to the archive.
pub struct Creator {
    added_files: IndexMap<FileKey, FileRecord>,
    options: BuildOptions,
    cancel: CancelFlag,
}

impl Creator {
    pub fn new(options: BuildOptions) -> Creator {
        Creator {
            added_files: IndexMap::new(),
            options,
            cancel: CancelFlag::new(),
        }
    }

    /// Collects every regular file under `source`.
    ///
    /// Archive names are the paths relative to `source` with backslash
    /// separators. All files are added with compression enabled.
    pub fn from_directory<P: AsRef<Path>>(
        source: P,
        options: BuildOptions,
    ) -> Result<Creator, Error> {
        let source = source.as_ref();
        let mut creator = Creator::new(options);

        for entry in WalkDir::new(source).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }

            let invalid = || Error::InvalidPath {
                path: entry.path().display().to_string(),
            };
            let relative = entry.path().strip_prefix(source).map_err(|_| invalid())?;
            let mut segments = Vec::new();
            for component in relative.components() {
                segments.push(component.as_os_str().to_str().ok_or_else(invalid)?);
            }

            creator.add_path(&segments.join("\\"), entry.path(), FileOptions::compressed());
        }

        debug!(
            "collected {} files from {}",
            creator.added_files.len(),
            source.display()
        );

        Ok(creator)
    }

    /// Stops [`write`](struct.Creator.html#method.write) between files once `flag` is tripped.
    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Creator {
        self.cancel = flag;
        self
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.added_files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.added_files.is_empty()
    }

    /// Adds a file to be later written to the archive.
    ///
    /// All forward slashes (`/`) in the file path will be auto-converted to backward slashes (`\`).
    /// Adding a name that is already present (compared case-insensitively) replaces it.
    ///
    /// [`FileOptions`](struct.FileOptions.html) determine the options for adding the file, e.g. encryption and compression.
    pub fn add_file<C>(&mut self, file_name: &str, contents: C, options: FileOptions)
    where
        C: Into<Vec<u8>>,
    {
        self.insert(file_name, FileSource::Data(contents.into()), options);
    }

    /// Like [`add_file`](struct.Creator.html#method.add_file), but the contents
    /// are read from `path` when the archive is written.
    pub fn add_path<P: Into<PathBuf>>(&mut self, file_name: &str, path: P, options: FileOptions) {
        self.insert(file_name, FileSource::Path(path.into()), options);
    }

    fn insert(&mut self, file_name: &str, source: FileSource, options: FileOptions) {
        let file_name = normalize_archive_path(file_name);
        let key = FileKey::new(&file_name);

        self.added_files.insert(
            key,
            FileRecord {
                file_name,
                source,
                options,
            },
        );
    }

    /// Writes out the entire archive to the specified writer.
    ///
    /// The archive start position is calculated as follows:
    /// `((current_pos + (HEADER_BOUNDARY - 1)) / HEADER_BOUNDARY) * HEADER_BOUNDARY`
    /// Where `current_pos` is the `writer`'s current seek pos, and `HEADER_BOUNDARY` is 512.
    ///
    /// Will write the following:
    /// - MPQ Header
    /// - All files with their sector offset table
    /// - MPQ hash table
    /// - MPQ block table
    /// - MPQ hi-block table, for v2 archives with data past 4 GiB
    ///
    /// The writer is left positioned at the end of the archive.
    ///
    /// Files are written one at a time, but each one is held in memory in full
    /// while it is written, together with its compressed sectors.
    pub fn write<W>(&self, mut writer: W) -> Result<(), Error>
    where
        W: Write + Seek,
    {
        let options = self.options;
        if options.sector_size_shift > MAX_SECTOR_SIZE_SHIFT {
            return Err(Error::capacity(format!(
                "sector size shift {} is too large",
                options.sector_size_shift
            )));
        }
        let sector_size = sector_size_from_shift(options.sector_size_shift);

        let current_pos = writer.seek(SeekFrom::Current(0))?;
        // starting from the current pos, this will find the closest valid header position
        let archive_start =
            ((current_pos + (HEADER_BOUNDARY - 1)) / HEADER_BOUNDARY) * HEADER_BOUNDARY;
        writer.seek(SeekFrom::Start(archive_start))?;

        // skip writing the header for now
        writer.seek(SeekFrom::Current(i64::from(options.version.header_size())))?;

        let listfile_key = FileKey::new(LISTFILE_NAME);
        let mut records: Vec<(&FileKey, &FileRecord)> = self
            .added_files
            .iter()
            .filter(|(key, _)| **key != listfile_key)
            .collect();
        records.sort_by(|a, b| a.1.file_name.cmp(&b.1.file_name));

        // create a listfile
        let mut listfile = String::new();
        for (_, file) in &records {
            listfile += &file.file_name;
            listfile += "\r\n";
        }

        let listfile = FileRecord {
            file_name: LISTFILE_NAME.to_string(),
            source: FileSource::Data(listfile.into_bytes()),
            options: FileOptions {
                compress: true,
                encrypt: true,
                adjust_key: true,
            },
        };
        records.push((&listfile_key, &listfile));

        let hashtable_size = hash_table_size_for(records.len());
        if records.len() > hashtable_size {
            return Err(Error::capacity(format!(
                "{} files don't fit a hash table of {}",
                records.len(),
                hashtable_size
            )));
        }

        let mut hash_table = FileHashTable::new(hashtable_size)?;
        let mut block_table = FileBlockTable::default();

        // write out all the files back-to-back
        for (key, file) in &records {
            self.cancel.check()?;

            let contents = file.contents()?;
            let block_entry = write_file(
                &options,
                sector_size,
                archive_start,
                &mut writer,
                &file.file_name,
                &contents,
                file.options,
            )?;

            let block_index = block_table.push(block_entry);
            hash_table.insert_key(key, block_index)?;
        }

        // write hash table and remember its position
        let hashtable_pos = writer.seek(SeekFrom::Current(0))? - archive_start;
        hash_table.write(&mut writer)?;

        // write block table and remember its position
        let blocktable_pos = writer.seek(SeekFrom::Current(0))? - archive_start;
        block_table.write(&mut writer)?;

        let hi_blocktable_pos = if block_table.needs_hi_block_table() {
            if options.version == FormatVersion::V1 {
                return Err(Error::capacity(
                    "file data beyond 4 GiB needs a version 2 archive",
                ));
            }

            let pos = writer.seek(SeekFrom::Current(0))? - archive_start;
            block_table.write_hi_block_table(&mut writer)?;
            pos
        } else {
            0
        };

        let archive_end = writer.seek(SeekFrom::Current(0))?;
        let archive_size = archive_end - archive_start;
        if options.version == FormatVersion::V1 && archive_size > u64::from(u32::MAX) {
            return Err(Error::capacity(
                "archives beyond 4 GiB need version 2",
            ));
        }

        // write header
        let header = FileHeader {
            header_size: options.version.header_size(),
            archive_size: archive_size.min(u64::from(u32::MAX)) as u32,
            format_version: options.version,
            sector_size_shift: options.sector_size_shift,
            hash_table_offset: hashtable_pos,
            block_table_offset: blocktable_pos,
            hash_table_entries: hashtable_size as u32,
            block_table_entries: block_table.len() as u32,
            hi_block_table_offset: hi_blocktable_pos,
        };

        writer.seek(SeekFrom::Start(archive_start))?;
        header.write(&mut writer)?;
        writer.seek(SeekFrom::Start(archive_end))?;

        info!(
            "wrote v{} archive: {} files, {} bytes",
            options.version.number(),
            block_table.len(),
            archive_size
        );

        Ok(())
    }
}

/// Writes out the specified file starting at the writer's current position.
/// If the file is marked for compression and at least one sector shrinks, a Sector Offset Table (SOT)
/// will be written, followed by the sectors and, if enabled, their checksums.
/// Otherwise the sectors are written back-to-back with no SOT.
/// If the file is marked for encryption, it will also be encrypted after compression.
/// All sectors are compressed before anything is written, since the SOT comes first.
fn write_file<W>(
    options: &BuildOptions,
    sector_size: u64,
    archive_start: u64,
    mut writer: W,
    file_name: &str,
    contents: &[u8],
    file_options: FileOptions,
) -> Result<BlockEntry, Error>
where
    W: Write + Seek,
{
    let file_size = contents.len() as u64;
    if file_size > u64::from(u32::MAX) {
        return Err(Error::capacity(format!(
            "{} is larger than 4 GiB",
            file_name
        )));
    }

    let file_start = writer.seek(SeekFrom::Current(0))?;
    let file_pos = file_start - archive_start;
    let mut flags = MPQ_FILE_EXISTS;

    if file_size == 0 {
        return Ok(BlockEntry::new(file_pos, 0, 0, flags));
    }

    // calculate the encryption key if encryption was requested
    let encryption_key = if file_options.encrypt {
        flags |= MPQ_FILE_ENCRYPTED;
        if file_options.adjust_key {
            flags |= MPQ_FILE_ADJUST_KEY;
        }

        Some(calculate_file_key(
            file_name,
            file_pos as u32,
            file_size as u32,
            file_options.adjust_key,
        ))
    } else {
        None
    };

    let sectors: Vec<&[u8]> = contents.chunks(sector_size as usize).collect();

    if file_options.compress {
        let compressed: Vec<(Cow<'_, [u8]>, bool)> = sectors
            .iter()
            .map(|sector| compress_sector(sector, options.codec))
            .collect();

        if compressed.iter().any(|(_, is_compressed)| *is_compressed) {
            flags |= MPQ_FILE_COMPRESS;
            if options.sector_crc {
                flags |= MPQ_FILE_SECTOR_CRC;
            }

            // the first sector starts right after the SOT
            let entry_count = SectorOffsets::entry_count(sectors.len(), options.sector_crc);
            let mut offsets = Vec::with_capacity(entry_count);
            let mut offset = (entry_count * 4) as u64;
            for (data, _) in &compressed {
                offsets.push(offset as u32);
                offset += data.len() as u64;
            }
            offsets.push(offset as u32);

            if options.sector_crc {
                offset += sectors.len() as u64 * 4;
                offsets.push(offset as u32);
            }

            if offset > u64::from(u32::MAX) {
                return Err(Error::capacity(format!(
                    "{} does not fit in 4 GiB once stored",
                    file_name
                )));
            }

            let sector_offsets = SectorOffsets::from_offsets(offsets, sectors.len());
            writer.write_all(&sector_offsets.to_bytes(encryption_key.map(|k| k.wrapping_sub(1)))?)?;

            let mut stored_sectors = 0;
            for (i, (mut data, is_compressed)) in compressed.into_iter().enumerate() {
                // encrypt the block if encryption was requested
                if let Some(key) = encryption_key {
                    encrypt_mpq_block(data.to_mut(), key.wrapping_add(i as u32));
                }

                writer.write_all(&data)?;
                if is_compressed {
                    stored_sectors += 1;
                }
            }

            if options.sector_crc {
                for sector in &sectors {
                    writer.write_u32::<LE>(sector_checksum(sector))?;
                }
            }

            debug!(
                "{}: {} -> {} bytes, {}/{} sectors compressed",
                file_name,
                file_size,
                offset,
                stored_sectors,
                sectors.len()
            );

            return Ok(BlockEntry::new(file_pos, offset, file_size, flags));
        }

        debug!("{}: compression did not help, storing as-is", file_name);
    }

    // write each sector
    for (i, sector) in sectors.iter().enumerate() {
        let mut buf = Cow::Borrowed(*sector);

        // encrypt the block if encryption was requested
        if let Some(key) = encryption_key {
            encrypt_mpq_block(buf.to_mut(), key.wrapping_add(i as u32));
        }

        writer.write_all(&buf)?;
    }

    Ok(BlockEntry::new(file_pos, file_size, file_size, flags))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::Archive;
    use std::io::Cursor;

    fn write(creator: &Creator) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        creator.write(&mut cursor).unwrap();
        cursor.into_inner()
    }

    #[test]
    fn header_and_tables_are_consistent() {
        let mut creator = Creator::new(BuildOptions::with_version(FormatVersion::V2));
        creator.add_file("a.txt", "hi", FileOptions::compressed());
        creator.add_file("b/c.txt", "world", FileOptions::compressed());

        let data = write(&creator);
        assert_eq!(&data[0..4], b"MPQ\x1A");
        assert_eq!(&data[4..8], &44u32.to_le_bytes());
        assert_eq!(&data[8..12], &(data.len() as u32).to_le_bytes());
        assert_eq!(&data[12..14], &1u16.to_le_bytes());
        // three files (listfile included) -> four hash slots, three blocks
        assert_eq!(&data[24..28], &4u32.to_le_bytes());
        assert_eq!(&data[28..32], &3u32.to_le_bytes());
        // no data past 4 GiB, so no hi-block table
        assert_eq!(&data[32..40], &0u64.to_le_bytes());

        let mut archive = Archive::open(Cursor::new(data)).unwrap();
        assert_eq!(archive.format_version(), FormatVersion::V2);
        assert_eq!(archive.read_file("a.txt").unwrap(), b"hi");
        assert_eq!(archive.read_file("b\\c.txt").unwrap(), b"world");
    }

    #[test]
    fn output_does_not_depend_on_insertion_order() {
        let mut first = Creator::default();
        first.add_file("z.txt", "last", FileOptions::compressed());
        first.add_file("a.txt", "first", FileOptions::compressed());

        let mut second = Creator::default();
        second.add_file("a.txt", "first", FileOptions::compressed());
        second.add_file("z.txt", "last", FileOptions::compressed());

        let data = write(&first);
        assert_eq!(data, write(&second));
        assert_eq!(data, write(&first));
    }

    #[test]
    fn later_adds_replace_earlier_ones() {
        let mut creator = Creator::default();
        creator.add_file("Data/File.txt", "old", FileOptions::compressed());
        creator.add_file("data\\file.txt", "new", FileOptions::compressed());
        assert_eq!(creator.len(), 1);

        let mut archive = Archive::open(Cursor::new(write(&creator))).unwrap();
        assert_eq!(archive.read_file("DATA/FILE.TXT").unwrap(), b"new");
        assert_eq!(archive.files().unwrap().unwrap(), vec!["data\\file.txt".to_string()]);
    }

    #[test]
    fn user_listfile_is_replaced() {
        let mut creator = Creator::default();
        creator.add_file("(listfile)", "bogus", FileOptions::default());
        creator.add_file("a.txt", "hi", FileOptions::compressed());

        let mut archive = Archive::open(Cursor::new(write(&creator))).unwrap();
        assert_eq!(archive.read_file("(listfile)").unwrap(), b"a.txt\r\n");
    }

    #[test]
    fn incompressible_files_are_stored_raw() {
        // every byte value once, shuffled: nothing for deflate to find
        let mut noise: Vec<u8> = (0..=255u8).collect();
        for i in 0..noise.len() {
            let j = (i * 167 + 13) % noise.len();
            noise.swap(i, j);
        }

        let mut creator = Creator::default();
        creator.add_file("noise.bin", noise.clone(), FileOptions::compressed());

        let mut archive = Archive::open(Cursor::new(write(&creator))).unwrap();
        let info = archive.file_info("noise.bin").unwrap();
        assert!(!info.is_compressed());
        assert!(!info.has_sector_crc());
        assert_eq!(info.compressed_size, 256);
        assert_eq!(archive.read_file("noise.bin").unwrap(), noise);
    }

    #[test]
    fn bzip2_and_small_sectors() {
        let contents: Vec<u8> = (0..3000u32).map(|i| (i % 7) as u8).collect();
        let options = BuildOptions {
            sector_size_shift: 0,
            codec: Codec::Bzip2,
            ..BuildOptions::default()
        };

        let mut creator = Creator::new(options);
        creator.add_file("pattern.bin", contents.clone(), FileOptions::compressed());

        let mut archive = Archive::open(Cursor::new(write(&creator))).unwrap();
        assert_eq!(archive.sector_size(), 512);
        assert_eq!(archive.read_file("pattern.bin").unwrap(), contents);
    }

    #[test]
    fn archive_starts_on_a_header_boundary() {
        let mut creator = Creator::default();
        creator.add_file("a.txt", "hi", FileOptions::compressed());

        let mut cursor = Cursor::new(vec![0xAAu8; 100]);
        cursor.seek(SeekFrom::End(0)).unwrap();
        creator.write(&mut cursor).unwrap();

        let data = cursor.into_inner();
        assert_eq!(&data[512..516], b"MPQ\x1A");

        let mut archive = Archive::open(Cursor::new(data)).unwrap();
        assert_eq!(archive.read_file("a.txt").unwrap(), b"hi");
    }

    #[test]
    fn cancelled_builds_stop() {
        let flag = CancelFlag::new();
        let mut creator = Creator::default().with_cancel_flag(flag.clone());
        creator.add_file("a.txt", "hi", FileOptions::compressed());
        flag.cancel();

        match creator.write(Cursor::new(Vec::new())) {
            Err(Error::Cancelled) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn oversized_sector_shift_is_rejected() {
        let creator = Creator::new(BuildOptions {
            sector_size_shift: 40,
            ..BuildOptions::default()
        });

        match creator.write(Cursor::new(Vec::new())) {
            Err(Error::Capacity { .. }) => {}
            other => panic!("unexpected {:?}", other),
        }
    }
}
