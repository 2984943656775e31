//! A library for reading, writing and updating Blizzard's MoPaQ archive format.
//!
//! Both Version 1 and Version 2 archives can be read and written. Version 2
//! only differs in its larger header, which allows archive offsets past 4 GiB
//! through the hi-block table.
//!
//! Archives written by `mpq-engine` are deterministic: the same files always
//! produce byte-identical output, because files are laid out in byte order of
//! their names and the `(listfile)` always comes last.
//!
//! Existing archives cannot be patched in place. Instead, [`mutator::append`]
//! rebuilds the whole archive with the extra files and swaps it in once the
//! new one is complete.
//!
//! # Supported features
//!
//! Not the whole range of MPQ features is supported for reading archives. Notably:
//!
//! * Only zlib (DEFLATE) and bzip2 compression are supported.
//!   IMA ADPCM, Huffman, LZMA, sparse and PKWare DCL compressed sectors fail
//!   with [`Error::UnsupportedCompression`].
//! * Per-sector Adler-32 checksums are verified when present.
//! * Encrypted files, single-unit files and user data headers are read.
//! * Only the first file with a given name is found, preferring the neutral locale.
//!
//! Additionally, for writing archives:
//! * Files are split into sectors of `512 << sector_size_shift` bytes. Sectors that
//!   don't shrink under compression are stored as-is.
//! * Single-unit files are never written.
//!
//! # Protected MPQs
//!
//! In Warcraft III, it is not uncommon to encounter so-called "protected maps" which use various
//! obfuscations and hacks that are designed in such a manner that they can be read by WC3's
//! built-in MPQ implementation, but will trip up other implementations.
//!
//! **No effort is made to work around those "protections"**. In particular,
//! opening a protected MPQ which has explicitly subverted the archive
//! structure is likely to fail with [`Error::Corrupted`].
//!
//! # Example
//!
//! ```
//! # use mpq_engine::{Archive, BuildOptions, Creator, FileOptions, FormatVersion};
//! # use std::io::{Cursor, Seek, SeekFrom};
//! # use std::error::Error;
//! # fn main() -> Result<(), Box<dyn Error>> {
//! let buf: Vec<u8> = Vec::new();
//! let mut cursor = Cursor::new(buf);
//!
//! // creating an archive
//! let mut creator = Creator::new(BuildOptions::with_version(FormatVersion::V2));
//! creator.add_file("hello.txt", "hello world!",
//!     FileOptions {
//!         encrypt: false,
//!         compress: true,
//!         adjust_key: false
//!     }
//! );
//! creator.write(&mut cursor)?;
//!
//! cursor.seek(SeekFrom::Start(0))?;
//!
//! // reading an archive
//! let mut archive = Archive::open(&mut cursor)?;
//! let file = archive.read_file("hello.txt")?;
//!
//! assert_eq!(file.as_slice(), b"hello world!");
//! assert_eq!(archive.list()?, vec!["hello.txt", "(listfile)"]);
//! # Ok(())
//! # }
//! ```

pub(crate) mod consts;
pub(crate) mod crypto;
pub(crate) mod header;
pub(crate) mod seeker;
pub(crate) mod table;
pub(crate) mod util;

pub mod archive;
pub mod cancel;
pub mod codec;
pub mod creator;
pub mod driver;
pub mod error;
pub mod mutator;

pub use archive::{Archive, ExtractReport, FileInfo};
pub use cancel::CancelFlag;
pub use codec::Codec;
pub use creator::{BuildOptions, Creator, FileOptions};
pub use error::Error;
pub use header::FormatVersion;
