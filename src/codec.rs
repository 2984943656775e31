//! Per-sector compression.
//!
//! A compressed sector is a codec id byte followed by the codec's payload.
//! A stored sector whose length equals its expected uncompressed length is raw.

use std::borrow::Cow;
use std::io::{Read, Write};

use super::consts::*;
use super::error::Error;

/// Compression codecs this crate can both write and read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// zlib-wrapped DEFLATE, id `0x02`. The default.
    Zlib,
    /// bzip2, id `0x10`.
    Bzip2,
}

impl Default for Codec {
    fn default() -> Codec {
        Codec::Zlib
    }
}

impl Codec {
    pub fn id(self) -> u8 {
        match self {
            Codec::Zlib => COMPRESSION_ZLIB,
            Codec::Bzip2 => COMPRESSION_BZIP2,
        }
    }

    pub fn from_id(id: u8) -> Result<Codec, Error> {
        let kind = match id {
            COMPRESSION_ZLIB => return Ok(Codec::Zlib),
            COMPRESSION_BZIP2 => return Ok(Codec::Bzip2),
            COMPRESSION_HUFFMAN => "Huffman",
            COMPRESSION_PKWARE => "PKWare DCL",
            COMPRESSION_LZMA => "LZMA",
            COMPRESSION_SPARSE => "Sparse",
            COMPRESSION_IMA_ADPCM_MONO => "IMA ADPCM Mono",
            COMPRESSION_IMA_ADPCM_STEREO => "IMA ADPCM Stereo",
            _ => {
                return Err(Error::UnsupportedCompression {
                    kind: format!("mask {:#04x}", id),
                })
            }
        };

        Err(Error::UnsupportedCompression {
            kind: kind.to_string(),
        })
    }

    fn compress(self, data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
        let mut out = vec![self.id()];

        match self {
            Codec::Zlib => {
                let mut encoder =
                    flate2::write::ZlibEncoder::new(&mut out, flate2::Compression::default());
                encoder.write_all(data)?;
                encoder.finish()?;
            }
            Codec::Bzip2 => {
                let mut encoder =
                    bzip2::write::BzEncoder::new(&mut out, bzip2::Compression::default());
                encoder.write_all(data)?;
                encoder.finish()?;
            }
        }

        Ok(out)
    }

    fn decompress(self, payload: &[u8], expected_size: u64) -> Result<Vec<u8>, Error> {
        let mut out = Vec::with_capacity(expected_size as usize);

        let result = match self {
            Codec::Zlib => flate2::read::ZlibDecoder::new(payload)
                .take(expected_size)
                .read_to_end(&mut out),
            Codec::Bzip2 => bzip2::read::BzDecoder::new(payload)
                .take(expected_size)
                .read_to_end(&mut out),
        };

        match result {
            Ok(_) if out.len() as u64 == expected_size => Ok(out),
            _ => Err(Error::Corrupted),
        }
    }
}

/// Tries to compress one sector.
///
/// Returns the bytes to store and whether they are compressed. When the
/// compressed form (id byte included) is not strictly smaller than the input,
/// the input is returned as-is.
pub(crate) fn compress_sector(data: &[u8], codec: Codec) -> (Cow<'_, [u8]>, bool) {
    if data.is_empty() {
        return (Cow::Borrowed(data), false);
    }

    match codec.compress(data) {
        Ok(compressed) if compressed.len() < data.len() => (Cow::Owned(compressed), true),
        _ => (Cow::Borrowed(data), false),
    }
}

pub(crate) fn decompress_sector(
    data: &[u8],
    is_compressed: bool,
    expected_size: u64,
) -> Result<Vec<u8>, Error> {
    if !is_compressed {
        if data.len() as u64 != expected_size {
            return Err(Error::Corrupted);
        }

        return Ok(data.to_vec());
    }

    let (&id, payload) = data.split_first().ok_or(Error::Corrupted)?;
    Codec::from_id(id)?.decompress(payload, expected_size)
}

/// Decodes a sector as it is stored on disk: anything shorter than its
/// expected size carries a codec id byte.
pub(crate) fn decode_sector(data: &[u8], expected_size: u64) -> Result<Vec<u8>, Error> {
    decompress_sector(data, (data.len() as u64) < expected_size, expected_size)
}

pub(crate) fn sector_checksum(data: &[u8]) -> u32 {
    adler2::adler32_slice(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compressible_sectors_shrink() {
        let data = b"abcabcabcabcabcabcabcabcabcabcabcabcabcabcabcabcabcabc".repeat(20);

        for codec in &[Codec::Zlib, Codec::Bzip2] {
            let (stored, compressed) = compress_sector(&data, *codec);
            assert!(compressed);
            assert!(stored.len() < data.len());
            assert_eq!(stored[0], codec.id());

            let decoded = decode_sector(&stored, data.len() as u64).unwrap();
            assert_eq!(decoded, data);
        }
    }

    #[test]
    fn incompressible_sectors_stay_raw() {
        // a short sector with no repetition can't win against the codec overhead
        let data = b"q8Z!".to_vec();
        let (stored, compressed) = compress_sector(&data, Codec::Zlib);

        assert!(!compressed);
        assert_eq!(&stored[..], &data[..]);
        assert_eq!(decode_sector(&stored, data.len() as u64).unwrap(), data);
    }

    #[test]
    fn empty_sector_is_never_compressed() {
        let (stored, compressed) = compress_sector(&[], Codec::Zlib);
        assert!(!compressed);
        assert!(stored.is_empty());
    }

    #[test]
    fn unknown_codecs_are_reported() {
        match Codec::from_id(COMPRESSION_PKWARE) {
            Err(Error::UnsupportedCompression { kind }) => assert_eq!(kind, "PKWare DCL"),
            other => panic!("unexpected {:?}", other),
        }

        let sector = [COMPRESSION_HUFFMAN, 0, 0];
        assert!(decode_sector(&sector, 10).unwrap_err().is_format_error());
    }

    #[test]
    fn truncated_payload_is_corrupted() {
        let data = vec![7u8; 4096];
        let (stored, _) = compress_sector(&data, Codec::Zlib);
        let truncated = &stored[..stored.len() / 2];

        match decode_sector(truncated, 4096) {
            Err(Error::Corrupted) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn raw_length_mismatch_is_corrupted() {
        assert!(decompress_sector(b"abc", false, 4).is_err());
    }

    #[test]
    fn checksum_is_adler32() {
        assert_eq!(sector_checksum(b"hello world"), 0x1A0B_045D);
    }
}
