// header
pub const HEADER_BOUNDARY: u64 = 512;
pub const HEADER_MPQ_MAGIC: u32 = 0x1A51_504D;
pub const HEADER_USER_MAGIC: u32 = 0x1B51_504D;
pub const HEADER_MPQ_SIZE_V1: u32 = 32;
pub const HEADER_MPQ_SIZE_V2: u32 = 44;

// tables
pub const HASH_TABLE_ENTRY_SIZE: u64 = 16;
pub const BLOCK_TABLE_ENTRY_SIZE: u64 = 16;
pub const HI_BLOCK_TABLE_ENTRY_SIZE: u64 = 2;
pub const MIN_HASH_TABLE_SIZE: usize = 4;
pub const HASH_TABLE_EMPTY_ENTRY: u32 = 0xFFFF_FFFF;
pub const HASH_TABLE_DELETED_ENTRY: u32 = 0xFFFF_FFFE;

// hash(b"(hash table)", MPQ_HASH_FILE_KEY) and hash(b"(block table)", MPQ_HASH_FILE_KEY)
pub const HASH_TABLE_KEY: u32 = 0xC3AF_3770;
pub const BLOCK_TABLE_KEY: u32 = 0xEC83_B3A3;

// hash types
pub const MPQ_HASH_TABLE_INDEX: u32 = 0x000;
pub const MPQ_HASH_NAME_A: u32 = 0x100;
pub const MPQ_HASH_NAME_B: u32 = 0x200;
pub const MPQ_HASH_FILE_KEY: u32 = 0x300;
pub const MPQ_HASH_KEY2_MIX: u32 = 0x400;

// block flags
pub const MPQ_FILE_IMPLODE: u32 = 0x0000_0100;
pub const MPQ_FILE_COMPRESS: u32 = 0x0000_0200;
pub const MPQ_FILE_ENCRYPTED: u32 = 0x0001_0000;
pub const MPQ_FILE_ADJUST_KEY: u32 = 0x0002_0000;
pub const MPQ_FILE_SINGLE_UNIT: u32 = 0x0100_0000;
pub const MPQ_FILE_SECTOR_CRC: u32 = 0x0400_0000;
pub const MPQ_FILE_EXISTS: u32 = 0x8000_0000;

// sector compression ids
pub const COMPRESSION_HUFFMAN: u8 = 0x01;
pub const COMPRESSION_ZLIB: u8 = 0x02;
pub const COMPRESSION_PKWARE: u8 = 0x08;
pub const COMPRESSION_BZIP2: u8 = 0x10;
pub const COMPRESSION_LZMA: u8 = 0x12;
pub const COMPRESSION_SPARSE: u8 = 0x20;
pub const COMPRESSION_IMA_ADPCM_MONO: u8 = 0x40;
pub const COMPRESSION_IMA_ADPCM_STEREO: u8 = 0x80;

pub const DEFAULT_SECTOR_SIZE_SHIFT: u16 = 3;
pub const MAX_SECTOR_SIZE_SHIFT: u16 = 15;

pub const LISTFILE_NAME: &str = "(listfile)";
