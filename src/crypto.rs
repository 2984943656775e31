use lazy_static::lazy_static;

use super::consts::*;

lazy_static! {
    static ref CRYPTO_TABLE: [u32; 0x500] = generate_crypto_table();
}

fn generate_crypto_table() -> [u32; 0x500] {
    let mut crypto_table = [0u32; 0x500];
    let mut seed: u32 = 0x0010_0001;

    for i in 0..0x100 {
        for j in 0..5 {
            let index = i + j * 0x100;
            seed = (seed * 125 + 3) % 0x002A_AAAB;
            let t1 = (seed & 0xFFFF) << 0x10;
            seed = (seed * 125 + 3) % 0x002A_AAAB;
            let t2 = seed & 0xFFFF;

            crypto_table[index] = t1 | t2;
        }
    }

    crypto_table
}

/// Case-insensitive, and `/` hashes the same as `\`.
fn normalize_byte(byte: u8) -> u8 {
    if byte == b'/' {
        b'\\'
    } else {
        byte.to_ascii_uppercase()
    }
}

pub(crate) fn hash_string(source: &[u8], hash_type: u32) -> u32 {
    let mut seed1: u32 = 0x7FED_7FED;
    let mut seed2: u32 = 0xEEEE_EEEE;

    for byte in source {
        let upper = u32::from(normalize_byte(*byte));

        seed1 = CRYPTO_TABLE[(hash_type + upper) as usize] ^ seed1.wrapping_add(seed2);
        seed2 = upper
            .wrapping_add(seed1)
            .wrapping_add(seed2)
            .wrapping_add(seed2 << 5)
            .wrapping_add(3);
    }

    seed1
}

// Both directions walk the buffer as little-endian u32 words.
// Trailing bytes that don't fill a whole word are left untouched.
pub(crate) fn decrypt_mpq_block(data: &mut [u8], mut key: u32) {
    let mut key_secondary: u32 = 0xEEEE_EEEE;

    for chunk in data.chunks_exact_mut(4) {
        key_secondary = key_secondary
            .wrapping_add(CRYPTO_TABLE[(MPQ_HASH_KEY2_MIX + (key & 0xFF)) as usize]);

        let value = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])
            ^ key.wrapping_add(key_secondary);
        chunk.copy_from_slice(&value.to_le_bytes());

        key = ((!key << 0x15).wrapping_add(0x1111_1111)) | (key >> 0x0B);
        key_secondary = value
            .wrapping_add(key_secondary)
            .wrapping_add(key_secondary << 5)
            .wrapping_add(3);
    }
}

pub(crate) fn encrypt_mpq_block(data: &mut [u8], mut key: u32) {
    let mut key_secondary: u32 = 0xEEEE_EEEE;

    for chunk in data.chunks_exact_mut(4) {
        key_secondary = key_secondary
            .wrapping_add(CRYPTO_TABLE[(MPQ_HASH_KEY2_MIX + (key & 0xFF)) as usize]);

        let plain = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let value = plain ^ key.wrapping_add(key_secondary);
        chunk.copy_from_slice(&value.to_le_bytes());

        key = ((!key << 0x15).wrapping_add(0x1111_1111)) | (key >> 0x0B);
        key_secondary = plain
            .wrapping_add(key_secondary)
            .wrapping_add(key_secondary << 5)
            .wrapping_add(3);
    }
}

pub(crate) fn get_plain_name(input: &str) -> &[u8] {
    let bytes = input.as_bytes();
    match bytes.iter().rposition(|b| *b == b'\\' || *b == b'/') {
        Some(pos) => &bytes[(pos + 1)..],
        None => bytes,
    }
}

pub(crate) fn calculate_file_key(
    file_name: &str,
    file_offset: u32,
    file_size: u32,
    adjusted: bool,
) -> u32 {
    let plain_name = get_plain_name(file_name);
    let mut key = hash_string(plain_name, MPQ_HASH_FILE_KEY);

    if adjusted {
        key = key.wrapping_add(file_offset) ^ file_size
    }

    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_keys_match_their_names() {
        assert_eq!(hash_string(b"(hash table)", MPQ_HASH_FILE_KEY), HASH_TABLE_KEY);
        assert_eq!(hash_string(b"(block table)", MPQ_HASH_FILE_KEY), BLOCK_TABLE_KEY);
    }

    #[test]
    fn known_listfile_hashes() {
        assert_eq!(hash_string(b"(listfile)", MPQ_HASH_TABLE_INDEX), 0x5F3D_E859);
        assert_eq!(hash_string(b"(listfile)", MPQ_HASH_NAME_A), 0xFD65_7910);
        assert_eq!(hash_string(b"(listfile)", MPQ_HASH_NAME_B), 0x4E9B_98A7);
    }

    #[test]
    fn hashing_ignores_case_and_separator_style() {
        for hash_type in &[MPQ_HASH_TABLE_INDEX, MPQ_HASH_NAME_A, MPQ_HASH_NAME_B] {
            assert_eq!(
                hash_string(b"b\\c.txt", *hash_type),
                hash_string(b"B/C.TXT", *hash_type)
            );
        }
        assert_eq!(hash_string(b"a.txt", MPQ_HASH_NAME_A), 0x775D_B9F0);
    }

    #[test]
    fn encryption_reverses() {
        let original: Vec<u8> = (0..37u8).collect();
        let mut data = original.clone();

        encrypt_mpq_block(&mut data, 0xDEAD_BEEF);
        assert_ne!(data[..36], original[..36]);
        // the odd trailing byte is never touched
        assert_eq!(data[36], original[36]);

        decrypt_mpq_block(&mut data, 0xDEAD_BEEF);
        assert_eq!(data, original);
    }

    #[test]
    fn file_keys_use_the_plain_name() {
        assert_eq!(
            calculate_file_key("war3map.j", 0, 0, false),
            calculate_file_key("scripts\\war3map.j", 0, 0, false)
        );

        let base = calculate_file_key("(listfile)", 0, 0, false);
        let adjusted = calculate_file_key("(listfile)", 0x200, 0x40, true);
        assert_eq!(adjusted, base.wrapping_add(0x200) ^ 0x40);
    }
}
