//! Cryptographic constants and per-scheme defaults.
//!
//! This module is the single source of truth for the on-disk format
//! parameters shared by every cipher scheme: the SQLite page geometry,
//! the page-1 salt discipline, and the default key-derivation costs.

/// The 16-byte header string of an unencrypted SQLite database.
///
/// On disk, encrypted databases replace these bytes on page 1 with the
/// key-derivation salt; the string is restored in memory after a
/// successful decrypt so the pager's header parser keeps working.
pub const SQLITE_MAGIC: [u8; 16] = *b"SQLite format 3\0";

/// Length of the per-database key salt stored at file offset 0.
pub const SALT_LEN: usize = 16;

/// Number of leading page-1 bytes excluded from encryption.
///
/// Covers exactly the salt. A configured `plaintext_header_size` may
/// extend the plaintext region, never shrink it below this value.
pub const PAGE1_OFFSET: usize = 16;

/// Upper bound for `plaintext_header_size`; the SQLite database header
/// occupies the first 100 bytes of page 1.
pub const PLAINTEXT_HEADER_MAX: i64 = 100;

/// Smallest legal SQLite page size.
pub const MIN_PAGE_SIZE: usize = 512;

/// Largest legal SQLite page size.
pub const MAX_PAGE_SIZE: usize = 65536;

/// A page must retain at least this many usable bytes after the codec
/// takes its reserved tail (minimum b-tree page header plus payload).
pub const MIN_USABLE_PAGE: usize = 480;

/// Maximum length of a registered cipher or parameter name, including
/// the terminating byte of the original C layout.
pub const CIPHER_NAME_MAX: usize = 32;

/// PBKDF2-HMAC-SHA256 iterations for the `chacha20` scheme.
pub const CHACHA20_KDF_ITER: i64 = 64007;

/// Fixed iteration count used by the sqleet legacy mode of `chacha20`.
pub const SQLEET_KDF_ITER: i64 = 12345;

/// Page size assumed by sqleet-compatible files.
pub const CHACHA20_LEGACY_PAGE_SIZE: i64 = 4096;

/// PBKDF2-HMAC-SHA1 iterations for the wxSQLite3 legacy AES schemes.
pub const WXAES_KDF_ITER: i64 = 4001;

/// Ascon-PBKDF2 iterations for the `ascon128` scheme.
pub const ASCON_KDF_ITER: i64 = 64007;

/// SQLCipher key-derivation iterations (compat version 4).
pub const SQLCIPHER_KDF_ITER: i64 = 256_000;

/// Iterations for the secondary PBKDF2 run deriving the SQLCipher HMAC
/// key from the encryption key.
pub const SQLCIPHER_FAST_KDF_ITER: i64 = 2;

/// XOR mask applied to the salt before deriving the SQLCipher HMAC key.
pub const SQLCIPHER_HMAC_SALT_MASK: i64 = 0x3a;

/// Newest SQLCipher compat version; also the default.
pub const SQLCIPHER_VERSION_MAX: i64 = 4;

/// Argon2id defaults for the `aegis` scheme: passes, KiB of memory,
/// lanes.
pub const AEGIS_TCOST: i64 = 2;
pub const AEGIS_MCOST: i64 = 19 * 1024;
pub const AEGIS_PCOST: i64 = 1;

/// Scheme names tried by open-time detection, most likely first.
pub const DETECTION_ORDER: &[&str] = &[
    "chacha20",
    "sqlcipher",
    "aes256cbc",
    "aes128cbc",
    "rc4",
    "ascon128",
    "aegis",
];

/// Returns true if `n` is a legal SQLite page size (power of two within
/// the allowed range).
#[inline]
#[must_use]
pub fn is_valid_page_size(n: usize) -> bool {
    (MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&n) && n.is_power_of_two()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_is_sqlite_header() {
        assert_eq!(&SQLITE_MAGIC[..15], b"SQLite format 3");
        assert_eq!(SQLITE_MAGIC[15], 0);
    }

    #[test]
    fn test_valid_page_sizes() {
        for n in [512, 1024, 2048, 4096, 8192, 16384, 32768, 65536] {
            assert!(is_valid_page_size(n));
        }
        assert!(!is_valid_page_size(0));
        assert!(!is_valid_page_size(256));
        assert!(!is_valid_page_size(3000));
        assert!(!is_valid_page_size(131_072));
    }
}
