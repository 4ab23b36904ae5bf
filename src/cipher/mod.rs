//! Cipher descriptors and the operations every scheme implements.
//!
//! A scheme is registered once as a [`CipherScheme`] descriptor; the
//! codec instantiates it into a [`PageCipher`] carrying derived keys and
//! the per-database salt. The six built-in schemes live in the
//! submodules; externally registered schemes go through the same
//! interface.

pub mod aegis;
pub mod aescbc;
pub mod ascon;
pub mod chacha20;
pub mod rc4;
pub mod registry;
pub mod sqlcipher;

use crate::config::{PAGE1_OFFSET, SALT_LEN};
use crate::error::{CodecError, Result};
use crate::params::{ParamDef, ParamTable};
use crate::primitives::rng;

/// A cipher instance bound to one attached database: derived key
/// material, the database salt, and tuning captured at creation time.
pub trait PageCipher: Send {
    /// Name of the scheme this instance belongs to.
    fn scheme_name(&self) -> &str;

    /// Whether the instance is bit-compatible with an older file layout.
    fn legacy(&self) -> bool {
        false
    }

    /// Fixed page size required by the instance, or 0 for any.
    fn page_size(&self) -> u32 {
        0
    }

    /// Reserved tail bytes per page; stable for the instance lifetime.
    fn reserved(&self) -> usize;

    /// The 16-byte per-database salt.
    fn salt(&self) -> &[u8; SALT_LEN];

    /// Derives the symmetric key material from a passphrase or a `raw:`
    /// key. A fresh salt is generated when rekeying or when no salt is
    /// supplied; otherwise the given salt is adopted.
    fn generate_key(
        &mut self,
        passphrase: &[u8],
        rekey: bool,
        salt: Option<&[u8; SALT_LEN]>,
    ) -> Result<()>;

    /// Encrypts one page in place.
    fn encrypt_page(&self, page_no: u32, data: &mut [u8], reserved: usize) -> Result<()>;

    /// Decrypts one page in place. With `check_mac` unset the transform
    /// runs without authentication so recovery reads can proceed.
    fn decrypt_page(
        &self,
        page_no: u32,
        data: &mut [u8],
        reserved: usize,
        check_mac: bool,
    ) -> Result<()>;

    /// Deep copy, keys included; rekeying clones the read cipher into a
    /// divergent write cipher.
    fn clone_box(&self) -> Box<dyn PageCipher>;
}

impl core::fmt::Debug for dyn PageCipher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PageCipher")
            .field("scheme_name", &self.scheme_name())
            .finish()
    }
}

/// Static descriptor of a cipher scheme: its name, parameter vector,
/// and instance factory.
pub trait CipherScheme: Send + Sync {
    fn name(&self) -> &str;

    /// The scheme's parameter descriptors (defaults and bounds).
    fn params(&self) -> &[ParamDef];

    /// Creates an instance, reading current values from the connection's
    /// parameter table for this scheme.
    fn create(&self, params: &ParamTable) -> Result<Box<dyn PageCipher>>;
}

/// Placement of the plaintext region on page 1.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Page1Layout {
    /// First encrypted byte of the page.
    pub offset: usize,
    /// True when a configured plaintext header (not just the salt
    /// prefix) is in effect.
    pub plain_header: bool,
}

/// Computes where encryption starts on a page.
///
/// Pages other than 1 are fully covered. On page 1 the salt prefix is
/// skipped unless the scheme is in a legacy mode that encrypts from
/// offset 0; a configured `plaintext_header_size` extends the plaintext
/// region but never shrinks it below the salt.
pub(crate) fn page1_layout(page_no: u32, legacy: bool, plaintext_header_size: i64) -> Page1Layout {
    if page_no != 1 {
        return Page1Layout {
            offset: 0,
            plain_header: false,
        };
    }
    let phs = usize::try_from(plaintext_header_size).unwrap_or(0);
    if phs > 0 {
        Page1Layout {
            offset: if legacy { phs } else { phs.max(PAGE1_OFFSET) },
            plain_header: true,
        }
    } else {
        Page1Layout {
            offset: if legacy { 0 } else { PAGE1_OFFSET },
            plain_header: false,
        }
    }
}

/// Resolved key material for [`PageCipher::generate_key`].
pub(crate) enum KeySource {
    /// Run the scheme's KDF over the passphrase.
    Passphrase,
    /// Key (and possibly salt) supplied directly, bypassing the KDF.
    Raw {
        key: Vec<u8>,
        salt: Option<[u8; SALT_LEN]>,
    },
}

/// Parses the `raw:` key syntax.
///
/// The remainder after the prefix must be a binary key, a binary key
/// plus salt, or the hex encoding of either; any other shape is an
/// invalid argument rather than a passphrase.
pub(crate) fn extract_raw_key(passphrase: &[u8], key_len: usize) -> Result<KeySource> {
    let Some(raw) = passphrase.strip_prefix(b"raw:") else {
        return Ok(KeySource::Passphrase);
    };
    if raw.len() == key_len {
        return Ok(KeySource::Raw {
            key: raw.to_vec(),
            salt: None,
        });
    }
    if raw.len() == key_len + SALT_LEN {
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&raw[key_len..]);
        return Ok(KeySource::Raw {
            key: raw[..key_len].to_vec(),
            salt: Some(salt),
        });
    }
    if raw.len() == 2 * key_len {
        let key = decode_hex(raw)?;
        return Ok(KeySource::Raw { key, salt: None });
    }
    if raw.len() == 2 * (key_len + SALT_LEN) {
        let decoded = decode_hex(raw)?;
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&decoded[key_len..]);
        return Ok(KeySource::Raw {
            key: decoded[..key_len].to_vec(),
            salt: Some(salt),
        });
    }
    Err(CodecError::invalid(format!(
        "raw key of {} bytes matches no accepted form for a {key_len}-byte key",
        raw.len()
    )))
}

fn decode_hex(raw: &[u8]) -> Result<Vec<u8>> {
    if !raw.iter().all(u8::is_ascii_hexdigit) {
        return Err(CodecError::invalid("raw key contains non-hex characters"));
    }
    hex::decode(raw).map_err(CodecError::invalid)
}

/// Applies the shared salt rules: rekeying or a missing salt draws a
/// fresh one from the PRNG. Returns true when the salt came from the
/// file and must not be overridden by a raw key.
pub(crate) fn resolve_salt(
    store: &mut [u8; SALT_LEN],
    rekey: bool,
    provided: Option<&[u8; SALT_LEN]>,
) -> bool {
    match provided {
        Some(salt) if !rekey => {
            store.copy_from_slice(salt);
            true
        }
        _ => {
            rng::fill_random(store);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page1_layout_regular_pages() {
        let layout = page1_layout(2, false, 0);
        assert_eq!(layout.offset, 0);
        assert!(!layout.plain_header);
        assert_eq!(page1_layout(7, true, 32).offset, 0);
    }

    #[test]
    fn test_page1_layout_salt_prefix() {
        assert_eq!(page1_layout(1, false, 0).offset, PAGE1_OFFSET);
        assert_eq!(page1_layout(1, true, 0).offset, 0);
    }

    #[test]
    fn test_page1_layout_plaintext_header() {
        // Values below the salt width are pulled up to it.
        let layout = page1_layout(1, false, 8);
        assert_eq!(layout.offset, 16);
        assert!(layout.plain_header);
        assert_eq!(page1_layout(1, false, 32).offset, 32);
        assert_eq!(page1_layout(1, true, 8).offset, 8);
    }

    #[test]
    fn test_raw_key_passphrase_passthrough() {
        assert!(matches!(
            extract_raw_key(b"correct horse battery", 32).unwrap(),
            KeySource::Passphrase
        ));
    }

    #[test]
    fn test_raw_key_binary_forms() {
        let key: Vec<u8> = (0u8..32).collect();
        let mut pass = b"raw:".to_vec();
        pass.extend_from_slice(&key);
        match extract_raw_key(&pass, 32).unwrap() {
            KeySource::Raw { key: k, salt: None } => assert_eq!(k, key),
            _ => panic!("expected raw key without salt"),
        }

        pass.extend_from_slice(&[0xaa; SALT_LEN]);
        match extract_raw_key(&pass, 32).unwrap() {
            KeySource::Raw {
                key: k,
                salt: Some(s),
            } => {
                assert_eq!(k, key);
                assert_eq!(s, [0xaa; SALT_LEN]);
            }
            _ => panic!("expected raw key with salt"),
        }
    }

    #[test]
    fn test_raw_key_hex_forms() {
        let hexkey = "00112233445566778899aabbccddeeff";
        let pass = format!("raw:{hexkey}");
        match extract_raw_key(pass.as_bytes(), 16).unwrap() {
            KeySource::Raw { key, salt: None } => {
                assert_eq!(hex::encode(key), hexkey);
            }
            _ => panic!("expected hex raw key"),
        }

        let salt_hex = "ffeeddccbbaa99887766554433221100";
        let pass = format!("raw:{hexkey}{salt_hex}");
        match extract_raw_key(pass.as_bytes(), 16).unwrap() {
            KeySource::Raw {
                key,
                salt: Some(salt),
            } => {
                assert_eq!(hex::encode(key), hexkey);
                assert_eq!(hex::encode(salt), salt_hex);
            }
            _ => panic!("expected hex raw key with salt"),
        }
    }

    #[test]
    fn test_raw_key_bad_shapes() {
        // Wrong length.
        assert!(extract_raw_key(b"raw:tooshort", 32).is_err());
        // Right length for hex but not hex.
        let pass = format!("raw:{}", "zz".repeat(16));
        assert!(extract_raw_key(pass.as_bytes(), 16).is_err());
        // Empty remainder.
        assert!(extract_raw_key(b"raw:", 16).is_err());
    }

    // Round-trip law: decrypt(encrypt(page)) == page for every scheme,
    // page size and page number combination. Raw keys keep the KDFs out
    // of the loop.
    #[test]
    fn test_roundtrip_grid_all_schemes() {
        registry::initialize().unwrap();
        let key_lens = [
            ("aes128cbc", 16usize),
            ("aes256cbc", 32),
            ("chacha20", 32),
            ("sqlcipher", 32),
            ("rc4", 16),
            ("ascon128", 32),
            ("aegis", 32),
        ];
        for (name, key_len) in key_lens {
            let scheme = registry::with_registry(|r| r.by_name(name)).unwrap();
            let table = ParamTable::from_defs(scheme.params());
            let mut cipher = scheme.create(&table).unwrap();
            let raw = format!("raw:{}", "a5".repeat(key_len));
            cipher
                .generate_key(raw.as_bytes(), false, Some(&[0x77; SALT_LEN]))
                .unwrap();
            let reserved = cipher.reserved();

            for page_size in [512usize, 1024, 2048, 4096, 8192, 16384, 32768, 65536] {
                for page_no in [1u32, 2, 3, 17, 1024, 0x7fff_ffff] {
                    let mut plain = vec![0u8; page_size];
                    for (i, b) in plain.iter_mut().enumerate() {
                        *b = (i as u8).wrapping_mul(page_no as u8).wrapping_add(3);
                    }
                    if page_no == 1 {
                        plain[..16].copy_from_slice(&crate::config::SQLITE_MAGIC);
                    }
                    let mut page = plain.clone();
                    cipher.encrypt_page(page_no, &mut page, reserved).unwrap();
                    assert_ne!(page, plain, "{name} {page_size} {page_no}");
                    cipher
                        .decrypt_page(page_no, &mut page, reserved, true)
                        .unwrap();
                    assert_eq!(page, plain, "{name} {page_size} {page_no}");
                }
            }
        }
    }

    #[test]
    fn test_resolve_salt() {
        let file_salt = [7u8; SALT_LEN];
        let mut store = [0u8; SALT_LEN];
        assert!(resolve_salt(&mut store, false, Some(&file_salt)));
        assert_eq!(store, file_salt);

        // Rekey draws a fresh salt even when one is offered.
        let mut store = [0u8; SALT_LEN];
        assert!(!resolve_salt(&mut store, true, Some(&file_salt)));
        assert_ne!(store, file_salt);

        let mut a = [0u8; SALT_LEN];
        let mut b = [0u8; SALT_LEN];
        resolve_salt(&mut a, false, None);
        resolve_salt(&mut b, false, None);
        assert_ne!(a, b);
    }
}
