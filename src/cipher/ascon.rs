//! The `ascon128` scheme: Ascon-128 AEAD with per-page keys hashed out
//! of the master key.
//!
//! The page nonce seeds an Ascon-hash of `key || nonce || BE32(page)`;
//! the 32-byte digest splits into the AEAD key and AEAD nonce for that
//! page. On disk the tail is `tag(16) || nonce(16)`.

use ascon_hash::{AsconHash, Digest};
use zeroize::Zeroizing;

use crate::config::{ASCON_KDF_ITER, PLAINTEXT_HEADER_MAX, SALT_LEN, SQLITE_MAGIC};
use crate::error::{CodecError, Result, check_page_no};
use crate::params::{ParamDef, ParamTable};
use crate::primitives::ascon::{ascon128_open_unchecked, ascon128_seal};
use crate::primitives::iv::page_iv_sha1;
use crate::primitives::kdf::pbkdf2_ascon;
use crate::primitives::rng;
use crate::primitives::verify::verify_16;

use super::{CipherScheme, KeySource, PageCipher, extract_raw_key, page1_layout, resolve_salt};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 16;
const TAG_LEN: usize = 16;
const RESERVED: usize = NONCE_LEN + TAG_LEN;

const PARAMS: [ParamDef; 2] = [
    ParamDef::new("kdf_iter", ASCON_KDF_ITER, 1, i32::MAX as i64),
    ParamDef::new("plaintext_header_size", 0, 0, PLAINTEXT_HEADER_MAX),
];

/// Descriptor for `ascon128`.
pub struct Ascon128Scheme;

impl CipherScheme for Ascon128Scheme {
    fn name(&self) -> &str {
        "ascon128"
    }

    fn params(&self) -> &[ParamDef] {
        &PARAMS
    }

    fn create(&self, params: &ParamTable) -> Result<Box<dyn PageCipher>> {
        Ok(Box::new(Ascon128Cipher {
            kdf_iter: params.expect("kdf_iter"),
            plaintext_header_size: params.expect("plaintext_header_size"),
            key: Zeroizing::new([0u8; KEY_LEN]),
            salt: [0u8; SALT_LEN],
        }))
    }
}

#[derive(Clone)]
struct Ascon128Cipher {
    kdf_iter: i64,
    plaintext_header_size: i64,
    key: Zeroizing<[u8; KEY_LEN]>,
    salt: [u8; SALT_LEN],
}

impl Ascon128Cipher {
    /// Per-page AEAD key and nonce from the master key, page nonce and
    /// page number.
    fn one_time_keys(&self, nonce: &[u8; NONCE_LEN], page_no: u32) -> Zeroizing<[u8; 32]> {
        let mut hasher = AsconHash::new();
        hasher.update(&self.key[..]);
        hasher.update(nonce);
        hasher.update(page_no.to_be_bytes());
        Zeroizing::new(hasher.finalize().into())
    }

    fn effective_reserved(&self, reserved: usize) -> usize {
        if reserved == 0 { 0 } else { RESERVED }
    }
}

impl PageCipher for Ascon128Cipher {
    fn scheme_name(&self) -> &str {
        "ascon128"
    }

    fn reserved(&self) -> usize {
        RESERVED
    }

    fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    fn generate_key(
        &mut self,
        passphrase: &[u8],
        rekey: bool,
        salt: Option<&[u8; SALT_LEN]>,
    ) -> Result<()> {
        let key_only = resolve_salt(&mut self.salt, rekey, salt);
        match extract_raw_key(passphrase, KEY_LEN)? {
            KeySource::Passphrase => pbkdf2_ascon(
                passphrase,
                &self.salt,
                u32::try_from(self.kdf_iter).map_err(CodecError::invalid)?,
                &mut self.key[..],
            ),
            KeySource::Raw { key, salt } => {
                self.key.copy_from_slice(&key);
                if let Some(raw_salt) = salt
                    && !key_only
                {
                    self.salt = raw_salt;
                }
                Ok(())
            }
        }
    }

    fn encrypt_page(&self, page_no: u32, data: &mut [u8], reserved: usize) -> Result<()> {
        check_page_no(page_no)?;
        let n_reserved = self.effective_reserved(reserved);
        if n_reserved > reserved {
            return Err(CodecError::Corrupt);
        }
        if data.len() <= n_reserved {
            return Err(CodecError::invalid("page shorter than its reserved tail"));
        }
        let n = data.len() - n_reserved;
        let layout = page1_layout(page_no, false, self.plaintext_header_size);

        if n_reserved > 0 {
            let (body, tail) = data.split_at_mut(n);
            let (tag_buf, nonce_buf) = tail.split_at_mut(TAG_LEN);
            rng::fill_random(nonce_buf);
            let nonce: &[u8; NONCE_LEN] = (&*nonce_buf).try_into().expect("nonce width");
            let otk = self.one_time_keys(nonce, page_no);
            let aead_key: &[u8; 16] = otk[..16].try_into().expect("otk half");
            let aead_nonce: &[u8; 16] = otk[16..].try_into().expect("otk half");
            let tag = ascon128_seal(&mut body[layout.offset..], b"", aead_nonce, aead_key);
            tag_buf.copy_from_slice(&tag);
            if page_no == 1 && !layout.plain_header {
                body[..SALT_LEN].copy_from_slice(&self.salt);
            }
        } else {
            let nonce = page_iv_sha1(page_no, &[]);
            let otk = self.one_time_keys(&nonce, page_no);
            let aead_key: &[u8; 16] = otk[..16].try_into().expect("otk half");
            let aead_nonce: &[u8; 16] = otk[16..].try_into().expect("otk half");
            ascon128_seal(&mut data[layout.offset..n], b"", aead_nonce, aead_key);
            if page_no == 1 && !layout.plain_header {
                data[..SALT_LEN].copy_from_slice(&self.salt);
            }
        }
        Ok(())
    }

    fn decrypt_page(
        &self,
        page_no: u32,
        data: &mut [u8],
        reserved: usize,
        check_mac: bool,
    ) -> Result<()> {
        check_page_no(page_no)?;
        let n_reserved = self.effective_reserved(reserved);
        if n_reserved > reserved {
            return Err(CodecError::bad_page(page_no));
        }
        if data.len() <= n_reserved {
            return Err(CodecError::invalid("page shorter than its reserved tail"));
        }
        let n = data.len() - n_reserved;
        let layout = page1_layout(page_no, false, self.plaintext_header_size);

        if n_reserved > 0 {
            let (body, tail) = data.split_at_mut(n);
            let (tag_buf, nonce_buf) = tail.split_at(TAG_LEN);
            let nonce: &[u8; NONCE_LEN] = nonce_buf.try_into().expect("nonce width");
            let otk = self.one_time_keys(nonce, page_no);
            let aead_key: &[u8; 16] = otk[..16].try_into().expect("otk half");
            let aead_nonce: &[u8; 16] = otk[16..].try_into().expect("otk half");
            let computed =
                ascon128_open_unchecked(&mut body[layout.offset..], b"", aead_nonce, aead_key);
            if check_mac {
                let stored: &[u8; TAG_LEN] = tag_buf.try_into().expect("tag width");
                if !verify_16(stored, &computed) {
                    tracing::debug!(page_no, "ascon tag mismatch");
                    return Err(CodecError::bad_page(page_no));
                }
            }
            if page_no == 1 && !layout.plain_header {
                body[..SALT_LEN].copy_from_slice(&SQLITE_MAGIC);
            }
        } else {
            let nonce = page_iv_sha1(page_no, &[]);
            let otk = self.one_time_keys(&nonce, page_no);
            let aead_key: &[u8; 16] = otk[..16].try_into().expect("otk half");
            let aead_nonce: &[u8; 16] = otk[16..].try_into().expect("otk half");
            ascon128_open_unchecked(&mut data[layout.offset..n], b"", aead_nonce, aead_key);
            if page_no == 1 && !layout.plain_header {
                data[..SALT_LEN].copy_from_slice(&SQLITE_MAGIC);
            }
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn PageCipher> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed(passphrase: &[u8]) -> Box<dyn PageCipher> {
        let table = ParamTable::from_defs(&PARAMS);
        let mut cipher = Ascon128Scheme.create(&table).unwrap();
        cipher.generate_key(passphrase, false, None).unwrap();
        cipher
    }

    #[test]
    fn test_roundtrip_with_tail_layout() {
        let cipher = keyed(b"lightweight");
        let original: Vec<u8> = (0..2048).map(|i| (i % 256) as u8).collect();
        let mut page = original.clone();
        cipher.encrypt_page(5, &mut page, RESERVED).unwrap();
        assert_ne!(&page[..2016], &original[..2016]);
        cipher.decrypt_page(5, &mut page, RESERVED, true).unwrap();
        assert_eq!(page, original);
    }

    #[test]
    fn test_page1_magic_restored() {
        let cipher = keyed(b"lightweight");
        let mut page = vec![0xccu8; 4096];
        page[..16].copy_from_slice(&SQLITE_MAGIC);
        cipher.encrypt_page(1, &mut page, RESERVED).unwrap();
        assert_eq!(&page[..16], cipher.salt());
        cipher.decrypt_page(1, &mut page, RESERVED, true).unwrap();
        assert_eq!(&page[..16], &SQLITE_MAGIC);
        assert!(page[16..4064].iter().all(|&b| b == 0xcc));
    }

    #[test]
    fn test_tamper_detected() {
        let cipher = keyed(b"lightweight");
        let mut page = vec![0x61u8; 1024];
        cipher.encrypt_page(2, &mut page, RESERVED).unwrap();
        for position in [10, 992, 1000, 1010] {
            let mut tampered = page.clone();
            tampered[position] ^= 0x04;
            assert_eq!(
                cipher
                    .decrypt_page(2, &mut tampered, RESERVED, true)
                    .unwrap_err(),
                CodecError::Corrupt,
                "position {position}"
            );
        }
    }

    #[test]
    fn test_recovery_read_skips_tag() {
        let cipher = keyed(b"lightweight");
        let mut page = vec![0x61u8; 1024];
        cipher.encrypt_page(2, &mut page, RESERVED).unwrap();
        page[10] ^= 0x04;
        cipher.decrypt_page(2, &mut page, RESERVED, false).unwrap();
        // Garbage where the flip landed, but the buffer survives.
        assert!(page.iter().any(|&b| b != 0));
    }

    #[test]
    fn test_unauthenticated_mode() {
        let cipher = keyed(b"lightweight");
        let original = vec![0x12u8; 512];
        let mut page = original.clone();
        cipher.encrypt_page(9, &mut page, 0).unwrap();
        assert_ne!(page, original);
        cipher.decrypt_page(9, &mut page, 0, true).unwrap();
        assert_eq!(page, original);
    }

    #[test]
    fn test_kdf_iterations_matter() {
        let mut table = ParamTable::from_defs(&PARAMS);
        table.set("kdf_iter", 1000).unwrap();
        let mut a = Ascon128Scheme.create(&table).unwrap();
        a.generate_key(b"pw", false, Some(&[9u8; 16])).unwrap();

        table.set("kdf_iter", 1001).unwrap();
        let mut b = Ascon128Scheme.create(&table).unwrap();
        b.generate_key(b"pw", false, Some(&[9u8; 16])).unwrap();

        let mut page = vec![0u8; 512];
        a.encrypt_page(2, &mut page, RESERVED).unwrap();
        assert_eq!(
            b.decrypt_page(2, &mut page, RESERVED, true).unwrap_err(),
            CodecError::Corrupt
        );
    }
}
