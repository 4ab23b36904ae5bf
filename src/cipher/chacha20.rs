//! The `chacha20` scheme: ChaCha20 body encryption with a Poly1305 tag,
//! plus the sqleet-compatible legacy mode.
//!
//! Per page, a fresh 16-byte nonce seeds a 64-byte one-time-key block:
//! the first half keys Poly1305, the second half keys the body stream.
//! The block counter is the low word of the nonce XORed with the page
//! number, so two pages never share a keystream even under a repeated
//! nonce. On disk the tail is `tag(16) || nonce(16)`.

use zeroize::Zeroizing;

use crate::config::{
    CHACHA20_KDF_ITER, CHACHA20_LEGACY_PAGE_SIZE, PLAINTEXT_HEADER_MAX, SALT_LEN, SQLEET_KDF_ITER,
    SQLITE_MAGIC, is_valid_page_size,
};
use crate::error::{CodecError, Result, check_page_no};
use crate::params::{ParamDef, ParamTable};
use crate::primitives::chacha::{chacha20_xor, poly1305_tag};
use crate::primitives::iv::page_iv_sha1;
use crate::primitives::kdf::{PbkdfHash, pbkdf2_hmac};
use crate::primitives::rng;
use crate::primitives::verify::verify_16;

use super::{CipherScheme, KeySource, PageCipher, extract_raw_key, page1_layout, resolve_salt};

pub(crate) const KEY_LEN: usize = 32;
pub(crate) const NONCE_LEN: usize = 16;
pub(crate) const TAG_LEN: usize = 16;
pub(crate) const RESERVED: usize = NONCE_LEN + TAG_LEN;

const PARAMS: [ParamDef; 4] = [
    ParamDef::new("legacy", 0, 0, 1),
    ParamDef::new(
        "legacy_page_size",
        CHACHA20_LEGACY_PAGE_SIZE,
        0,
        crate::config::MAX_PAGE_SIZE as i64,
    ),
    ParamDef::new("kdf_iter", CHACHA20_KDF_ITER, 1, i32::MAX as i64),
    ParamDef::new("plaintext_header_size", 0, 0, PLAINTEXT_HEADER_MAX),
];

/// Descriptor for the default scheme.
pub struct ChaCha20Scheme;

impl CipherScheme for ChaCha20Scheme {
    fn name(&self) -> &str {
        "chacha20"
    }

    fn params(&self) -> &[ParamDef] {
        &PARAMS
    }

    fn create(&self, params: &ParamTable) -> Result<Box<dyn PageCipher>> {
        let legacy = params.expect("legacy") != 0;
        Ok(Box::new(ChaCha20Cipher {
            legacy,
            legacy_page_size: params.expect("legacy_page_size"),
            // sqleet pinned its iteration count.
            kdf_iter: if legacy {
                SQLEET_KDF_ITER
            } else {
                params.expect("kdf_iter")
            },
            plaintext_header_size: params.expect("plaintext_header_size"),
            key: Zeroizing::new([0u8; KEY_LEN]),
            salt: [0u8; SALT_LEN],
        }))
    }
}

#[derive(Clone)]
struct ChaCha20Cipher {
    legacy: bool,
    legacy_page_size: i64,
    kdf_iter: i64,
    plaintext_header_size: i64,
    key: Zeroizing<[u8; KEY_LEN]>,
    salt: [u8; SALT_LEN],
}

impl ChaCha20Cipher {
    fn effective_reserved(&self, reserved: usize) -> usize {
        if reserved == 0 && !self.legacy {
            0
        } else {
            RESERVED
        }
    }

    fn check_reserved(&self, n_reserved: usize, reserved: usize, page_no: u32) -> Result<()> {
        let mismatch = if self.legacy {
            n_reserved != reserved
        } else {
            n_reserved > reserved
        };
        if mismatch {
            return Err(CodecError::bad_page(page_no));
        }
        Ok(())
    }

    /// 64 bytes of one-time key material for `(nonce, page_no)`, and the
    /// body counter that follows it.
    fn one_time_keys(&self, nonce: &[u8; NONCE_LEN], page_no: u32) -> (Zeroizing<[u8; 64]>, u32) {
        let counter =
            u32::from_le_bytes(nonce[NONCE_LEN - 4..].try_into().expect("nonce tail")) ^ page_no;
        let mut otk = Zeroizing::new([0u8; 64]);
        let prefix: &[u8; 12] = nonce[..12].try_into().expect("nonce prefix");
        chacha20_xor(&mut otk[..], &self.key, prefix, counter);
        (otk, counter)
    }
}

impl PageCipher for ChaCha20Cipher {
    fn scheme_name(&self) -> &str {
        "chacha20"
    }

    fn legacy(&self) -> bool {
        self.legacy
    }

    fn page_size(&self) -> u32 {
        if !self.legacy {
            return 0;
        }
        let size = usize::try_from(self.legacy_page_size).unwrap_or(0);
        if is_valid_page_size(size) {
            size as u32
        } else {
            0
        }
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
            KeySource::Passphrase => pbkdf2_hmac(
                PbkdfHash::Sha256,
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
        if self.legacy && reserved != n_reserved || !self.legacy && n_reserved > reserved {
            return Err(CodecError::Corrupt);
        }
        if data.len() <= n_reserved {
            return Err(CodecError::invalid("page shorter than its reserved tail"));
        }
        let n = data.len() - n_reserved;
        let layout = page1_layout(page_no, self.legacy, self.plaintext_header_size);

        if n_reserved > 0 {
            let (body, tail) = data.split_at_mut(n);
            let (tag_buf, nonce_buf) = tail.split_at_mut(TAG_LEN);
            rng::fill_random(nonce_buf);
            let nonce: &[u8; NONCE_LEN] = (&*nonce_buf).try_into().expect("nonce width");
            let (otk, counter) = self.one_time_keys(nonce, page_no);

            let stream_key: &[u8; 32] = otk[32..].try_into().expect("otk half");
            let prefix: &[u8; 12] = nonce[..12].try_into().expect("nonce prefix");
            chacha20_xor(&mut body[layout.offset..], stream_key, prefix, counter.wrapping_add(1));
            if page_no == 1 && !layout.plain_header {
                body[..SALT_LEN].copy_from_slice(&self.salt);
            }
            let mac_key: &[u8; 32] = otk[..32].try_into().expect("otk half");
            tag_buf.copy_from_slice(&poly1305_tag(&[&*body, &*nonce_buf], mac_key));
        } else {
            let nonce = page_iv_sha1(page_no, &[]);
            let (otk, counter) = self.one_time_keys(&nonce, page_no);
            let stream_key: &[u8; 32] = otk[32..].try_into().expect("otk half");
            let prefix: &[u8; 12] = nonce[..12].try_into().expect("nonce prefix");
            chacha20_xor(&mut data[layout.offset..n], stream_key, prefix, counter.wrapping_add(1));
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
        self.check_reserved(n_reserved, reserved, page_no)?;
        if data.len() <= n_reserved {
            return Err(CodecError::invalid("page shorter than its reserved tail"));
        }
        let n = data.len() - n_reserved;
        let layout = page1_layout(page_no, self.legacy, self.plaintext_header_size);

        if n_reserved > 0 {
            let (body, tail) = data.split_at_mut(n);
            let (tag_buf, nonce_buf) = tail.split_at(TAG_LEN);
            let nonce: &[u8; NONCE_LEN] = nonce_buf.try_into().expect("nonce width");
            let (otk, counter) = self.one_time_keys(nonce, page_no);

            // The tag covers the ciphertext, so compute before decrypting.
            let mac_key: &[u8; 32] = otk[..32].try_into().expect("otk half");
            let expected = poly1305_tag(&[&*body, nonce_buf], mac_key);

            let stream_key: &[u8; 32] = otk[32..].try_into().expect("otk half");
            let prefix: &[u8; 12] = nonce[..12].try_into().expect("nonce prefix");
            chacha20_xor(&mut body[layout.offset..], stream_key, prefix, counter.wrapping_add(1));

            if check_mac {
                let stored: &[u8; TAG_LEN] = tag_buf.try_into().expect("tag width");
                if !verify_16(stored, &expected) {
                    tracing::debug!(page_no, "poly1305 tag mismatch");
                    return Err(CodecError::bad_page(page_no));
                }
            }
            if page_no == 1 && !layout.plain_header {
                body[..SALT_LEN].copy_from_slice(&SQLITE_MAGIC);
            }
        } else {
            let nonce = page_iv_sha1(page_no, &[]);
            let (otk, counter) = self.one_time_keys(&nonce, page_no);
            let stream_key: &[u8; 32] = otk[32..].try_into().expect("otk half");
            let prefix: &[u8; 12] = nonce[..12].try_into().expect("nonce prefix");
            chacha20_xor(&mut data[layout.offset..n], stream_key, prefix, counter.wrapping_add(1));
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

    fn keyed_cipher(passphrase: &[u8]) -> Box<dyn PageCipher> {
        let table = ParamTable::from_defs(&PARAMS);
        let mut cipher = ChaCha20Scheme.create(&table).unwrap();
        cipher.generate_key(passphrase, false, None).unwrap();
        cipher
    }

    // Page 1 on disk: salt, ciphertext, tag, nonce, in that order.
    #[test]
    fn test_page1_layout_on_disk() {
        let cipher = keyed_cipher(b"secret");
        let mut page = vec![0u8; 4096];
        page[..16].copy_from_slice(&SQLITE_MAGIC);
        page[16..].fill(0xaa);
        let original = page.clone();

        cipher.encrypt_page(1, &mut page, RESERVED).unwrap();
        assert_eq!(&page[..16], cipher.salt());
        assert_ne!(&page[16..4064], &original[16..4064]);
        let tag_zero = page[4064..4080].iter().all(|&b| b == 0);
        let nonce_zero = page[4080..4096].iter().all(|&b| b == 0);
        assert!(!tag_zero);
        assert!(!nonce_zero);

        cipher.decrypt_page(1, &mut page, RESERVED, true).unwrap();
        assert_eq!(page, original);
    }

    #[test]
    fn test_wrong_key_is_not_a_database() {
        let cipher = keyed_cipher(b"secret");
        let mut page = vec![0u8; 4096];
        page[..16].copy_from_slice(&SQLITE_MAGIC);
        cipher.encrypt_page(1, &mut page, RESERVED).unwrap();

        let other = keyed_cipher(b"not the secret");
        let err = other
            .decrypt_page(1, &mut page, RESERVED, true)
            .unwrap_err();
        assert_eq!(err, CodecError::NotADatabase);
    }

    #[test]
    fn test_bit_flip_detected_everywhere() {
        let cipher = keyed_cipher(b"secret");
        let mut page = vec![0x42u8; 2048];
        cipher.encrypt_page(9, &mut page, RESERVED).unwrap();
        for position in [0, 100, 2015, 2016, 2031, 2032, 2047] {
            let mut tampered = page.clone();
            tampered[position] ^= 0x01;
            let err = cipher
                .decrypt_page(9, &mut tampered, RESERVED, true)
                .unwrap_err();
            assert_eq!(err, CodecError::Corrupt, "position {position}");
        }
    }

    #[test]
    fn test_check_mac_false_allows_recovery() {
        let cipher = keyed_cipher(b"secret");
        let mut page = vec![0x42u8; 1024];
        cipher.encrypt_page(3, &mut page, RESERVED).unwrap();
        page[1000] ^= 0xff;
        // Not an error; the caller asked for best-effort plaintext.
        cipher.decrypt_page(3, &mut page, RESERVED, false).unwrap();
    }

    #[test]
    fn test_reserved_zero_is_unauthenticated_mode() {
        let cipher = keyed_cipher(b"secret");
        let original = vec![0x17u8; 512];
        let mut page = original.clone();
        cipher.encrypt_page(5, &mut page, 0).unwrap();
        assert_eq!(page.len(), 512);
        assert_ne!(page, original);
        cipher.decrypt_page(5, &mut page, 0, true).unwrap();
        assert_eq!(page, original);
    }

    #[test]
    fn test_partial_reserve_rejected() {
        let cipher = keyed_cipher(b"secret");
        let mut page = vec![0u8; 1024];
        assert_eq!(
            cipher.encrypt_page(2, &mut page, 16).unwrap_err(),
            CodecError::Corrupt
        );
        assert_eq!(
            cipher.decrypt_page(1, &mut page, 16, true).unwrap_err(),
            CodecError::NotADatabase
        );
    }

    #[test]
    fn test_page_zero_rejected() {
        let cipher = keyed_cipher(b"secret");
        let mut page = vec![0u8; 512];
        assert!(matches!(
            cipher.encrypt_page(0, &mut page, RESERVED),
            Err(CodecError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_legacy_mode_fixed_page_size_and_kdf() {
        let mut table = ParamTable::from_defs(&PARAMS);
        table.set("legacy", 1).unwrap();
        let mut cipher = ChaCha20Scheme.create(&table).unwrap();
        cipher.generate_key(b"secret", false, None).unwrap();
        assert!(cipher.legacy());
        assert_eq!(cipher.page_size(), 4096);

        // Legacy encrypts page 1 from offset zero and still plants the salt.
        let mut page = vec![0x11u8; 4096];
        cipher.encrypt_page(1, &mut page, RESERVED).unwrap();
        assert_eq!(&page[..16], cipher.salt());
        cipher.decrypt_page(1, &mut page, RESERVED, true).unwrap();
        assert_eq!(&page[..16], &SQLITE_MAGIC);
        assert!(page[16..].iter().all(|&b| b == 0x11));

        // Legacy requires the full reserve, even for "unauthenticated" use.
        assert!(cipher.encrypt_page(2, &mut page, 0).is_err());
    }

    #[test]
    fn test_plaintext_header_preserved() {
        let mut table = ParamTable::from_defs(&PARAMS);
        table.set("plaintext_header_size", 32).unwrap();
        let mut cipher = ChaCha20Scheme.create(&table).unwrap();
        cipher.generate_key(b"secret", false, None).unwrap();

        let mut page = vec![0u8; 4096];
        page[..16].copy_from_slice(&SQLITE_MAGIC);
        page[16..32].fill(0x77);
        let original = page.clone();
        cipher.encrypt_page(1, &mut page, RESERVED).unwrap();
        // The whole 32-byte header stays readable on disk.
        assert_eq!(&page[..32], &original[..32]);
        cipher.decrypt_page(1, &mut page, RESERVED, true).unwrap();
        assert_eq!(page, original);
    }

    #[test]
    fn test_raw_key_bypasses_kdf() {
        let hexkey = "f0".repeat(32);
        let pass = format!("raw:{hexkey}");
        let a = keyed_cipher(pass.as_bytes());
        let b = keyed_cipher(pass.as_bytes());

        // Identical raw keys decrypt each other's pages; no KDF, no
        // salt dependence in the page transform.
        let mut page = vec![0x55u8; 1024];
        a.encrypt_page(2, &mut page, RESERVED).unwrap();
        b.decrypt_page(2, &mut page, RESERVED, true).unwrap();
        assert!(page.iter().all(|&b| b == 0x55));
    }

    #[test]
    fn test_raw_key_with_salt_adopts_salt() {
        let pass = format!("raw:{}{}", "f0".repeat(32), "1b".repeat(16));
        let cipher = keyed_cipher(pass.as_bytes());
        assert_eq!(cipher.salt(), &[0x1b; 16]);
    }
}
