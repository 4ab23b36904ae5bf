//! The legacy `aes128cbc` and `aes256cbc` schemes (wxSQLite3 layout).
//!
//! No reserved tail and no authentication: the page body is AES-CBC
//! encrypted under a deterministic IV hashed from the page number and
//! key. Kept bit-compatible for existing files; new databases should
//! prefer an authenticated scheme.

use zeroize::Zeroizing;

use crate::config::{MAX_PAGE_SIZE, SALT_LEN, SQLITE_MAGIC, WXAES_KDF_ITER, is_valid_page_size};
use crate::error::{CodecError, Result, check_page_no};
use crate::params::{ParamDef, ParamTable};
use crate::primitives::cbc::AesCbc;
use crate::primitives::iv::page_iv_sha1;
use crate::primitives::kdf::{PbkdfHash, pbkdf2_hmac};

use super::{CipherScheme, KeySource, PageCipher, extract_raw_key, page1_layout, resolve_salt};

const PARAMS: [ParamDef; 3] = [
    ParamDef::new("legacy", 0, 0, 1),
    ParamDef::new("legacy_page_size", 0, 0, MAX_PAGE_SIZE as i64),
    ParamDef::new("kdf_iter", WXAES_KDF_ITER, 1, i32::MAX as i64),
];

/// Descriptor for `aes128cbc`.
pub struct Aes128CbcScheme;

/// Descriptor for `aes256cbc`.
pub struct Aes256CbcScheme;

impl CipherScheme for Aes128CbcScheme {
    fn name(&self) -> &str {
        "aes128cbc"
    }

    fn params(&self) -> &[ParamDef] {
        &PARAMS
    }

    fn create(&self, params: &ParamTable) -> Result<Box<dyn PageCipher>> {
        Ok(Box::new(AesCbcCipher::new("aes128cbc", 16, params)))
    }
}

impl CipherScheme for Aes256CbcScheme {
    fn name(&self) -> &str {
        "aes256cbc"
    }

    fn params(&self) -> &[ParamDef] {
        &PARAMS
    }

    fn create(&self, params: &ParamTable) -> Result<Box<dyn PageCipher>> {
        Ok(Box::new(AesCbcCipher::new("aes256cbc", 32, params)))
    }
}

#[derive(Clone)]
struct AesCbcCipher {
    name: &'static str,
    key_len: usize,
    legacy: bool,
    legacy_page_size: i64,
    kdf_iter: i64,
    key: Zeroizing<Vec<u8>>,
    salt: [u8; SALT_LEN],
    schedule: Option<AesCbc>,
}

impl AesCbcCipher {
    fn new(name: &'static str, key_len: usize, params: &ParamTable) -> Self {
        Self {
            name,
            key_len,
            legacy: params.expect("legacy") != 0,
            legacy_page_size: params.expect("legacy_page_size"),
            kdf_iter: params.expect("kdf_iter"),
            key: Zeroizing::new(vec![0u8; key_len]),
            salt: [0u8; SALT_LEN],
            schedule: None,
        }
    }

    fn schedule(&self) -> Result<&AesCbc> {
        self.schedule
            .as_ref()
            .ok_or_else(|| CodecError::invalid("cipher used before key derivation"))
    }
}

impl PageCipher for AesCbcCipher {
    fn scheme_name(&self) -> &str {
        self.name
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
        0
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
        match extract_raw_key(passphrase, self.key_len)? {
            KeySource::Passphrase => pbkdf2_hmac(
                PbkdfHash::Sha1,
                passphrase,
                &self.salt,
                u32::try_from(self.kdf_iter).map_err(CodecError::invalid)?,
                &mut self.key[..],
            )?,
            KeySource::Raw { key, salt } => {
                self.key.copy_from_slice(&key);
                if let Some(raw_salt) = salt
                    && !key_only
                {
                    self.salt = raw_salt;
                }
            }
        }
        self.schedule = Some(AesCbc::new(&self.key)?);
        Ok(())
    }

    fn encrypt_page(&self, page_no: u32, data: &mut [u8], reserved: usize) -> Result<()> {
        check_page_no(page_no)?;
        if data.len() <= reserved {
            return Err(CodecError::invalid("page shorter than its reserved tail"));
        }
        let n = data.len() - reserved;
        let layout = page1_layout(page_no, false, 0);
        let iv = page_iv_sha1(page_no, &self.key);
        self.schedule()?.encrypt(&iv, &mut data[layout.offset..n])?;
        if page_no == 1 {
            data[..SALT_LEN].copy_from_slice(&self.salt);
        }
        Ok(())
    }

    fn decrypt_page(
        &self,
        page_no: u32,
        data: &mut [u8],
        reserved: usize,
        _check_mac: bool,
    ) -> Result<()> {
        check_page_no(page_no)?;
        if data.len() <= reserved {
            return Err(CodecError::invalid("page shorter than its reserved tail"));
        }
        let n = data.len() - reserved;
        let layout = page1_layout(page_no, false, 0);
        let iv = page_iv_sha1(page_no, &self.key);
        self.schedule()?.decrypt(&iv, &mut data[layout.offset..n])?;
        if page_no == 1 {
            data[..SALT_LEN].copy_from_slice(&SQLITE_MAGIC);
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

    fn keyed(scheme: &dyn CipherScheme, passphrase: &[u8], salt: Option<&[u8; 16]>) -> Box<dyn PageCipher> {
        let table = ParamTable::from_defs(&PARAMS);
        let mut cipher = scheme.create(&table).unwrap();
        cipher.generate_key(passphrase, false, salt).unwrap();
        cipher
    }

    // AES-256-CBC, page 2, reserved 0, key from
    // PBKDF2-HMAC-SHA1("test", zero salt, 4001 iterations).
    #[test]
    fn test_aes256_zero_page_roundtrip() {
        let cipher = keyed(&Aes256CbcScheme, b"test", Some(&[0u8; 16]));
        let mut page = vec![0u8; 4096];
        cipher.encrypt_page(2, &mut page, 0).unwrap();
        assert_ne!(page, vec![0u8; 4096]);
        cipher.decrypt_page(2, &mut page, 0, true).unwrap();
        assert_eq!(page, vec![0u8; 4096]);
    }

    // No MAC: tampering is not detected, it just decrypts to garbage.
    #[test]
    fn test_aes_cbc_has_no_authentication() {
        let cipher = keyed(&Aes256CbcScheme, b"test", Some(&[0u8; 16]));
        let mut page = vec![0u8; 4096];
        cipher.encrypt_page(2, &mut page, 0).unwrap();
        page[100] ^= 0x01;
        cipher.decrypt_page(2, &mut page, 0, true).unwrap();
        assert_ne!(page, vec![0u8; 4096]);
    }

    #[test]
    fn test_key_sizes_differ() {
        let salt = [3u8; 16];
        let a128 = keyed(&Aes128CbcScheme, b"pw", Some(&salt));
        let a256 = keyed(&Aes256CbcScheme, b"pw", Some(&salt));
        let mut p1 = vec![0x7fu8; 512];
        let mut p2 = p1.clone();
        a128.encrypt_page(2, &mut p1, 0).unwrap();
        a256.encrypt_page(2, &mut p2, 0).unwrap();
        assert_ne!(p1, p2);
    }

    #[test]
    fn test_page1_salt_and_magic() {
        let cipher = keyed(&Aes128CbcScheme, b"pw", None);
        let mut page = vec![0u8; 1024];
        page[..16].copy_from_slice(&SQLITE_MAGIC);
        cipher.encrypt_page(1, &mut page, 0).unwrap();
        assert_eq!(&page[..16], cipher.salt());
        cipher.decrypt_page(1, &mut page, 0, true).unwrap();
        assert_eq!(&page[..16], &SQLITE_MAGIC);
        assert!(page[16..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_pages_use_distinct_ivs() {
        let cipher = keyed(&Aes256CbcScheme, b"pw", None);
        let mut p2 = vec![0u8; 512];
        let mut p3 = vec![0u8; 512];
        cipher.encrypt_page(2, &mut p2, 0).unwrap();
        cipher.encrypt_page(3, &mut p3, 0).unwrap();
        assert_ne!(p2, p3);
    }

    #[test]
    fn test_unkeyed_cipher_refuses_work() {
        let table = ParamTable::from_defs(&PARAMS);
        let cipher = Aes256CbcScheme.create(&table).unwrap();
        let mut page = vec![0u8; 512];
        assert!(cipher.encrypt_page(2, &mut page, 0).is_err());
    }
}
