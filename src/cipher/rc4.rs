//! The legacy `rc4` scheme (System.Data.SQLite layout).
//!
//! RC4 over the page body with a per-page key hashed from the page
//! number and master key. Unauthenticated and cryptographically weak;
//! exists purely to read files written by the original extension.

use rc4::consts::U16;
use rc4::{KeyInit, Rc4, StreamCipher};
use zeroize::Zeroizing;

use crate::config::{MAX_PAGE_SIZE, SALT_LEN, SQLITE_MAGIC, WXAES_KDF_ITER, is_valid_page_size};
use crate::error::{CodecError, Result, check_page_no};
use crate::params::{ParamDef, ParamTable};
use crate::primitives::iv::page_iv_md5;
use crate::primitives::kdf::{PbkdfHash, pbkdf2_hmac};

use super::{CipherScheme, KeySource, PageCipher, extract_raw_key, page1_layout, resolve_salt};

const KEY_LEN: usize = 16;

const PARAMS: [ParamDef; 2] = [
    ParamDef::new("legacy", 1, 1, 1),
    ParamDef::new("legacy_page_size", 0, 0, MAX_PAGE_SIZE as i64),
];

/// Descriptor for `rc4`.
pub struct Rc4Scheme;

impl CipherScheme for Rc4Scheme {
    fn name(&self) -> &str {
        "rc4"
    }

    fn params(&self) -> &[ParamDef] {
        &PARAMS
    }

    fn create(&self, params: &ParamTable) -> Result<Box<dyn PageCipher>> {
        Ok(Box::new(Rc4Cipher {
            legacy_page_size: params.expect("legacy_page_size"),
            key: Zeroizing::new([0u8; KEY_LEN]),
            salt: [0u8; SALT_LEN],
        }))
    }
}

#[derive(Clone)]
struct Rc4Cipher {
    legacy_page_size: i64,
    key: Zeroizing<[u8; KEY_LEN]>,
    salt: [u8; SALT_LEN],
}

impl Rc4Cipher {
    fn apply(&self, page_no: u32, buf: &mut [u8]) {
        let page_key = page_iv_md5(page_no, &self.key[..]);
        let mut rc4 = Rc4::<U16>::new((&page_key).into());
        rc4.apply_keystream(buf);
    }
}

impl PageCipher for Rc4Cipher {
    fn scheme_name(&self) -> &str {
        "rc4"
    }

    fn legacy(&self) -> bool {
        true
    }

    fn page_size(&self) -> u32 {
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
        match extract_raw_key(passphrase, KEY_LEN)? {
            KeySource::Passphrase => pbkdf2_hmac(
                PbkdfHash::Sha1,
                passphrase,
                &self.salt,
                u32::try_from(WXAES_KDF_ITER).map_err(CodecError::invalid)?,
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
        if data.len() <= reserved {
            return Err(CodecError::invalid("page shorter than its reserved tail"));
        }
        let n = data.len() - reserved;
        let layout = page1_layout(page_no, false, 0);
        self.apply(page_no, &mut data[layout.offset..n]);
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
        // RC4 is its own inverse.
        self.apply(page_no, &mut data[layout.offset..n]);
        if page_no == 1 {
            data[..SALT_LEN].copy_from_slice(&SQLITE_MAGIC);
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn PageCipher> {
        Box::new(self.clone())
    }
}
