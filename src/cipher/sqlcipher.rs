//! The `sqlcipher` scheme: AES-256-CBC bodies with an HMAC trailer,
//! bit-compatible with SQLCipher file versions 1 through 4.
//!
//! Per page the tail is `IV(16) || HMAC(20/32/64)`. The HMAC key is a
//! secondary PBKDF2 run over the encryption key with the 0x3a-masked
//! salt. The compat version selects iteration counts and hash families;
//! explicit parameter settings win over the version preset.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use zeroize::Zeroizing;

use crate::config::{
    PLAINTEXT_HEADER_MAX, SALT_LEN, SQLCIPHER_FAST_KDF_ITER, SQLCIPHER_HMAC_SALT_MASK,
    SQLCIPHER_KDF_ITER, SQLCIPHER_VERSION_MAX, SQLITE_MAGIC, is_valid_page_size,
};
use crate::error::{CodecError, Result, check_page_no};
use crate::params::{ParamDef, ParamTable};
use crate::primitives::cbc::AesCbc;
use crate::primitives::iv::page_iv_sha1;
use crate::primitives::kdf::{PbkdfHash, pbkdf2_hmac};
use crate::primitives::rng;
use crate::primitives::verify::verify_slices;

use super::{CipherScheme, KeySource, PageCipher, extract_raw_key, page1_layout, resolve_salt};

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

const PARAMS: [ParamDef; 10] = [
    ParamDef::new("legacy", SQLCIPHER_VERSION_MAX, 0, SQLCIPHER_VERSION_MAX),
    ParamDef::new("legacy_page_size", 4096, 0, crate::config::MAX_PAGE_SIZE as i64),
    ParamDef::new("kdf_iter", SQLCIPHER_KDF_ITER, 1, i32::MAX as i64),
    ParamDef::new("fast_kdf_iter", SQLCIPHER_FAST_KDF_ITER, 1, i32::MAX as i64),
    ParamDef::new("hmac_use", 1, 0, 1),
    ParamDef::new("hmac_pgno", 1, 0, 2),
    ParamDef::new("hmac_salt_mask", SQLCIPHER_HMAC_SALT_MASK, 0, 255),
    ParamDef::new("kdf_algorithm", 2, 0, 2),
    ParamDef::new("hmac_algorithm", 3, 0, 3),
    ParamDef::new("plaintext_header_size", 0, 0, PLAINTEXT_HEADER_MAX),
];

/// Descriptor for `sqlcipher`.
pub struct SqlCipherScheme;

impl CipherScheme for SqlCipherScheme {
    fn name(&self) -> &str {
        "sqlcipher"
    }

    fn params(&self) -> &[ParamDef] {
        &PARAMS
    }

    fn create(&self, params: &ParamTable) -> Result<Box<dyn PageCipher>> {
        let mut params = params.clone();
        let legacy = params.expect("legacy");
        // Compat presets; explicitly configured values stay untouched.
        match legacy {
            1 | 2 => {
                params.preset("kdf_iter", 4000);
                params.preset("kdf_algorithm", 0);
                params.preset("hmac_algorithm", 0);
            }
            3 => {
                params.preset("kdf_iter", 64000);
                params.preset("kdf_algorithm", 0);
                params.preset("hmac_algorithm", 0);
            }
            _ => {}
        }
        if legacy == 1 {
            params.preset("hmac_use", 0);
        }
        Ok(Box::new(SqlCipherCipher {
            legacy,
            legacy_page_size: params.expect("legacy_page_size"),
            kdf_iter: params.expect("kdf_iter"),
            fast_kdf_iter: params.expect("fast_kdf_iter"),
            hmac_use: params.expect("hmac_use") != 0,
            hmac_pgno: PageNoEncoding::from_param(params.expect("hmac_pgno")),
            hmac_salt_mask: params.expect("hmac_salt_mask") as u8,
            kdf_algorithm: kdf_hash(params.expect("kdf_algorithm")),
            hmac_algorithm: HmacAlgorithm::from_param(params.expect("hmac_algorithm")),
            plaintext_header_size: params.expect("plaintext_header_size"),
            key: Zeroizing::new([0u8; KEY_LEN]),
            hmac_key: Zeroizing::new([0u8; KEY_LEN]),
            salt: [0u8; SALT_LEN],
            schedule: None,
        }))
    }
}

/// Byte order of the page number fed into the HMAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageNoEncoding {
    Little,
    Big,
    Native,
}

impl PageNoEncoding {
    fn from_param(value: i64) -> Self {
        match value {
            0 => Self::Little,
            2 => Self::Native,
            _ => Self::Big,
        }
    }

    fn encode(self, page_no: u32) -> [u8; 4] {
        match self {
            Self::Little => page_no.to_le_bytes(),
            Self::Big => page_no.to_be_bytes(),
            Self::Native => page_no.to_ne_bytes(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HmacAlgorithm {
    Sha1,
    Sha256,
    Sha512,
    /// HMAC-SHA512 truncated to 256 bits; the version-4 default.
    Sha512Trunc,
}

impl HmacAlgorithm {
    fn from_param(value: i64) -> Self {
        match value {
            0 => Self::Sha1,
            1 => Self::Sha256,
            2 => Self::Sha512,
            _ => Self::Sha512Trunc,
        }
    }

    const fn mac_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 | Self::Sha512Trunc => 32,
            Self::Sha512 => 64,
        }
    }
}

fn kdf_hash(value: i64) -> PbkdfHash {
    match value {
        0 => PbkdfHash::Sha1,
        1 => PbkdfHash::Sha256,
        _ => PbkdfHash::Sha512,
    }
}

#[derive(Clone)]
struct SqlCipherCipher {
    legacy: i64,
    legacy_page_size: i64,
    kdf_iter: i64,
    fast_kdf_iter: i64,
    hmac_use: bool,
    hmac_pgno: PageNoEncoding,
    hmac_salt_mask: u8,
    kdf_algorithm: PbkdfHash,
    hmac_algorithm: HmacAlgorithm,
    plaintext_header_size: i64,
    key: Zeroizing<[u8; KEY_LEN]>,
    hmac_key: Zeroizing<[u8; KEY_LEN]>,
    salt: [u8; SALT_LEN],
    schedule: Option<AesCbc>,
}

impl SqlCipherCipher {
    fn schedule(&self) -> Result<&AesCbc> {
        self.schedule
            .as_ref()
            .ok_or_else(|| CodecError::invalid("cipher used before key derivation"))
    }

    fn page_mac(&self, body: &[u8], iv: &[u8], page_no: u32) -> Vec<u8> {
        let pgno = self.hmac_pgno.encode(page_no);
        let full = match self.hmac_algorithm {
            HmacAlgorithm::Sha1 => {
                let mut mac = Hmac::<Sha1>::new_from_slice(&self.hmac_key[..])
                    .expect("HMAC accepts any key length");
                mac.update(body);
                mac.update(iv);
                mac.update(&pgno);
                mac.finalize().into_bytes().to_vec()
            }
            HmacAlgorithm::Sha256 => {
                let mut mac = Hmac::<Sha256>::new_from_slice(&self.hmac_key[..])
                    .expect("HMAC accepts any key length");
                mac.update(body);
                mac.update(iv);
                mac.update(&pgno);
                mac.finalize().into_bytes().to_vec()
            }
            HmacAlgorithm::Sha512 | HmacAlgorithm::Sha512Trunc => {
                let mut mac = Hmac::<Sha512>::new_from_slice(&self.hmac_key[..])
                    .expect("HMAC accepts any key length");
                mac.update(body);
                mac.update(iv);
                mac.update(&pgno);
                mac.finalize().into_bytes().to_vec()
            }
        };
        let mut truncated = full;
        truncated.truncate(self.hmac_algorithm.mac_len());
        truncated
    }

    fn effective_reserved(&self, reserved: usize) -> usize {
        if reserved == 0 { 0 } else { self.reserved() }
    }
}

impl PageCipher for SqlCipherCipher {
    fn scheme_name(&self) -> &str {
        "sqlcipher"
    }

    fn legacy(&self) -> bool {
        self.legacy > 0
    }

    fn page_size(&self) -> u32 {
        if self.legacy == 0 {
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
        if self.hmac_use {
            IV_LEN + self.hmac_algorithm.mac_len()
        } else {
            IV_LEN
        }
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
                self.kdf_algorithm,
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
        if self.hmac_use {
            let mut masked = self.salt;
            for b in &mut masked {
                *b ^= self.hmac_salt_mask;
            }
            pbkdf2_hmac(
                self.kdf_algorithm,
                &self.key[..],
                &masked,
                u32::try_from(self.fast_kdf_iter).map_err(CodecError::invalid)?,
                &mut self.hmac_key[..],
            )?;
        }
        self.schedule = Some(AesCbc::new(&self.key[..])?);
        Ok(())
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
            let (iv_buf, mac_buf) = tail.split_at_mut(IV_LEN);
            rng::fill_random(iv_buf);
            let iv: &[u8; IV_LEN] = (&*iv_buf).try_into().expect("iv width");
            self.schedule()?.encrypt(iv, &mut body[layout.offset..])?;
            if page_no == 1 && !layout.plain_header {
                body[..SALT_LEN].copy_from_slice(&self.salt);
            }
            if self.hmac_use {
                let mac = self.page_mac(body, iv_buf, page_no);
                mac_buf[..mac.len()].copy_from_slice(&mac);
            }
        } else {
            // No room for an IV; fall back to the deterministic one.
            let iv = page_iv_sha1(page_no, &[]);
            self.schedule()?.encrypt(&iv, &mut data[layout.offset..n])?;
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
            let (iv_buf, mac_buf) = tail.split_at(IV_LEN);
            if self.hmac_use && check_mac {
                let expected = self.page_mac(body, iv_buf, page_no);
                let stored = &mac_buf[..expected.len()];
                if !verify_slices(stored, &expected) {
                    tracing::debug!(page_no, "sqlcipher HMAC mismatch");
                    return Err(CodecError::bad_page(page_no));
                }
            }
            let iv: &[u8; IV_LEN] = iv_buf.try_into().expect("iv width");
            self.schedule()?.decrypt(iv, &mut body[layout.offset..])?;
            if page_no == 1 && !layout.plain_header {
                body[..SALT_LEN].copy_from_slice(&SQLITE_MAGIC);
            }
        } else {
            let iv = page_iv_sha1(page_no, &[]);
            self.schedule()?.decrypt(&iv, &mut data[layout.offset..n])?;
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
