//! The `aegis` scheme: AEGIS AEAD pages with Argon2id key derivation.
//!
//! The `algorithm` parameter picks one of the six AEGIS variants; key
//! and nonce widths follow it. Each page gets a fresh nonce, expanded by
//! the variant's keystream into a one-time AEAD key and nonce whose last
//! four bytes are replaced by the big-endian page number, so per-page
//! uniqueness holds even under a repeated nonce. On disk the tail is
//! `tag(32) || nonce(16 or 32)`.

use zeroize::Zeroizing;

use crate::aegis::AegisVariant;
use crate::config::{AEGIS_MCOST, AEGIS_PCOST, AEGIS_TCOST, SALT_LEN, SQLITE_MAGIC};
use crate::error::{CodecError, Result, check_page_no};
use crate::params::{ParamDef, ParamTable};
use crate::primitives::kdf::argon2id;
use crate::primitives::rng;

use super::{CipherScheme, KeySource, PageCipher, extract_raw_key, page1_layout, resolve_salt};

const TAG_LEN: usize = 32;
const MAX_KEY_LEN: usize = 32;
const MAX_NONCE_LEN: usize = 32;

const PARAMS: [ParamDef; 4] = [
    ParamDef::new("tcost", AEGIS_TCOST, 1, i32::MAX as i64),
    ParamDef::new("mcost", AEGIS_MCOST, 1, i32::MAX as i64),
    ParamDef::new("pcost", AEGIS_PCOST, 1, i32::MAX as i64),
    ParamDef::new("algorithm", 4, 1, 6),
];

/// Descriptor for `aegis`.
pub struct AegisScheme;

impl CipherScheme for AegisScheme {
    fn name(&self) -> &str {
        "aegis"
    }

    fn params(&self) -> &[ParamDef] {
        &PARAMS
    }

    fn create(&self, params: &ParamTable) -> Result<Box<dyn PageCipher>> {
        let algorithm = params.expect("algorithm");
        let variant = AegisVariant::from_index(algorithm)
            .ok_or_else(|| CodecError::invalid(format!("unknown AEGIS algorithm {algorithm}")))?;
        Ok(Box::new(AegisCipher {
            variant,
            tcost: params.expect("tcost"),
            mcost: params.expect("mcost"),
            pcost: params.expect("pcost"),
            key: Zeroizing::new([0u8; MAX_KEY_LEN]),
            salt: [0u8; SALT_LEN],
        }))
    }
}

#[derive(Clone)]
struct AegisCipher {
    variant: AegisVariant,
    tcost: i64,
    mcost: i64,
    pcost: i64,
    // Sized for the largest variant; the active prefix is key_len().
    key: Zeroizing<[u8; MAX_KEY_LEN]>,
    salt: [u8; SALT_LEN],
}

impl AegisCipher {
    fn key(&self) -> &[u8] {
        &self.key[..self.variant.key_len()]
    }

    /// Deterministic nonce for pages written without reserved space.
    fn fallback_nonce(&self) -> Result<Zeroizing<[u8; MAX_NONCE_LEN]>> {
        let mut nonce = Zeroizing::new([0u8; MAX_NONCE_LEN]);
        let zero = [0u8; MAX_NONCE_LEN];
        crate::aegis::stream(
            self.variant,
            &mut nonce[..self.variant.nonce_len()],
            &zero[..self.variant.nonce_len()],
            self.key(),
        )?;
        Ok(nonce)
    }

    /// One-time AEAD key and nonce: keystream over the page nonce, with
    /// the big-endian page number stamped over the final four bytes.
    fn one_time_keys(&self, nonce: &[u8], page_no: u32) -> Result<Zeroizing<Vec<u8>>> {
        let len = self.variant.key_len() + self.variant.nonce_len();
        let mut otk = Zeroizing::new(vec![0u8; len]);
        crate::aegis::stream(self.variant, &mut otk, nonce, self.key())?;
        otk[len - 4..].copy_from_slice(&page_no.to_be_bytes());
        Ok(otk)
    }

    fn effective_reserved(&self, reserved: usize) -> usize {
        if reserved == 0 { 0 } else { self.reserved() }
    }
}

impl PageCipher for AegisCipher {
    fn scheme_name(&self) -> &str {
        "aegis"
    }

    fn reserved(&self) -> usize {
        TAG_LEN + self.variant.nonce_len()
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
        let key_len = self.variant.key_len();
        match extract_raw_key(passphrase, key_len)? {
            KeySource::Passphrase => argon2id(
                passphrase,
                &self.salt,
                u32::try_from(self.tcost).map_err(CodecError::invalid)?,
                u32::try_from(self.mcost).map_err(CodecError::invalid)?,
                u32::try_from(self.pcost).map_err(CodecError::invalid)?,
                &mut self.key[..key_len],
            ),
            KeySource::Raw { key, salt } => {
                self.key[..key_len].copy_from_slice(&key);
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
        let layout = page1_layout(page_no, false, 0);
        let key_len = self.variant.key_len();

        if n_reserved > 0 {
            let (body, tail) = data.split_at_mut(n);
            let (tag_buf, nonce_buf) = tail.split_at_mut(TAG_LEN);
            rng::fill_random(nonce_buf);
            let otk = self.one_time_keys(nonce_buf, page_no)?;
            crate::aegis::encrypt_detached(
                self.variant,
                &mut body[layout.offset..],
                tag_buf,
                b"",
                &otk[key_len..],
                &otk[..key_len],
            )?;
            if page_no == 1 {
                body[..SALT_LEN].copy_from_slice(&self.salt);
            }
        } else {
            let nonce = self.fallback_nonce()?;
            let otk = self.one_time_keys(&nonce[..self.variant.nonce_len()], page_no)?;
            crate::aegis::encrypt_unauthenticated(
                self.variant,
                &mut data[layout.offset..n],
                &otk[key_len..],
                &otk[..key_len],
            )?;
            if page_no == 1 {
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
        let layout = page1_layout(page_no, false, 0);
        let key_len = self.variant.key_len();

        if n_reserved > 0 {
            let (body, tail) = data.split_at_mut(n);
            let (tag_buf, nonce_buf) = tail.split_at(TAG_LEN);
            let otk = self.one_time_keys(nonce_buf, page_no)?;
            if check_mac {
                let ok = crate::aegis::decrypt_detached(
                    self.variant,
                    &mut body[layout.offset..],
                    tag_buf,
                    b"",
                    &otk[key_len..],
                    &otk[..key_len],
                )?;
                if !ok {
                    tracing::debug!(page_no, "aegis tag mismatch");
                    return Err(CodecError::bad_page(page_no));
                }
            } else {
                crate::aegis::decrypt_unauthenticated(
                    self.variant,
                    &mut body[layout.offset..],
                    &otk[key_len..],
                    &otk[..key_len],
                )?;
            }
            if page_no == 1 {
                body[..SALT_LEN].copy_from_slice(&SQLITE_MAGIC);
            }
        } else {
            let nonce = self.fallback_nonce()?;
            let otk = self.one_time_keys(&nonce[..self.variant.nonce_len()], page_no)?;
            crate::aegis::decrypt_unauthenticated(
                self.variant,
                &mut data[layout.offset..n],
                &otk[key_len..],
                &otk[..key_len],
            )?;
            if page_no == 1 {
                data[..SALT_LEN].copy_from_slice(&SQLITE_MAGIC);
            }
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn PageCipher> {
        Box::new(self.clone())
    }
}
