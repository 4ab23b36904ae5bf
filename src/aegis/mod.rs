//! The AEGIS authenticated-cipher family.
//!
//! Six variants behind one one-shot API: detached encrypt/decrypt with a
//! 16 or 32-byte tag, unauthenticated encrypt/decrypt, and a raw
//! keystream generator. Implementations are selected per variant at
//! first use by the CPU-feature dispatcher; the portable backend is
//! always present and all backends produce identical bytes.

mod block;
mod cpu;
mod soft;
mod state128l;
mod state256;

#[cfg(target_arch = "x86_64")]
mod aesni;
#[cfg(target_arch = "x86_64")]
mod avx2;
#[cfg(target_arch = "x86_64")]
mod avx512;

#[cfg(target_arch = "aarch64")]
mod armcrypto;

use strum::{Display, EnumString};

use crate::error::{CodecError, Result};

use cpu::{Backend, dispatch};

/// The AEGIS variant used for page encryption; indices match the
/// `algorithm` configuration parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum AegisVariant {
    #[strum(serialize = "aegis-128l")]
    Aegis128L,
    #[strum(serialize = "aegis-128x2")]
    Aegis128X2,
    #[strum(serialize = "aegis-128x4")]
    Aegis128X4,
    #[strum(serialize = "aegis-256")]
    Aegis256,
    #[strum(serialize = "aegis-256x2")]
    Aegis256X2,
    #[strum(serialize = "aegis-256x4")]
    Aegis256X4,
}

impl AegisVariant {
    pub const ALL: [Self; 6] = [
        Self::Aegis128L,
        Self::Aegis128X2,
        Self::Aegis128X4,
        Self::Aegis256,
        Self::Aegis256X2,
        Self::Aegis256X4,
    ];

    /// Maps the 1-based `algorithm` parameter value.
    #[must_use]
    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            1 => Some(Self::Aegis128L),
            2 => Some(Self::Aegis128X2),
            3 => Some(Self::Aegis128X4),
            4 => Some(Self::Aegis256),
            5 => Some(Self::Aegis256X2),
            6 => Some(Self::Aegis256X4),
            _ => None,
        }
    }

    /// The 1-based `algorithm` parameter value.
    #[must_use]
    pub const fn index(self) -> i64 {
        self as i64 + 1
    }

    /// Master key length in bytes.
    #[must_use]
    pub const fn key_len(self) -> usize {
        match self {
            Self::Aegis128L | Self::Aegis128X2 | Self::Aegis128X4 => 16,
            Self::Aegis256 | Self::Aegis256X2 | Self::Aegis256X4 => 32,
        }
    }

    /// Nonce length in bytes.
    #[must_use]
    pub const fn nonce_len(self) -> usize {
        self.key_len()
    }

    fn backend(self) -> &'static Backend {
        &dispatch().tables[self as usize]
    }

    /// Name of the implementation the dispatcher selected.
    #[must_use]
    pub fn backend_name(self) -> &'static str {
        self.backend().name
    }
}

fn check_inputs(variant: AegisVariant, maclen: Option<usize>, nonce: &[u8], key: &[u8]) -> Result<()> {
    if let Some(maclen) = maclen {
        if maclen != 16 && maclen != 32 {
            return Err(CodecError::invalid(format!(
                "unsupported AEGIS MAC length {maclen}"
            )));
        }
    }
    if nonce.len() != variant.nonce_len() {
        return Err(CodecError::invalid(format!(
            "{variant} requires a {}-byte nonce",
            variant.nonce_len()
        )));
    }
    if key.len() != variant.key_len() {
        return Err(CodecError::invalid(format!(
            "{variant} requires a {}-byte key",
            variant.key_len()
        )));
    }
    Ok(())
}

/// Encrypts `buf` in place and writes the detached tag into `mac`
/// (16 or 32 bytes).
pub fn encrypt_detached(
    variant: AegisVariant,
    buf: &mut [u8],
    mac: &mut [u8],
    ad: &[u8],
    nonce: &[u8],
    key: &[u8],
) -> Result<()> {
    check_inputs(variant, Some(mac.len()), nonce, key)?;
    (variant.backend().encrypt_detached)(buf, mac, ad, nonce, key);
    Ok(())
}

/// Decrypts `buf` in place and verifies the detached tag; on mismatch
/// the buffer is zeroed and `Ok(false)` is returned.
pub fn decrypt_detached(
    variant: AegisVariant,
    buf: &mut [u8],
    mac: &[u8],
    ad: &[u8],
    nonce: &[u8],
    key: &[u8],
) -> Result<bool> {
    check_inputs(variant, Some(mac.len()), nonce, key)?;
    Ok((variant.backend().decrypt_detached)(buf, mac, ad, nonce, key))
}

/// Encrypts `buf` in place without authentication.
pub fn encrypt_unauthenticated(
    variant: AegisVariant,
    buf: &mut [u8],
    nonce: &[u8],
    key: &[u8],
) -> Result<()> {
    check_inputs(variant, None, nonce, key)?;
    (variant.backend().encrypt)(buf, nonce, key);
    Ok(())
}

/// Decrypts `buf` in place without authentication.
pub fn decrypt_unauthenticated(
    variant: AegisVariant,
    buf: &mut [u8],
    nonce: &[u8],
    key: &[u8],
) -> Result<()> {
    check_inputs(variant, None, nonce, key)?;
    (variant.backend().decrypt)(buf, nonce, key);
    Ok(())
}

/// Fills `out` with the variant's keystream for `(key, nonce)`.
pub fn stream(variant: AegisVariant, out: &mut [u8], nonce: &[u8], key: &[u8]) -> Result<()> {
    check_inputs(variant, None, nonce, key)?;
    (variant.backend().stream)(out, nonce, key);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill_pattern(buf: &mut [u8], seed: u8) {
        for (i, b) in buf.iter_mut().enumerate() {
            *b = seed.wrapping_add((i % 251) as u8).wrapping_mul(31);
        }
    }

    #[test]
    fn test_maclen_validation() {
        let variant = AegisVariant::Aegis256;
        let key = [0u8; 32];
        let nonce = [0u8; 32];
        let mut buf = [0u8; 32];
        let mut mac24 = [0u8; 24];
        let err = encrypt_detached(variant, &mut buf, &mut mac24, b"", &nonce, &key);
        assert!(matches!(err, Err(CodecError::InvalidArgument(_))));
    }

    #[test]
    fn test_key_and_nonce_length_validation() {
        let mut buf = [0u8; 16];
        let mut mac = [0u8; 16];
        let err = encrypt_detached(
            AegisVariant::Aegis128L,
            &mut buf,
            &mut mac,
            b"",
            &[0u8; 32],
            &[0u8; 16],
        );
        assert!(err.is_err());
        let err = encrypt_detached(
            AegisVariant::Aegis256,
            &mut buf,
            &mut mac,
            b"",
            &[0u8; 32],
            &[0u8; 16],
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_variant_index_mapping() {
        for variant in AegisVariant::ALL {
            assert_eq!(AegisVariant::from_index(variant.index()), Some(variant));
        }
        assert_eq!(AegisVariant::from_index(0), None);
        assert_eq!(AegisVariant::from_index(7), None);
    }

    #[test]
    fn test_variant_names() {
        assert_eq!(AegisVariant::Aegis128L.to_string(), "aegis-128l");
        assert_eq!(AegisVariant::Aegis256X4.to_string(), "aegis-256x4");
        assert_eq!(
            "aegis-256".parse::<AegisVariant>().unwrap(),
            AegisVariant::Aegis256
        );
    }

    // Every backend the dispatcher picked must agree byte-for-byte with
    // the portable implementation.
    #[test]
    fn test_backends_match_soft() {
        let soft = cpu::soft_dispatch();
        for variant in AegisVariant::ALL {
            let klen = variant.key_len();
            let nlen = variant.nonce_len();
            for trial in 0u8..100 {
                let mut key = vec![0u8; klen];
                fill_pattern(&mut key, trial);
                let mut nonce = vec![0u8; nlen];
                fill_pattern(&mut nonce, trial.wrapping_add(97));
                let len = 1 + usize::from(trial) * 7 % 700;
                let mut msg = vec![0u8; len];
                fill_pattern(&mut msg, trial.wrapping_add(193));

                let mut hw = msg.clone();
                let mut hw_mac = [0u8; 32];
                encrypt_detached(variant, &mut hw, &mut hw_mac, b"ad", &nonce, &key).unwrap();

                let mut sw = msg.clone();
                let mut sw_mac = [0u8; 32];
                (soft.tables[variant as usize].encrypt_detached)(
                    &mut sw, &mut sw_mac, b"ad", &nonce, &key,
                );
                assert_eq!(hw, sw, "{variant} ciphertext diverged at trial {trial}");
                assert_eq!(hw_mac, sw_mac, "{variant} tag diverged at trial {trial}");

                let mut stream_hw = vec![0u8; len];
                stream(variant, &mut stream_hw, &nonce, &key).unwrap();
                let mut stream_sw = vec![0xaau8; len];
                (soft.tables[variant as usize].stream)(&mut stream_sw, &nonce, &key);
                assert_eq!(stream_hw, stream_sw);
            }
        }
    }

    #[test]
    fn test_roundtrip_all_variants() {
        for variant in AegisVariant::ALL {
            let key = vec![0x11u8; variant.key_len()];
            let nonce = vec![0x22u8; variant.nonce_len()];
            let original: Vec<u8> = (0..1024).map(|i| (i % 256) as u8).collect();

            let mut buf = original.clone();
            let mut mac = [0u8; 32];
            encrypt_detached(variant, &mut buf, &mut mac, b"", &nonce, &key).unwrap();
            assert!(decrypt_detached(variant, &mut buf, &mac, b"", &nonce, &key).unwrap());
            assert_eq!(buf, original);

            let mut buf = original.clone();
            encrypt_unauthenticated(variant, &mut buf, &nonce, &key).unwrap();
            assert_ne!(buf, original);
            decrypt_unauthenticated(variant, &mut buf, &nonce, &key).unwrap();
            assert_eq!(buf, original);
        }
    }
}
