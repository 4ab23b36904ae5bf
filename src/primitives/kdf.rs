//! Passphrase key derivation.
//!
//! PBKDF2 over the three SHA families plus the Ascon-based variant, and
//! Argon2id for the AEGIS scheme. Iteration counts are validated here so
//! the schemes can trust their configured values.

use argon2::{Algorithm, Argon2, Params, Version};
use ascon_hash::AsconHash;
use hmac::{Hmac, SimpleHmac};
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use crate::error::{CodecError, Result};

/// Hash family used by the PBKDF2-based schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PbkdfHash {
    Sha1,
    Sha256,
    Sha512,
}

/// RFC 8018 PBKDF2-HMAC with the selected hash.
///
/// The underlying crate precomputes the inner/outer paddings once, which
/// is the optimisation the original called "fastpbkdf2"; output is
/// identical by construction.
pub fn pbkdf2_hmac(
    hash: PbkdfHash,
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    out: &mut [u8],
) -> Result<()> {
    if iterations == 0 {
        return Err(CodecError::invalid("kdf iteration count must be positive"));
    }
    let rc = match hash {
        PbkdfHash::Sha1 => pbkdf2::pbkdf2::<Hmac<Sha1>>(password, salt, iterations, out),
        PbkdfHash::Sha256 => pbkdf2::pbkdf2::<Hmac<Sha256>>(password, salt, iterations, out),
        PbkdfHash::Sha512 => pbkdf2::pbkdf2::<Hmac<Sha512>>(password, salt, iterations, out),
    };
    rc.map_err(CodecError::invalid)
}

/// PBKDF2 with HMAC-Ascon as the PRF, for the `ascon128` scheme.
pub fn pbkdf2_ascon(password: &[u8], salt: &[u8], iterations: u32, out: &mut [u8]) -> Result<()> {
    if iterations == 0 {
        return Err(CodecError::invalid("kdf iteration count must be positive"));
    }
    pbkdf2::pbkdf2::<SimpleHmac<AsconHash>>(password, salt, iterations, out)
        .map_err(CodecError::invalid)
}

/// Argon2id (v1.3) with explicit time/memory/lane costs.
pub fn argon2id(
    password: &[u8],
    salt: &[u8],
    t_cost: u32,
    m_cost: u32,
    p_cost: u32,
    out: &mut [u8],
) -> Result<()> {
    let params = Params::new(m_cost, t_cost, p_cost, Some(out.len()))
        .map_err(|e| CodecError::invalid(format!("invalid argon2 parameter: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    argon2
        .hash_password_into(password, salt, out)
        .map_err(|e| CodecError::invalid(format!("key derivation failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 6070 test vectors for PBKDF2-HMAC-SHA1.
    #[test]
    fn test_pbkdf2_sha1_rfc6070() {
        let mut out = [0u8; 20];
        pbkdf2_hmac(PbkdfHash::Sha1, b"password", b"salt", 1, &mut out).unwrap();
        assert_eq!(
            hex::encode(out),
            "0c60c80f961f0e71f3a9b524af6012062fe037a6"
        );

        pbkdf2_hmac(PbkdfHash::Sha1, b"password", b"salt", 2, &mut out).unwrap();
        assert_eq!(
            hex::encode(out),
            "ea6c014dc72d6f8ccd1ed92ace1d41f0d8de8957"
        );

        pbkdf2_hmac(PbkdfHash::Sha1, b"password", b"salt", 4096, &mut out).unwrap();
        assert_eq!(
            hex::encode(out),
            "4b007901b765489abead49d926f721d065a429c1"
        );
    }

    #[test]
    fn test_pbkdf2_sha256_known_answer() {
        let mut out = [0u8; 32];
        pbkdf2_hmac(PbkdfHash::Sha256, b"password", b"salt", 1, &mut out).unwrap();
        assert_eq!(
            hex::encode(out),
            "120fb6cffcf8b32c43e7225256c4f837a86548c92ccc35480805987cb70be17b"
        );
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let mut out = [0u8; 16];
        assert!(pbkdf2_hmac(PbkdfHash::Sha1, b"p", b"s", 0, &mut out).is_err());
        assert!(pbkdf2_ascon(b"p", b"s", 0, &mut out).is_err());
    }

    #[test]
    fn test_pbkdf2_ascon_is_deterministic() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        pbkdf2_ascon(b"secret", b"0123456789abcdef", 100, &mut a).unwrap();
        pbkdf2_ascon(b"secret", b"0123456789abcdef", 100, &mut b).unwrap();
        assert_eq!(a, b);
        pbkdf2_ascon(b"secrets", b"0123456789abcdef", 100, &mut b).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_argon2id_roundtrip() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        argon2id(b"secret", b"0123456789abcdef", 2, 19 * 1024, 1, &mut a).unwrap();
        argon2id(b"secret", b"0123456789abcdef", 2, 19 * 1024, 1, &mut b).unwrap();
        assert_eq!(a, b);
        argon2id(b"Secret", b"0123456789abcdef", 2, 19 * 1024, 1, &mut b).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_argon2id_bad_params() {
        let mut out = [0u8; 32];
        // Memory cost below the algorithm's minimum.
        assert!(argon2id(b"p", b"0123456789abcdef", 1, 1, 1, &mut out).is_err());
    }
}
