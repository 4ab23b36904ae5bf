//! Deterministic per-page IVs for the legacy cipher modes.
//!
//! Legacy CBC and RC4 files carry no per-page nonce on disk; their IV is
//! a public function of the page number and key material. These hashes
//! run over public or already-derived inputs only.

use md5::{Digest, Md5};
use sha1::Sha1;

/// First 16 bytes of SHA-1 over `LE32(page_no) || key`.
#[must_use]
pub fn page_iv_sha1(page_no: u32, key: &[u8]) -> [u8; 16] {
    let mut hasher = Sha1::new();
    hasher.update(page_no.to_le_bytes());
    hasher.update(key);
    let digest = hasher.finalize();
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&digest[..16]);
    iv
}

/// MD5 over `LE32(page_no) || key`; the RC4 per-page key.
#[must_use]
pub fn page_iv_md5(page_no: u32, key: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(page_no.to_le_bytes());
    hasher.update(key);
    hasher.finalize().into()
}
