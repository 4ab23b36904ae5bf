//! Process-wide cryptographic PRNG.
//!
//! A ChaCha20 keystream in counter mode, keyed once from OS entropy.
//! Every nonce and salt the codec emits comes from here. The generator
//! notices `fork()` by watching the process id and reseeds itself so a
//! child can never replay the parent's stream; callers may also force a
//! reseed explicitly.

use std::process;
use std::sync::Mutex;

use chacha20::ChaCha20;
use chacha20::cipher::{KeyIvInit, StreamCipher};
use rand::rngs::SysRng as OsRng;
use rand::rand_core::TryRng;

/// Reseed after this many generated bytes, well before the ChaCha20
/// counter space could run out.
const RESEED_INTERVAL: u64 = 1 << 30;

struct PageRng {
    stream: ChaCha20,
    pid: u32,
    produced: u64,
}

impl PageRng {
    fn seeded() -> Self {
        let mut key = [0u8; 32];
        let mut nonce = [0u8; 12];
        // OS entropy failure leaves nothing safe to fall back on.
        OsRng
            .try_fill_bytes(&mut key)
            .expect("operating system RNG unavailable");
        OsRng
            .try_fill_bytes(&mut nonce)
            .expect("operating system RNG unavailable");
        Self {
            stream: ChaCha20::new(&key.into(), &nonce.into()),
            pid: process::id(),
            produced: 0,
        }
    }

    fn fill(&mut self, out: &mut [u8]) {
        if self.pid != process::id() || self.produced >= RESEED_INTERVAL {
            *self = Self::seeded();
        }
        out.fill(0);
        self.stream.apply_keystream(out);
        self.produced += out.len() as u64;
    }
}

static RNG: Mutex<Option<PageRng>> = Mutex::new(None);

/// Fills `out` with cryptographically secure random bytes.
pub fn fill_random(out: &mut [u8]) {
    let mut guard = RNG.lock().expect("rng mutex poisoned");
    guard.get_or_insert_with(PageRng::seeded).fill(out);
}

/// Returns an array of `N` random bytes.
#[must_use]
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut out = [0u8; N];
    fill_random(&mut out);
    out
}

/// Discards the current generator state and reseeds from OS entropy.
pub fn reseed() {
    let mut guard = RNG.lock().expect("rng mutex poisoned");
    *guard = Some(PageRng::seeded());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_changes_between_calls() {
        let a: [u8; 32] = random_bytes();
        let b: [u8; 32] = random_bytes();
        assert_ne!(a, b);
    }

    #[test]
    fn test_output_is_not_all_zero() {
        let out: [u8; 64] = random_bytes();
        assert!(out.iter().any(|&b| b != 0));
    }

    #[test]
    fn test_reseed_keeps_generating() {
        let a: [u8; 16] = random_bytes();
        reseed();
        let b: [u8; 16] = random_bytes();
        assert_ne!(a, b);
    }
}
