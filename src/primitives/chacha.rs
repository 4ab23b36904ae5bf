//! Raw ChaCha20 keystream access and one-shot Poly1305.
//!
//! The page format needs the stream cipher at an explicit 32-bit block
//! counter (derived from the page number) rather than from the start of
//! the stream, and it needs the counter to wrap modulo 2^32 exactly like
//! the reference implementation when a page body straddles the end of
//! the counter space.

use chacha20::ChaCha20;
use chacha20::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use poly1305::Poly1305;
use poly1305::universal_hash::{KeyInit, UniversalHash};

/// XORs the ChaCha20 keystream for `(key, nonce)` into `buf`, starting
/// at block `counter`. The block counter wraps modulo 2^32.
pub fn chacha20_xor(buf: &mut [u8], key: &[u8; 32], nonce: &[u8; 12], counter: u32) {
    if buf.is_empty() {
        return;
    }
    let mut cipher = ChaCha20::new(key.into(), nonce.into());
    // Bytes left before the 32-bit block counter would overflow.
    let until_wrap = (u64::from(u32::MAX) - u64::from(counter) + 1) * 64;
    cipher.seek(u64::from(counter) * 64);
    if buf.len() as u64 <= until_wrap {
        cipher.apply_keystream(buf);
        return;
    }
    let (head, tail) = buf.split_at_mut(usize::try_from(until_wrap).expect("bounded by page size"));
    cipher.apply_keystream(head);
    let mut wrapped = ChaCha20::new(key.into(), nonce.into());
    wrapped.apply_keystream(tail);
}

/// One-shot Poly1305 over a sequence of parts whose lengths are all
/// multiples of 16 (page bodies and nonces are).
///
/// Equivalent to the tag over the concatenation of the parts.
#[must_use]
pub fn poly1305_tag(parts: &[&[u8]], key: &[u8; 32]) -> [u8; 16] {
    let mut mac = Poly1305::new(key.into());
    for part in parts {
        debug_assert!(part.len() % 16 == 0, "poly1305 parts must be 16-aligned");
        mac.update_padded(part);
    }
    mac.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 8439 section 2.4.2: ChaCha20 encryption of the sunscreen text.
    #[test]
    fn test_chacha20_rfc8439() {
        let key: [u8; 32] = core::array::from_fn(|i| i as u8);
        let nonce: [u8; 12] = [0, 0, 0, 0, 0, 0, 0, 0x4a, 0, 0, 0, 0];
        let mut buf = *b"Ladies and Gentlemen of the class of '99: \
If I could offer you only one tip for the future, sunscreen would be it.";
        chacha20_xor(&mut buf, &key, &nonce, 1);
        assert_eq!(
            hex::encode(&buf[..32]),
            "6e2e359a2568f98041ba0728dd0d6981e97e7aec1d4360c20a27afccfd9fae0b"
        );
        assert_eq!(hex::encode(&buf[buf.len() - 8..]), "8eedf2785e42874d");
    }

    #[test]
    fn test_chacha20_roundtrip_at_high_counter() {
        let key = [7u8; 32];
        let nonce = [3u8; 12];
        let original = [0x55u8; 4096];
        let mut buf = original;
        // Counter close enough to the top that the body wraps.
        let counter = u32::MAX - 2;
        chacha20_xor(&mut buf, &key, &nonce, counter);
        assert_ne!(buf, original);
        chacha20_xor(&mut buf, &key, &nonce, counter);
        assert_eq!(buf, original);
    }

    #[test]
    fn test_chacha20_wrap_matches_split_streams() {
        let key = [9u8; 32];
        let nonce = [1u8; 12];
        let counter = u32::MAX;
        let mut joined = [0u8; 128];
        chacha20_xor(&mut joined, &key, &nonce, counter);

        // First block at the last counter value, rest from counter zero.
        let mut head = [0u8; 64];
        chacha20_xor(&mut head, &key, &nonce, u32::MAX);
        let mut tail = [0u8; 64];
        chacha20_xor(&mut tail, &key, &nonce, 0);
        assert_eq!(&joined[..64], &head);
        assert_eq!(&joined[64..], &tail);
    }

    // RFC 8439 section 2.5.2 Poly1305 test vector.
    #[test]
    fn test_poly1305_rfc8439() {
        let key: [u8; 32] =
            hex::decode("85d6be7857556d337f4452fe42d506a80103808afb0db2fd4abff6af4149f51b")
                .unwrap()
                .try_into()
                .unwrap();
        // The vector's message is not 16-aligned, so it goes through the
        // unpadded one-shot rather than the aligned helper.
        let msg = b"Cryptographic Forum Research Group";
        let tag = Poly1305::new((&key).into()).compute_unpadded(msg);
        assert_eq!(hex::encode(tag), "a8061dc1305136c6c22b8baf0c0127a9");
    }

    #[test]
    fn test_poly1305_parts_equal_concatenation() {
        let key = [0x42u8; 32];
        let a = [0x11u8; 32];
        let b = [0x22u8; 16];
        let split = poly1305_tag(&[&a, &b], &key);
        let mut joined = Vec::new();
        joined.extend_from_slice(&a);
        joined.extend_from_slice(&b);
        let whole = poly1305_tag(&[&joined], &key);
        assert_eq!(split, whole);
    }
}
