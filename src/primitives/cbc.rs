//! AES-CBC with ciphertext stealing.
//!
//! Length-preserving CBC (CS3 variant) over 128/192/256-bit keys. Page
//! bodies are normally multiples of the block size, so the stealing path
//! only runs for odd trailing lengths; it exists so the transform never
//! needs padding. Key schedules are expanded once when the cipher
//! instance derives its key.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128Dec, Aes128Enc, Aes192Dec, Aes192Enc, Aes256Dec, Aes256Enc};

use crate::error::{CodecError, Result};

type Block = GenericArray<u8, aes::cipher::consts::U16>;

const BLOCK: usize = 16;

/// Expanded AES encrypt/decrypt schedules for one key.
#[derive(Clone)]
pub enum AesCbc {
    Aes128(Box<(Aes128Enc, Aes128Dec)>),
    Aes192(Box<(Aes192Enc, Aes192Dec)>),
    Aes256(Box<(Aes256Enc, Aes256Dec)>),
}

impl AesCbc {
    /// Expands the schedules for a 16, 24 or 32-byte key.
    pub fn new(key: &[u8]) -> Result<Self> {
        match key.len() {
            16 => Ok(Self::Aes128(Box::new((
                Aes128Enc::new_from_slice(key).map_err(CodecError::invalid)?,
                Aes128Dec::new_from_slice(key).map_err(CodecError::invalid)?,
            )))),
            24 => Ok(Self::Aes192(Box::new((
                Aes192Enc::new_from_slice(key).map_err(CodecError::invalid)?,
                Aes192Dec::new_from_slice(key).map_err(CodecError::invalid)?,
            )))),
            32 => Ok(Self::Aes256(Box::new((
                Aes256Enc::new_from_slice(key).map_err(CodecError::invalid)?,
                Aes256Dec::new_from_slice(key).map_err(CodecError::invalid)?,
            )))),
            n => Err(CodecError::invalid(format!("invalid AES key length {n}"))),
        }
    }

    fn encrypt_block(&self, block: &mut Block) {
        match self {
            Self::Aes128(k) => k.0.encrypt_block(block),
            Self::Aes192(k) => k.0.encrypt_block(block),
            Self::Aes256(k) => k.0.encrypt_block(block),
        }
    }

    fn decrypt_block(&self, block: &mut Block) {
        match self {
            Self::Aes128(k) => k.1.decrypt_block(block),
            Self::Aes192(k) => k.1.decrypt_block(block),
            Self::Aes256(k) => k.1.decrypt_block(block),
        }
    }

    /// CBC-CTS encryption in place. `buf` must be at least one block.
    pub fn encrypt(&self, iv: &[u8; BLOCK], buf: &mut [u8]) -> Result<()> {
        if buf.len() < BLOCK {
            return Err(CodecError::invalid("CBC input shorter than one block"));
        }
        let full = buf.len() / BLOCK;
        let tail = buf.len() % BLOCK;

        let mut chain = Block::clone_from_slice(iv);
        for chunk in buf.chunks_exact_mut(BLOCK) {
            for (b, c) in chunk.iter_mut().zip(chain.iter()) {
                *b ^= c;
            }
            let block = Block::from_mut_slice(chunk);
            self.encrypt_block(block);
            chain.copy_from_slice(chunk);
        }

        if tail > 0 {
            // Steal from the last full ciphertext block: it moves, truncated,
            // to the end, and its position is taken by the encryption of the
            // zero-padded final partial block.
            let last_full = (full - 1) * BLOCK;
            let stolen = chain;
            let mut final_block = Block::default();
            final_block[..tail].copy_from_slice(&buf[full * BLOCK..]);
            for (b, c) in final_block.iter_mut().zip(stolen.iter()) {
                *b ^= c;
            }
            self.encrypt_block(&mut final_block);
            buf[last_full..full * BLOCK].copy_from_slice(&final_block);
            buf[full * BLOCK..].copy_from_slice(&stolen[..tail]);
        }
        Ok(())
    }

    /// CBC-CTS decryption in place; the inverse of [`Self::encrypt`].
    pub fn decrypt(&self, iv: &[u8; BLOCK], buf: &mut [u8]) -> Result<()> {
        if buf.len() < BLOCK {
            return Err(CodecError::invalid("CBC input shorter than one block"));
        }
        let full = buf.len() / BLOCK;
        let tail = buf.len() % BLOCK;
        let plain_blocks = if tail > 0 { full - 1 } else { full };

        let mut chain = Block::clone_from_slice(iv);
        for chunk in buf[..plain_blocks * BLOCK].chunks_exact_mut(BLOCK) {
            let saved = Block::clone_from_slice(chunk);
            let block = Block::from_mut_slice(chunk);
            self.decrypt_block(block);
            for (b, c) in chunk.iter_mut().zip(chain.iter()) {
                *b ^= c;
            }
            chain = saved;
        }

        if tail > 0 {
            let last_full = (full - 1) * BLOCK;
            let mut swapped = Block::clone_from_slice(&buf[last_full..full * BLOCK]);
            self.decrypt_block(&mut swapped);

            // Reassemble the stolen ciphertext block from the tail plus the
            // zero-padded region of the decrypted swap block.
            let mut stolen = Block::default();
            stolen[..tail].copy_from_slice(&buf[full * BLOCK..]);
            stolen[tail..].copy_from_slice(&swapped[tail..]);

            let mut final_plain = [0u8; BLOCK];
            for i in 0..tail {
                final_plain[i] = swapped[i] ^ stolen[i];
            }

            let mut prev_plain = stolen;
            self.decrypt_block(&mut prev_plain);
            for (b, c) in prev_plain.iter_mut().zip(chain.iter()) {
                *b ^= c;
            }

            buf[last_full..full * BLOCK].copy_from_slice(&prev_plain);
            buf[full * BLOCK..].copy_from_slice(&final_plain[..tail]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // NIST SP 800-38A F.2.1, first block of CBC-AES128.
    #[test]
    fn test_cbc_aes128_nist_vector() {
        let key = hex::decode("2b7e151628aed2a6abf7158809cf4f3c").unwrap();
        let iv: [u8; 16] = hex::decode("000102030405060708090a0b0c0d0e0f")
            .unwrap()
            .try_into()
            .unwrap();
        let mut buf = hex::decode("6bc1bee22e409f96e93d7e117393172a").unwrap();
        let cbc = AesCbc::new(&key).unwrap();
        cbc.encrypt(&iv, &mut buf).unwrap();
        assert_eq!(hex::encode(&buf), "7649abac8119b246cee98e9b12e9197d");
        cbc.decrypt(&iv, &mut buf).unwrap();
        assert_eq!(hex::encode(&buf), "6bc1bee22e409f96e93d7e117393172a");
    }

    #[test]
    fn test_roundtrip_aligned() {
        for key_len in [16usize, 24, 32] {
            let key = vec![0x5au8; key_len];
            let cbc = AesCbc::new(&key).unwrap();
            let iv = [0x17u8; 16];
            let original: Vec<u8> = (0..4096).map(|i| (i % 251) as u8).collect();
            let mut buf = original.clone();
            cbc.encrypt(&iv, &mut buf).unwrap();
            assert_ne!(buf, original);
            cbc.decrypt(&iv, &mut buf).unwrap();
            assert_eq!(buf, original);
        }
    }

    #[test]
    fn test_roundtrip_with_stealing() {
        let cbc = AesCbc::new(&[0x33u8; 32]).unwrap();
        let iv = [0x01u8; 16];
        for len in [17usize, 31, 33, 100, 479] {
            let original: Vec<u8> = (0..len).map(|i| (i * 7 % 256) as u8).collect();
            let mut buf = original.clone();
            cbc.encrypt(&iv, &mut buf).unwrap();
            assert_eq!(buf.len(), len);
            assert_ne!(buf, original);
            cbc.decrypt(&iv, &mut buf).unwrap();
            assert_eq!(buf, original);
        }
    }

    #[test]
    fn test_short_input_rejected() {
        let cbc = AesCbc::new(&[0u8; 16]).unwrap();
        let iv = [0u8; 16];
        let mut buf = [0u8; 15];
        assert!(cbc.encrypt(&iv, &mut buf).is_err());
        assert!(cbc.decrypt(&iv, &mut buf).is_err());
    }

    #[test]
    fn test_bad_key_length() {
        assert!(AesCbc::new(&[0u8; 20]).is_err());
    }
}
