//! Portable AEGIS backend.
//!
//! Lanes are plain 16-byte blocks and the AES round comes from the `aes`
//! crate's hazmat API. Always compiled; every hardware backend must
//! produce byte-identical output to this one.

use aes::Block;
use aes::hazmat::cipher_round;

use super::block::AesBlock;

/// `D` software AES lanes.
#[derive(Clone, Copy)]
pub(crate) struct SoftBlock<const D: usize>([Block; D]);

impl<const D: usize> AesBlock for SoftBlock<D> {
    const DEGREE: usize = D;
    const WIDTH: usize = 16 * D;

    #[inline(always)]
    fn zero() -> Self {
        Self([Block::default(); D])
    }

    #[inline(always)]
    fn load(bytes: &[u8]) -> Self {
        debug_assert_eq!(bytes.len(), Self::WIDTH);
        let mut lanes = [Block::default(); D];
        for (d, lane) in lanes.iter_mut().enumerate() {
            lane.copy_from_slice(&bytes[d * 16..d * 16 + 16]);
        }
        Self(lanes)
    }

    #[inline(always)]
    fn store(self, out: &mut [u8]) {
        debug_assert_eq!(out.len(), Self::WIDTH);
        for (d, lane) in self.0.iter().enumerate() {
            out[d * 16..d * 16 + 16].copy_from_slice(lane);
        }
    }

    #[inline(always)]
    fn xor(self, other: Self) -> Self {
        let mut lanes = self.0;
        for (lane, rhs) in lanes.iter_mut().zip(other.0.iter()) {
            for (b, r) in lane.iter_mut().zip(rhs.iter()) {
                *b ^= r;
            }
        }
        Self(lanes)
    }

    #[inline(always)]
    fn and(self, other: Self) -> Self {
        let mut lanes = self.0;
        for (lane, rhs) in lanes.iter_mut().zip(other.0.iter()) {
            for (b, r) in lane.iter_mut().zip(rhs.iter()) {
                *b &= r;
            }
        }
        Self(lanes)
    }

    #[inline(always)]
    fn round(self, round_key: Self) -> Self {
        let mut lanes = self.0;
        for (lane, rk) in lanes.iter_mut().zip(round_key.0.iter()) {
            cipher_round(lane, rk);
        }
        Self(lanes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_store_roundtrip() {
        let bytes: [u8; 32] = core::array::from_fn(|i| i as u8);
        let mut out = [0u8; 32];
        SoftBlock::<2>::load(&bytes).store(&mut out);
        assert_eq!(bytes, out);
    }

    #[test]
    fn test_xor_and() {
        let a = SoftBlock::<1>::load(&[0xf0u8; 16]);
        let b = SoftBlock::<1>::load(&[0x0fu8; 16]);
        let mut out = [0u8; 16];
        a.xor(b).store(&mut out);
        assert_eq!(out, [0xffu8; 16]);
        a.and(b).store(&mut out);
        assert_eq!(out, [0x00u8; 16]);
    }

    #[test]
    fn test_context_constants() {
        let mut out = [0u8; 64];
        SoftBlock::<4>::context().store(&mut out);
        for d in 0..4 {
            assert_eq!(out[d * 16], d as u8);
            assert_eq!(out[d * 16 + 1], 3);
        }
        let mut single = [0u8; 16];
        SoftBlock::<1>::context().store(&mut single);
        assert_eq!(single, [0u8; 16]);
    }

    #[test]
    fn test_fold_xors_lanes() {
        let mut bytes = [0u8; 32];
        bytes[..16].fill(0xaa);
        bytes[16..].fill(0x55);
        let folded = SoftBlock::<2>::load(&bytes).fold();
        assert_eq!(folded, [0xffu8; 16]);
    }
}
