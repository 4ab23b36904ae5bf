//! aarch64 AEGIS backend using the ARM crypto extensions.
//!
//! ARM's AESE instruction XORs the round key before SubBytes, so the
//! x86-style round (SubBytes, ShiftRows, MixColumns, then XOR) is built
//! from AESE with a zero key, AESMC, and a final EOR. Only reachable
//! through the dispatcher after the `aes` feature check.

#![allow(unsafe_code)]

use core::arch::aarch64::{
    uint8x16_t, vaeseq_u8, vaesmcq_u8, vandq_u8, vdupq_n_u8, veorq_u8, vld1q_u8, vst1q_u8,
};

use super::block::AesBlock;

/// `D` NEON AES lanes.
#[derive(Clone, Copy)]
pub(crate) struct NeonBlock<const D: usize>([uint8x16_t; D]);

impl<const D: usize> AesBlock for NeonBlock<D> {
    const DEGREE: usize = D;
    const WIDTH: usize = 16 * D;

    #[inline(always)]
    fn zero() -> Self {
        Self([unsafe { vdupq_n_u8(0) }; D])
    }

    #[inline(always)]
    fn load(bytes: &[u8]) -> Self {
        debug_assert_eq!(bytes.len(), Self::WIDTH);
        let mut lanes = [unsafe { vdupq_n_u8(0) }; D];
        for (d, lane) in lanes.iter_mut().enumerate() {
            *lane = unsafe { vld1q_u8(bytes.as_ptr().add(d * 16)) };
        }
        Self(lanes)
    }

    #[inline(always)]
    fn store(self, out: &mut [u8]) {
        debug_assert_eq!(out.len(), Self::WIDTH);
        for (d, lane) in self.0.iter().enumerate() {
            unsafe { vst1q_u8(out.as_mut_ptr().add(d * 16), *lane) };
        }
    }

    #[inline(always)]
    fn xor(self, other: Self) -> Self {
        let mut lanes = self.0;
        for (lane, rhs) in lanes.iter_mut().zip(other.0.iter()) {
            *lane = unsafe { veorq_u8(*lane, *rhs) };
        }
        Self(lanes)
    }

    #[inline(always)]
    fn and(self, other: Self) -> Self {
        let mut lanes = self.0;
        for (lane, rhs) in lanes.iter_mut().zip(other.0.iter()) {
            *lane = unsafe { vandq_u8(*lane, *rhs) };
        }
        Self(lanes)
    }

    #[inline(always)]
    fn round(self, round_key: Self) -> Self {
        let mut lanes = self.0;
        for (lane, rk) in lanes.iter_mut().zip(round_key.0.iter()) {
            *lane = unsafe {
                let zero = vdupq_n_u8(0);
                veorq_u8(vaesmcq_u8(vaeseq_u8(*lane, zero)), *rk)
            };
        }
        Self(lanes)
    }
}
