//! x86_64 AEGIS backend using AES-NI.
//!
//! One `__m128i` register per lane. Only reachable through the
//! dispatcher, which has already verified the `aes` and `avx` CPU
//! features; the raw intrinsic calls rely on that.

#![allow(unsafe_code)]

use core::arch::x86_64::{
    __m128i, _mm_aesenc_si128, _mm_and_si128, _mm_loadu_si128, _mm_setzero_si128,
    _mm_storeu_si128, _mm_xor_si128,
};

use super::block::AesBlock;

/// `D` AES-NI lanes.
#[derive(Clone, Copy)]
pub(crate) struct NiBlock<const D: usize>([__m128i; D]);

impl<const D: usize> AesBlock for NiBlock<D> {
    const DEGREE: usize = D;
    const WIDTH: usize = 16 * D;

    #[inline(always)]
    fn zero() -> Self {
        Self([unsafe { _mm_setzero_si128() }; D])
    }

    #[inline(always)]
    fn load(bytes: &[u8]) -> Self {
        debug_assert_eq!(bytes.len(), Self::WIDTH);
        let mut lanes = [unsafe { _mm_setzero_si128() }; D];
        for (d, lane) in lanes.iter_mut().enumerate() {
            *lane = unsafe { _mm_loadu_si128(bytes.as_ptr().add(d * 16).cast()) };
        }
        Self(lanes)
    }

    #[inline(always)]
    fn store(self, out: &mut [u8]) {
        debug_assert_eq!(out.len(), Self::WIDTH);
        for (d, lane) in self.0.iter().enumerate() {
            unsafe { _mm_storeu_si128(out.as_mut_ptr().add(d * 16).cast(), *lane) };
        }
    }

    #[inline(always)]
    fn xor(self, other: Self) -> Self {
        let mut lanes = self.0;
        for (lane, rhs) in lanes.iter_mut().zip(other.0.iter()) {
            *lane = unsafe { _mm_xor_si128(*lane, *rhs) };
        }
        Self(lanes)
    }

    #[inline(always)]
    fn and(self, other: Self) -> Self {
        let mut lanes = self.0;
        for (lane, rhs) in lanes.iter_mut().zip(other.0.iter()) {
            *lane = unsafe { _mm_and_si128(*lane, *rhs) };
        }
        Self(lanes)
    }

    #[inline(always)]
    fn round(self, round_key: Self) -> Self {
        let mut lanes = self.0;
        for (lane, rk) in lanes.iter_mut().zip(round_key.0.iter()) {
            *lane = unsafe { _mm_aesenc_si128(*lane, *rk) };
        }
        Self(lanes)
    }
}
