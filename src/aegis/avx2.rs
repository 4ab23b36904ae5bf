//! x86_64 AEGIS backend using VAES over 256-bit registers.
//!
//! One `__m256i` holds two lanes, so the X2 variants run in a single
//! register and the X4 variants in two. Only reachable through the
//! dispatcher after the `vaes` and `avx2` feature checks.

#![allow(unsafe_code)]

use core::arch::x86_64::{
    __m256i, _mm256_aesenc_epi128, _mm256_and_si256, _mm256_loadu_si256, _mm256_setzero_si256,
    _mm256_storeu_si256, _mm256_xor_si256,
};

use super::block::AesBlock;

/// `H` double-lane registers, covering degree `2 * H`.
#[derive(Clone, Copy)]
pub(crate) struct VaesBlock<const H: usize>([__m256i; H]);

impl<const H: usize> AesBlock for VaesBlock<H> {
    const DEGREE: usize = 2 * H;
    const WIDTH: usize = 32 * H;

    #[inline(always)]
    fn zero() -> Self {
        Self([unsafe { _mm256_setzero_si256() }; H])
    }

    #[inline(always)]
    fn load(bytes: &[u8]) -> Self {
        debug_assert_eq!(bytes.len(), Self::WIDTH);
        let mut halves = [unsafe { _mm256_setzero_si256() }; H];
        for (h, half) in halves.iter_mut().enumerate() {
            *half = unsafe { _mm256_loadu_si256(bytes.as_ptr().add(h * 32).cast()) };
        }
        Self(halves)
    }

    #[inline(always)]
    fn store(self, out: &mut [u8]) {
        debug_assert_eq!(out.len(), Self::WIDTH);
        for (h, half) in self.0.iter().enumerate() {
            unsafe { _mm256_storeu_si256(out.as_mut_ptr().add(h * 32).cast(), *half) };
        }
    }

    #[inline(always)]
    fn xor(self, other: Self) -> Self {
        let mut halves = self.0;
        for (half, rhs) in halves.iter_mut().zip(other.0.iter()) {
            *half = unsafe { _mm256_xor_si256(*half, *rhs) };
        }
        Self(halves)
    }

    #[inline(always)]
    fn and(self, other: Self) -> Self {
        let mut halves = self.0;
        for (half, rhs) in halves.iter_mut().zip(other.0.iter()) {
            *half = unsafe { _mm256_and_si256(*half, *rhs) };
        }
        Self(halves)
    }

    #[inline(always)]
    fn round(self, round_key: Self) -> Self {
        let mut halves = self.0;
        for (half, rk) in halves.iter_mut().zip(round_key.0.iter()) {
            *half = unsafe { _mm256_aesenc_epi128(*half, *rk) };
        }
        Self(halves)
    }
}
