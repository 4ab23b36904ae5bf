//! x86_64 AEGIS backend using VAES over 512-bit registers.
//!
//! One `__m512i` holds all four lanes of the X4 variants. Only reachable
//! through the dispatcher after the `vaes` and `avx512f` feature checks.

#![allow(unsafe_code)]

use core::arch::x86_64::{
    __m512i, _mm512_aesenc_epi128, _mm512_and_si512, _mm512_loadu_si512, _mm512_setzero_si512,
    _mm512_storeu_si512, _mm512_xor_si512,
};

use super::block::AesBlock;

/// Four lanes in a single 512-bit register.
#[derive(Clone, Copy)]
pub(crate) struct Vaes512Block(__m512i);

impl AesBlock for Vaes512Block {
    const DEGREE: usize = 4;
    const WIDTH: usize = 64;

    #[inline(always)]
    fn zero() -> Self {
        Self(unsafe { _mm512_setzero_si512() })
    }

    #[inline(always)]
    fn load(bytes: &[u8]) -> Self {
        debug_assert_eq!(bytes.len(), Self::WIDTH);
        Self(unsafe { _mm512_loadu_si512(bytes.as_ptr().cast()) })
    }

    #[inline(always)]
    fn store(self, out: &mut [u8]) {
        debug_assert_eq!(out.len(), Self::WIDTH);
        unsafe { _mm512_storeu_si512(out.as_mut_ptr().cast(), self.0) };
    }

    #[inline(always)]
    fn xor(self, other: Self) -> Self {
        Self(unsafe { _mm512_xor_si512(self.0, other.0) })
    }

    #[inline(always)]
    fn and(self, other: Self) -> Self {
        Self(unsafe { _mm512_and_si512(self.0, other.0) })
    }

    #[inline(always)]
    fn round(self, round_key: Self) -> Self {
        Self(unsafe { _mm512_aesenc_epi128(self.0, round_key.0) })
    }
}
