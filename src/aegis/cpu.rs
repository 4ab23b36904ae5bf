//! CPU-feature probing and backend selection.
//!
//! Runs exactly once per process. Every variant starts on the portable
//! backend; better implementations are installed in preference order as
//! features are confirmed, so the table always holds the best available
//! path and the software fallback is always linked in.
//!
//! x86_64: AES-NI+AVX for every variant, then VAES+AVX2 for the X2/X4
//! variants, then VAES+AVX512F for the X4 variants. aarch64: the ARM
//! crypto extensions for every variant. PowerPC's AltiVec path has no
//! stable intrinsics, so it falls through to software.

use std::sync::OnceLock;

use super::soft::SoftBlock;
use super::{state128l, state256};

pub(crate) type EncryptDetachedFn = fn(&mut [u8], &mut [u8], &[u8], &[u8], &[u8]);
pub(crate) type DecryptDetachedFn = fn(&mut [u8], &[u8], &[u8], &[u8], &[u8]) -> bool;
pub(crate) type XorFn = fn(&mut [u8], &[u8], &[u8]);

/// Function table for one AEGIS variant.
pub(crate) struct Backend {
    pub name: &'static str,
    pub encrypt_detached: EncryptDetachedFn,
    pub decrypt_detached: DecryptDetachedFn,
    pub encrypt: XorFn,
    pub decrypt: XorFn,
    pub stream: XorFn,
}

/// Tables indexed by variant: 128L, 128X2, 128X4, 256, 256X2, 256X4.
pub(crate) struct Dispatch {
    pub tables: [Backend; 6],
}

fn soft_128<const D: usize>() -> Backend {
    Backend {
        name: "soft",
        encrypt_detached: state128l::encrypt_detached::<SoftBlock<D>>,
        decrypt_detached: state128l::decrypt_detached::<SoftBlock<D>>,
        encrypt: state128l::encrypt_unauthenticated::<SoftBlock<D>>,
        decrypt: state128l::decrypt_unauthenticated::<SoftBlock<D>>,
        stream: state128l::stream::<SoftBlock<D>>,
    }
}

fn soft_256<const D: usize>() -> Backend {
    Backend {
        name: "soft",
        encrypt_detached: state256::encrypt_detached::<SoftBlock<D>>,
        decrypt_detached: state256::decrypt_detached::<SoftBlock<D>>,
        encrypt: state256::encrypt_unauthenticated::<SoftBlock<D>>,
        decrypt: state256::decrypt_unauthenticated::<SoftBlock<D>>,
        stream: state256::stream::<SoftBlock<D>>,
    }
}

/// Builds a [`Backend`] whose entry points run with the given target
/// features enabled; the caller must have confirmed them at runtime.
macro_rules! feature_backend {
    ($name:literal, $feat:literal, $family:ident, $block:ty) => {{
        Backend {
            name: $name,
            encrypt_detached: |buf, mac, ad, nonce, key| {
                #[target_feature(enable = $feat)]
                unsafe fn go(buf: &mut [u8], mac: &mut [u8], ad: &[u8], nonce: &[u8], key: &[u8]) {
                    $family::encrypt_detached::<$block>(buf, mac, ad, nonce, key);
                }
                unsafe { go(buf, mac, ad, nonce, key) }
            },
            decrypt_detached: |buf, mac, ad, nonce, key| {
                #[target_feature(enable = $feat)]
                unsafe fn go(
                    buf: &mut [u8],
                    mac: &[u8],
                    ad: &[u8],
                    nonce: &[u8],
                    key: &[u8],
                ) -> bool {
                    $family::decrypt_detached::<$block>(buf, mac, ad, nonce, key)
                }
                unsafe { go(buf, mac, ad, nonce, key) }
            },
            encrypt: |buf, nonce, key| {
                #[target_feature(enable = $feat)]
                unsafe fn go(buf: &mut [u8], nonce: &[u8], key: &[u8]) {
                    $family::encrypt_unauthenticated::<$block>(buf, nonce, key);
                }
                unsafe { go(buf, nonce, key) }
            },
            decrypt: |buf, nonce, key| {
                #[target_feature(enable = $feat)]
                unsafe fn go(buf: &mut [u8], nonce: &[u8], key: &[u8]) {
                    $family::decrypt_unauthenticated::<$block>(buf, nonce, key);
                }
                unsafe { go(buf, nonce, key) }
            },
            stream: |out, nonce, key| {
                #[target_feature(enable = $feat)]
                unsafe fn go(out: &mut [u8], nonce: &[u8], key: &[u8]) {
                    $family::stream::<$block>(out, nonce, key);
                }
                unsafe { go(out, nonce, key) }
            },
        }
    }};
}

fn build() -> Dispatch {
    let mut tables = [
        soft_128::<1>(),
        soft_128::<2>(),
        soft_128::<4>(),
        soft_256::<1>(),
        soft_256::<2>(),
        soft_256::<4>(),
    ];

    #[cfg(target_arch = "x86_64")]
    {
        use super::aesni::NiBlock;
        use super::avx2::VaesBlock;
        use super::avx512::Vaes512Block;

        cpufeatures::new!(cpuid_aes_avx, "aes", "avx");
        cpufeatures::new!(cpuid_vaes_avx2, "vaes", "avx2");
        cpufeatures::new!(cpuid_vaes_avx512, "vaes", "avx512f");

        if cpuid_aes_avx::get() {
            tables = [
                feature_backend!("aesni", "aes,avx", state128l, NiBlock<1>),
                feature_backend!("aesni", "aes,avx", state128l, NiBlock<2>),
                feature_backend!("aesni", "aes,avx", state128l, NiBlock<4>),
                feature_backend!("aesni", "aes,avx", state256, NiBlock<1>),
                feature_backend!("aesni", "aes,avx", state256, NiBlock<2>),
                feature_backend!("aesni", "aes,avx", state256, NiBlock<4>),
            ];
        }
        if cpuid_vaes_avx2::get() {
            tables[1] = feature_backend!("vaes-avx2", "vaes,avx2", state128l, VaesBlock<1>);
            tables[2] = feature_backend!("vaes-avx2", "vaes,avx2", state128l, VaesBlock<2>);
            tables[4] = feature_backend!("vaes-avx2", "vaes,avx2", state256, VaesBlock<1>);
            tables[5] = feature_backend!("vaes-avx2", "vaes,avx2", state256, VaesBlock<2>);
        }
        if cpuid_vaes_avx512::get() {
            tables[2] = feature_backend!("vaes-avx512", "vaes,avx512f", state128l, Vaes512Block);
            tables[5] = feature_backend!("vaes-avx512", "vaes,avx512f", state256, Vaes512Block);
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        use super::armcrypto::NeonBlock;

        cpufeatures::new!(cpuid_aes, "aes");

        if cpuid_aes::get() {
            tables = [
                feature_backend!("armcrypto", "aes", state128l, NeonBlock<1>),
                feature_backend!("armcrypto", "aes", state128l, NeonBlock<2>),
                feature_backend!("armcrypto", "aes", state128l, NeonBlock<4>),
                feature_backend!("armcrypto", "aes", state256, NeonBlock<1>),
                feature_backend!("armcrypto", "aes", state256, NeonBlock<2>),
                feature_backend!("armcrypto", "aes", state256, NeonBlock<4>),
            ];
        }
    }

    Dispatch { tables }
}

/// The process-wide dispatch table; probing runs on first access.
pub(crate) fn dispatch() -> &'static Dispatch {
    static DISPATCH: OnceLock<Dispatch> = OnceLock::new();
    DISPATCH.get_or_init(build)
}

/// Reference tables that always use the portable backend, for the
/// cross-implementation equivalence tests.
#[cfg(test)]
pub(crate) fn soft_dispatch() -> Dispatch {
    Dispatch {
        tables: [
            soft_128::<1>(),
            soft_128::<2>(),
            soft_128::<4>(),
            soft_256::<1>(),
            soft_256::<2>(),
            soft_256::<4>(),
        ],
    }
}
