//! Primitive kit: constant-time comparison, process PRNG, key
//! derivation, and the raw cipher building blocks the page transforms
//! are assembled from.
//!
//! Hash and block-cipher internals come from their audited crates; this
//! module only adds the glue the page formats need (explicit counters,
//! split tags, ciphertext stealing, deterministic legacy IVs).

pub mod ascon;
pub mod cbc;
pub mod chacha;
pub mod iv;
pub mod kdf;
pub mod rng;
pub mod verify;
