//! multicipher - transparent page-level encryption for SQLite-style pagers.
//!
//! A cipher-agnostic codec core that encrypts fixed-size database pages
//! in place, with:
//! - Six interchangeable cipher schemes (ChaCha20-Poly1305, SQLCipher
//!   compat, AEGIS, Ascon-128, and the legacy AES-CBC and RC4 layouts)
//! - Per-page one-time keys so pages rewritten in place stay IND-CPA
//! - A page-1 salt discipline that keeps encrypted files self-describing
//! - Open-time scheme detection that trusts no file header field
//! - Hot-swappable read/write ciphers for online rekeying
//! - CPU-feature dispatch (AES-NI/VAES/NEON) with a portable fallback
//!
//! The host engine drives everything through [`Connection`]: attach a
//! codec per database, run pages through [`Connection::page_transform`],
//! and use the config surface for tuning. The pager, B-tree and VFS
//! remain the host's business; no I/O happens here.

pub mod aegis;
pub mod cipher;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod memory;
pub mod params;
pub mod primitives;
pub mod sqlite_header;

pub use cipher::registry::register_cipher;
pub use cipher::{CipherScheme, PageCipher};
pub use codec::{Codec, PageMode};
pub use connection::{Connection, RekeyPlan};
pub use error::{CodecError, Result};
pub use memory::{MemorySecurity, memory_security, set_memory_security};
pub use params::ParamDef;

/// Initialises the library: registers the built-in cipher schemes and
/// probes CPU features for the AEGIS dispatcher. Idempotent; called
/// implicitly by [`Connection::new`].
pub fn initialize() -> Result<()> {
    cipher::registry::initialize()?;
    // Touch the dispatcher so probing happens before any hot path.
    let _ = aegis::AegisVariant::Aegis128L.backend_name();
    Ok(())
}

/// Tears the cipher registry down; the inverse of [`initialize`] for
/// hosts that unload the library.
pub fn shutdown() {
    cipher::registry::shutdown();
}

/// The library version string.
#[must_use]
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
