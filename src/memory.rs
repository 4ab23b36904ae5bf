//! Secure-memory hook for buffers that hold key material.
//!
//! Two optional hardening levels on top of the default heap behaviour:
//! `Fill` guarantees a non-elidable wipe on free, `Lock` additionally
//! pins the pages so they cannot be swapped out. The scratch page buffer
//! and every derived key in the crate go through [`SecureBuffer`].

use std::sync::atomic::{AtomicU8, Ordering};

use zeroize::Zeroize;

/// Process-wide hardening level for key-bearing allocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MemorySecurity {
    /// Plain heap allocations.
    None = 0,
    /// Zeroise on free with a wipe the optimizer cannot remove.
    Fill = 1,
    /// `Fill`, plus `mlock(2)` while the buffer is alive.
    Lock = 2,
}

static MEMORY_SECURITY: AtomicU8 = AtomicU8::new(MemorySecurity::Fill as u8);

/// Sets the process-wide memory security level.
///
/// Takes effect for buffers allocated afterwards; live buffers keep the
/// level they were created with.
pub fn set_memory_security(mode: MemorySecurity) {
    MEMORY_SECURITY.store(mode as u8, Ordering::Relaxed);
}

/// Returns the current process-wide memory security level.
#[must_use]
pub fn memory_security() -> MemorySecurity {
    match MEMORY_SECURITY.load(Ordering::Relaxed) {
        0 => MemorySecurity::None,
        2 => MemorySecurity::Lock,
        _ => MemorySecurity::Fill,
    }
}

/// Heap buffer wiped on drop and optionally locked against swapping.
pub struct SecureBuffer {
    data: Vec<u8>,
    mode: MemorySecurity,
}

impl SecureBuffer {
    /// Allocates a zero-filled buffer of `len` bytes under the current
    /// memory security level.
    #[must_use]
    pub fn new(len: usize) -> Self {
        let mode = memory_security();
        let data = vec![0u8; len];
        let buf = Self { data, mode };
        if buf.mode == MemorySecurity::Lock {
            buf.lock_pages();
        }
        buf
    }

    /// Discards the contents and resizes the buffer in place.
    pub fn resize(&mut self, len: usize) {
        if self.mode == MemorySecurity::Lock {
            self.unlock_pages();
        }
        self.data.zeroize();
        self.data.clear();
        self.data.resize(len, 0);
        if self.mode == MemorySecurity::Lock {
            self.lock_pages();
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[cfg(unix)]
    fn lock_pages(&self) {
        if self.data.is_empty() {
            return;
        }
        // Locking is best effort: RLIMIT_MEMLOCK may be tiny.
        unsafe {
            libc::mlock(self.data.as_ptr().cast(), self.data.len());
        }
    }

    #[cfg(unix)]
    fn unlock_pages(&self) {
        if self.data.is_empty() {
            return;
        }
        unsafe {
            libc::munlock(self.data.as_ptr().cast(), self.data.len());
        }
    }

    #[cfg(not(unix))]
    fn lock_pages(&self) {}

    #[cfg(not(unix))]
    fn unlock_pages(&self) {}
}

impl Drop for SecureBuffer {
    fn drop(&mut self) {
        if self.mode != MemorySecurity::None {
            self.data.zeroize();
        }
        if self.mode == MemorySecurity::Lock {
            self.unlock_pages();
        }
    }
}

impl std::ops::Deref for SecureBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl std::ops::DerefMut for SecureBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}
