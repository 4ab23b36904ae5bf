//! Error classes surfaced by the codec.
//!
//! Exactly four classes cross the host boundary; the host maps them onto
//! its native result codes. Page 1 is special-cased throughout: failures
//! there read as "not a database" so that open-time detection can move on
//! to the next candidate scheme instead of reporting corruption.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CodecError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Bad parameter name, out-of-range value, malformed `raw:` key,
    /// unsupported MAC length, page number zero, mismatched page size.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// MAC failure or reserved-bytes mismatch on a page other than 1.
    #[error("encrypted page is corrupt")]
    Corrupt,

    /// MAC failure or reserved-bytes mismatch on page 1: either the file
    /// is not an encrypted database or the key is wrong.
    #[error("file is not a database or the key is incorrect")]
    NotADatabase,

    /// Allocation failure inside the codec.
    #[error("out of memory")]
    OutOfMemory,
}

impl CodecError {
    /// Builds an invalid-argument error from anything displayable.
    pub fn invalid<T: std::fmt::Display>(msg: T) -> Self {
        Self::InvalidArgument(msg.to_string())
    }

    /// The corruption class appropriate for `page_no`: page 1 guides
    /// detection, every other page is plain corruption.
    #[must_use]
    pub fn bad_page(page_no: u32) -> Self {
        if page_no == 1 {
            Self::NotADatabase
        } else {
            Self::Corrupt
        }
    }
}

/// Rejects the page number the pager must never hand out.
pub(crate) fn check_page_no(page_no: u32) -> Result<()> {
    if page_no == 0 {
        return Err(CodecError::invalid("page number must be positive"));
    }
    Ok(())
}
