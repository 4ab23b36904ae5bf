//! Plausibility checks over a decrypted page 1.
//!
//! Open-time detection cannot trust any field of an encrypted file, so
//! after a candidate cipher decrypts page 1 the fixed invariants of the
//! SQLite database header decide whether the decryption was real. The
//! MAC-less legacy schemes depend on this entirely; for the
//! authenticated schemes it is a second opinion after the tag check.

use crate::config::{SQLITE_MAGIC, is_valid_page_size};

/// Byte offsets within the 100-byte database header.
const OFS_PAGE_SIZE: usize = 16;
const OFS_WRITE_VERSION: usize = 18;
const OFS_READ_VERSION: usize = 19;
const OFS_RESERVED: usize = 20;
const OFS_MAX_EMBEDDED: usize = 21;
const OFS_MIN_EMBEDDED: usize = 22;
const OFS_LEAF_FRACTION: usize = 23;

/// Decides whether `page1` looks like the first page of a real SQLite
/// database of size `page_size` with `reserved` codec bytes per page.
///
/// Checks only fields the file format fixes for every valid database:
/// the magic string, the page-size word (where 1 encodes 65536), the
/// journalling versions, and the three payload fractions that are
/// constant by specification.
#[must_use]
pub fn plausible_database_header(page1: &[u8], page_size: usize, reserved: usize) -> bool {
    if page1.len() < 100 {
        return false;
    }
    if page1[..16] != SQLITE_MAGIC {
        return false;
    }

    let raw = u16::from_be_bytes([page1[OFS_PAGE_SIZE], page1[OFS_PAGE_SIZE + 1]]);
    let header_page_size = if raw == 1 { 65536 } else { usize::from(raw) };
    if !is_valid_page_size(header_page_size) || header_page_size != page_size {
        return false;
    }

    if !(1..=2).contains(&page1[OFS_WRITE_VERSION]) || !(1..=2).contains(&page1[OFS_READ_VERSION]) {
        return false;
    }

    // The header's reserved count is what the pager believes; a cipher
    // needing more space than the file grants cannot have written it.
    if usize::from(page1[OFS_RESERVED]) < reserved {
        return false;
    }

    page1[OFS_MAX_EMBEDDED] == 64
        && page1[OFS_MIN_EMBEDDED] == 32
        && page1[OFS_LEAF_FRACTION] == 32
}

/// Builds a minimal valid header for tests and freshly created pages.
#[cfg(test)]
pub(crate) fn sample_page1(page_size: usize, reserved: u8) -> Vec<u8> {
    let mut page = vec![0u8; page_size];
    page[..16].copy_from_slice(&SQLITE_MAGIC);
    let raw = if page_size == 65536 {
        1u16
    } else {
        page_size as u16
    };
    page[OFS_PAGE_SIZE..OFS_PAGE_SIZE + 2].copy_from_slice(&raw.to_be_bytes());
    page[OFS_WRITE_VERSION] = 1;
    page[OFS_READ_VERSION] = 1;
    page[OFS_RESERVED] = reserved;
    page[OFS_MAX_EMBEDDED] = 64;
    page[OFS_MIN_EMBEDDED] = 32;
    page[OFS_LEAF_FRACTION] = 32;
    page
}
