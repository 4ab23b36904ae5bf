//! Per-database codec: cipher pair, scratch buffer, rekey protocol and
//! open-time scheme detection.
//!
//! A codec owns up to two cipher instances. In steady state read and
//! write are clones of each other; during a rekey they diverge, and the
//! journal keeps using the read cipher so rollback stays decryptable
//! under the key the original pages were written with. A codec with no
//! ciphers passes pages through untouched.

use tracing::{debug, trace};

use crate::cipher::registry::with_registry;
use crate::cipher::PageCipher;
use crate::config::{DETECTION_ORDER, SALT_LEN};
use crate::error::{CodecError, Result};
use crate::memory::SecureBuffer;
use crate::params::ConnectionParams;
use crate::sqlite_header::plausible_database_header;

/// What the pager is doing with the page it handed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMode {
    /// Page read from the main database file.
    Load,
    /// Page re-read after a rollback.
    Reload,
    /// Journal page being replayed into the main file.
    UndoJournal,
    /// Page about to be written to the main database file.
    WriteMain,
    /// Page about to be written to the rollback journal.
    WriteJournal,
}

/// Codec state for one attached database.
pub struct Codec {
    read_cipher: Option<Box<dyn PageCipher>>,
    write_cipher: Option<Box<dyn PageCipher>>,
    is_encrypted: bool,
    mac_check: bool,
    page_size: usize,
    reserved: usize,
    read_reserved: Option<usize>,
    write_reserved: Option<usize>,
    key_salt: Option<[u8; SALT_LEN]>,
    buffer: SecureBuffer,
}

impl Codec {
    #[must_use]
    pub fn new(page_size: usize) -> Self {
        Self {
            read_cipher: None,
            write_cipher: None,
            is_encrypted: false,
            mac_check: true,
            page_size,
            reserved: 0,
            read_reserved: None,
            write_reserved: None,
            key_salt: None,
            buffer: SecureBuffer::new(page_size),
        }
    }

    /// Installs a keyed cipher as both read and write instance.
    pub fn install(&mut self, cipher: Box<dyn PageCipher>) {
        self.reserved = cipher.reserved();
        self.read_cipher = Some(cipher.clone_box());
        self.write_cipher = Some(cipher);
        self.is_encrypted = true;
    }

    /// Copies another codec's cipher pair (attached databases inherit
    /// the main database's encryption).
    pub fn copy_from(&mut self, other: &Codec) {
        self.read_cipher = other.read_cipher.as_ref().map(|c| c.clone_box());
        self.write_cipher = other.write_cipher.as_ref().map(|c| c.clone_box());
        self.is_encrypted = other.is_encrypted;
        self.mac_check = other.mac_check;
        self.reserved = other.reserved;
    }

    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.is_encrypted
    }

    #[must_use]
    pub fn has_read_cipher(&self) -> bool {
        self.read_cipher.is_some()
    }

    #[must_use]
    pub fn has_write_cipher(&self) -> bool {
        self.write_cipher.is_some()
    }

    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    #[must_use]
    pub fn reserved(&self) -> usize {
        self.reserved
    }

    /// Reserved bytes the write cipher needs per page.
    #[must_use]
    pub fn write_cipher_reserved(&self) -> usize {
        self.write_cipher.as_ref().map_or(0, |c| c.reserved())
    }

    /// Fixed page size demanded by the write cipher, or 0.
    #[must_use]
    pub fn write_cipher_page_size(&self) -> u32 {
        self.write_cipher.as_ref().map_or(0, |c| c.page_size())
    }

    /// Name of the scheme backing the read cipher.
    #[must_use]
    pub fn scheme_name(&self) -> Option<String> {
        self.read_cipher
            .as_ref()
            .or(self.write_cipher.as_ref())
            .map(|c| c.scheme_name().to_string())
    }

    /// The active database salt, read side preferred.
    #[must_use]
    pub fn salt(&self) -> Option<&[u8; SALT_LEN]> {
        self.read_cipher
            .as_ref()
            .or(self.write_cipher.as_ref())
            .map(|c| c.salt())
    }

    /// Whether MAC verification runs on page loads.
    pub fn set_mac_check(&mut self, check: bool) {
        self.mac_check = check;
    }

    /// Caches a salt to be consumed by the next key installation
    /// (the `cipher_salt` URI parameter).
    pub fn set_key_salt(&mut self, salt: [u8; SALT_LEN]) {
        self.key_salt = Some(salt);
    }

    /// Takes and clears the cached key salt.
    pub fn take_key_salt(&mut self) -> Option<[u8; SALT_LEN]> {
        self.key_salt.take()
    }

    /// Pager notification: the page geometry changed.
    pub fn size_change(&mut self, page_size: usize, reserved: usize) {
        debug_assert!(
            reserved == 0 || page_size - reserved >= crate::config::MIN_USABLE_PAGE,
            "reserved tail leaves no room for a b-tree page"
        );
        if page_size != self.page_size {
            self.buffer.resize(page_size);
        }
        self.page_size = page_size;
        self.reserved = reserved;
    }

    fn read_side_reserved(&self) -> usize {
        self.read_reserved.unwrap_or(self.reserved)
    }

    fn write_side_reserved(&self) -> usize {
        self.write_reserved.unwrap_or(self.reserved)
    }

    /// Prepares a rekey that changes the reserved byte count: both
    /// widths stay pinned until [`Self::finish_rekey`].
    pub fn begin_reserved_transition(&mut self, read: usize, write: usize) {
        self.read_reserved = Some(read);
        self.write_reserved = Some(write);
    }

    /// True while a vacuum-for-rekey transition is pinned.
    #[must_use]
    pub fn in_reserved_transition(&self) -> bool {
        self.read_reserved.is_some() || self.write_reserved.is_some()
    }

    /// Installs a divergent write cipher; reads continue under the old
    /// key while new pages are written under the new one.
    pub fn set_write_cipher(&mut self, cipher: Option<Box<dyn PageCipher>>) {
        self.write_cipher = cipher;
        if self.read_cipher.is_none() && self.write_cipher.is_some() {
            // Encrypting a plaintext database: there is nothing to read
            // through a cipher yet.
            self.is_encrypted = true;
        }
    }

    /// Collapses the cipher pair after a rekey attempt. On success the
    /// write cipher becomes the read cipher; on failure the write
    /// cipher is restored from the read side. Returns whether the
    /// database is still encrypted.
    pub fn finish_rekey(&mut self, success: bool) -> bool {
        if success {
            match &self.write_cipher {
                Some(wc) => {
                    debug!(scheme = wc.scheme_name(), "rekey complete");
                    self.read_cipher = Some(wc.clone_box());
                    self.reserved = wc.reserved();
                }
                None => {
                    debug!("decryption complete, dropping ciphers");
                    self.read_cipher = None;
                    self.is_encrypted = false;
                }
            }
        } else {
            match &self.read_cipher {
                Some(rc) => {
                    debug!("rekey failed, restoring write cipher");
                    self.write_cipher = Some(rc.clone_box());
                }
                None => {
                    self.write_cipher = None;
                    self.is_encrypted = false;
                }
            }
        }
        self.read_reserved = None;
        self.write_reserved = None;
        self.is_encrypted
    }

    /// The page hot path: decrypts loads in place, encrypts writes into
    /// the scratch buffer. Returns the bytes the pager should use.
    pub fn transform<'a>(
        &'a mut self,
        page_no: u32,
        data: &'a mut [u8],
        mode: PageMode,
    ) -> Result<&'a [u8]> {
        if !self.is_encrypted {
            return Ok(data);
        }
        if data.len() != self.page_size {
            return Err(CodecError::invalid(format!(
                "page of {} bytes against a page size of {}",
                data.len(),
                self.page_size
            )));
        }
        trace!(page_no, ?mode, "transform");
        let read_reserved = self.read_side_reserved();
        let write_reserved = self.write_side_reserved();
        match mode {
            PageMode::Load | PageMode::Reload | PageMode::UndoJournal => {
                if let Some(cipher) = &self.read_cipher {
                    cipher.decrypt_page(page_no, data, read_reserved, self.mac_check)?;
                }
                Ok(data)
            }
            PageMode::WriteMain => match &self.write_cipher {
                Some(cipher) => {
                    self.buffer.as_mut_slice().copy_from_slice(data);
                    cipher.encrypt_page(page_no, self.buffer.as_mut_slice(), write_reserved)?;
                    Ok(self.buffer.as_slice())
                }
                // Write-decryption in progress: plaintext goes out.
                None => Ok(data),
            },
            PageMode::WriteJournal => match &self.read_cipher {
                // The rollback journal must stay readable under the key
                // the original pages carry.
                Some(cipher) => {
                    self.buffer.as_mut_slice().copy_from_slice(data);
                    cipher.encrypt_page(page_no, self.buffer.as_mut_slice(), read_reserved)?;
                    Ok(self.buffer.as_slice())
                }
                None => Ok(data),
            },
        }
    }
}

/// Open-time scheme detection over a raw page 1.
///
/// Tries each candidate in the configured preference order: adopt the
/// first 16 bytes as the salt, derive a key, decrypt with MAC checking,
/// and validate the database header. The first scheme that passes wins.
/// A `configured` scheme short-circuits the scan.
pub fn detect_cipher(
    page1: &[u8],
    page_size: usize,
    passphrase: &[u8],
    params: &ConnectionParams,
    configured: Option<&str>,
) -> Result<(String, Box<dyn PageCipher>)> {
    if page1.len() < page_size || !crate::config::is_valid_page_size(page_size) {
        return Err(CodecError::invalid("page 1 shorter than the page size"));
    }
    let salt: &[u8; SALT_LEN] = page1[..SALT_LEN].try_into().expect("salt prefix");

    let candidates: Vec<String> = match configured {
        Some(name) => vec![name.to_string()],
        None => DETECTION_ORDER.iter().map(ToString::to_string).collect(),
    };

    for name in &candidates {
        let Some(scheme) = with_registry(|reg| reg.by_name(name)) else {
            continue;
        };
        let Some(table) = params.scheme(name) else {
            continue;
        };
        let mut cipher = match scheme.create(table) {
            Ok(cipher) => cipher,
            Err(_) if configured.is_none() => continue,
            Err(e) => return Err(e),
        };
        if let Err(e) = cipher.generate_key(passphrase, false, Some(salt)) {
            // A raw key sized for a different scheme cannot match here.
            if configured.is_some() {
                return Err(e);
            }
            continue;
        }

        let mut probe = page1[..page_size].to_vec();
        let reserved = cipher.reserved();
        match cipher.decrypt_page(1, &mut probe, reserved, true) {
            Ok(()) if plausible_database_header(&probe, page_size, reserved) => {
                debug!(scheme = %name, "detected cipher scheme");
                return Ok((name.clone(), cipher));
            }
            _ => {
                trace!(scheme = %name, "candidate rejected");
            }
        }
    }
    Err(CodecError::NotADatabase)
}
