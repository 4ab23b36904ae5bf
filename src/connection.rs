//! Host-facing entry points: one [`Connection`] per database handle.
//!
//! The connection owns the per-connection parameter tables (cloned from
//! the registry defaults) and one codec slot per attached database,
//! index 0 being `main`. The embedding engine routes its codec hooks
//! here: attach, key queries, the page hot path, geometry changes,
//! rekey, and the configuration and URI surfaces.

use tracing::debug;

use crate::cipher::registry::{self, CipherRegistry, with_registry};
use crate::codec::{Codec, PageMode, detect_cipher};
use crate::config::SALT_LEN;
use crate::error::{CodecError, Result};
use crate::params::{ConnectionParams, ParamDef, ParamTable};

/// Connection-scoped parameters shared by all schemes: the selected
/// cipher id (0 selects the registry default) and whether page MACs are
/// verified on read.
pub(crate) const COMMON_PARAMS: [ParamDef; 2] = [
    ParamDef::new("cipher", 0, 0, 64),
    ParamDef::new("hmac_check", 1, 0, 1),
];

/// Outcome of [`Connection::begin_rekey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RekeyPlan {
    /// The reserved byte count changes, so the host must run the
    /// vacuum-for-rekey entry point before finishing.
    pub needs_vacuum: bool,
    /// Reserved bytes every rewritten page will carry.
    pub write_reserved: usize,
}

/// A database connection with up to one codec per attached database.
pub struct Connection {
    params: ConnectionParams,
    codecs: Vec<Option<Codec>>,
    key_salt: Option<[u8; SALT_LEN]>,
}

impl Connection {
    /// Creates a connection, initialising the cipher registry on first
    /// use and cloning its parameter defaults.
    pub fn new() -> Result<Self> {
        registry::initialize()?;
        let schemes = with_registry(CipherRegistry::scheme_tables);
        Ok(Self {
            params: ConnectionParams::new(ParamTable::from_defs(&COMMON_PARAMS), schemes),
            codecs: Vec::new(),
            key_salt: None,
        })
    }

    fn slot(&mut self, db_index: usize) -> &mut Option<Codec> {
        if self.codecs.len() <= db_index {
            self.codecs.resize_with(db_index + 1, || None);
        }
        &mut self.codecs[db_index]
    }

    fn codec(&self, db_index: usize) -> Option<&Codec> {
        self.codecs.get(db_index).and_then(Option::as_ref)
    }

    fn mac_check(&self) -> bool {
        self.params.common().get("hmac_check") != Some(0)
    }

    /// The explicitly configured scheme name, if any.
    fn configured_cipher(&self) -> Result<Option<String>> {
        let id = self.params.common().get("cipher").unwrap_or(0);
        if id == 0 {
            return Ok(None);
        }
        let id = usize::try_from(id).map_err(CodecError::invalid)?;
        with_registry(|reg| reg.name_by_id(id))
            .map(Some)
            .ok_or_else(|| CodecError::invalid(format!("no cipher registered with id {id}")))
    }

    /// The scheme used for fresh databases: configured or default.
    fn effective_cipher(&self) -> Result<String> {
        if let Some(name) = self.configured_cipher()? {
            return Ok(name);
        }
        with_registry(|reg| reg.name_by_id(reg.default_id()))
            .ok_or_else(|| CodecError::invalid("no cipher schemes registered"))
    }

    fn create_keyed_cipher(
        &self,
        name: &str,
        passphrase: &[u8],
        salt: Option<&[u8; SALT_LEN]>,
    ) -> Result<Box<dyn crate::cipher::PageCipher>> {
        let scheme = with_registry(|reg| reg.by_name(name))
            .ok_or_else(|| CodecError::invalid(format!("unknown cipher '{name}'")))?;
        let table = self
            .params
            .scheme(name)
            .ok_or_else(|| CodecError::invalid(format!("no parameters for cipher '{name}'")))?;
        let mut cipher = scheme.create(table)?;
        cipher.generate_key(passphrase, false, salt)?;
        Ok(cipher)
    }

    /// Installs a codec on an attached database.
    ///
    /// With a key and the raw first page of an existing file, the
    /// scheme is detected and keyed from the file's salt. With a key
    /// and no page (a fresh database) the configured scheme is used
    /// with a fresh or URI-provided salt. Without a key, an attached
    /// database inherits the main codec when main is encrypted.
    pub fn codec_attach(
        &mut self,
        db_index: usize,
        key: Option<&[u8]>,
        page1: Option<&[u8]>,
        page_size: usize,
    ) -> Result<()> {
        match key {
            None | Some(&[]) => {
                if db_index == 0 {
                    return Ok(());
                }
                let main_encrypted = self.codec(0).is_some_and(Codec::is_encrypted);
                if main_encrypted {
                    let mut codec = Codec::new(page_size);
                    let main = self.codec(0).expect("main codec checked above");
                    codec.copy_from(main);
                    let reserved = codec.write_cipher_reserved();
                    codec.size_change(page_size, reserved);
                    debug!(db_index, "attached database inherits main codec");
                    *self.slot(db_index) = Some(codec);
                }
                Ok(())
            }
            Some(key) => {
                let mut codec = Codec::new(page_size);
                codec.set_mac_check(self.mac_check());
                let configured = self.configured_cipher()?;

                let cipher = match page1 {
                    Some(page1) if page1.len() >= page_size => {
                        let (name, cipher) = detect_cipher(
                            page1,
                            page_size,
                            key,
                            &self.params,
                            configured.as_deref(),
                        )?;
                        debug!(db_index, scheme = %name, "keyed existing database");
                        cipher
                    }
                    _ => {
                        let name = self.effective_cipher()?;
                        let salt = self.key_salt.take();
                        debug!(db_index, scheme = %name, "keyed fresh database");
                        self.create_keyed_cipher(&name, key, salt.as_ref())?
                    }
                };
                codec.install(cipher);
                let reserved = codec.write_cipher_reserved();
                codec.size_change(page_size, reserved);
                *self.slot(db_index) = Some(codec);
                Ok(())
            }
        }
    }

    /// Returns 1 when `main` is encrypted so the engine propagates the
    /// key to attached databases opened without one; the passphrase
    /// itself is never stored or returned.
    #[must_use]
    pub fn codec_get_key(&self, db_index: usize) -> usize {
        usize::from(self.codec(db_index).is_some_and(Codec::is_encrypted))
    }

    /// The page hot path; returns the bytes the pager should use.
    pub fn page_transform<'a>(
        &'a mut self,
        db_index: usize,
        page_no: u32,
        data: &'a mut [u8],
        mode: PageMode,
    ) -> Result<&'a [u8]> {
        match self.codecs.get_mut(db_index).and_then(Option::as_mut) {
            Some(codec) => codec.transform(page_no, data, mode),
            None => Ok(data),
        }
    }

    /// Pager notification that page geometry changed.
    pub fn size_change(&mut self, db_index: usize, page_size: usize, reserved: usize) {
        if let Some(codec) = self.codecs.get_mut(db_index).and_then(Option::as_mut) {
            codec.size_change(page_size, reserved);
        }
    }

    /// Drops the codec of a detached database.
    pub fn detach(&mut self, db_index: usize) {
        if let Some(slot) = self.codecs.get_mut(db_index) {
            *slot = None;
        }
    }

    #[must_use]
    pub fn is_encrypted(&self, db_index: usize) -> bool {
        self.codec(db_index).is_some_and(Codec::is_encrypted)
    }

    /// Starts a rekey: `Some` key re-encrypts under a fresh write
    /// cipher (salt reused), `None` decrypts the database. The host
    /// must rewrite every page and then call [`Self::finish_rekey`].
    pub fn begin_rekey(
        &mut self,
        db_index: usize,
        new_key: Option<&[u8]>,
        page_size: usize,
        current_reserved: usize,
    ) -> Result<RekeyPlan> {
        let encrypted = self.is_encrypted(db_index);
        match new_key {
            None | Some(&[]) => {
                if !encrypted {
                    return Ok(RekeyPlan {
                        needs_vacuum: false,
                        write_reserved: current_reserved,
                    });
                }
                let codec = self.codecs[db_index].as_mut().expect("encrypted codec");
                codec.set_write_cipher(None);
                let needs_vacuum = current_reserved != 0;
                if needs_vacuum {
                    codec.begin_reserved_transition(current_reserved, 0);
                }
                debug!(db_index, "rekey to plaintext started");
                Ok(RekeyPlan {
                    needs_vacuum,
                    write_reserved: 0,
                })
            }
            Some(key) => {
                let name = self.effective_cipher()?;
                // The salt survives a rekey; a fresh database may take
                // one from the URI instead.
                let mut existing_salt = self.codec(db_index).and_then(Codec::salt).copied();
                if existing_salt.is_none() {
                    existing_salt = self.key_salt.take();
                }
                let cipher = self.create_keyed_cipher(&name, key, existing_salt.as_ref())?;
                let write_reserved = cipher.reserved();

                if self.codec(db_index).is_none() {
                    let mut codec = Codec::new(page_size);
                    codec.set_mac_check(self.mac_check());
                    *self.slot(db_index) = Some(codec);
                }
                let codec = self.codecs[db_index].as_mut().expect("slot just filled");
                codec.set_write_cipher(Some(cipher));
                let needs_vacuum = write_reserved != current_reserved;
                if needs_vacuum {
                    codec.begin_reserved_transition(current_reserved, write_reserved);
                }
                debug!(db_index, scheme = %name, needs_vacuum, "rekey started");
                Ok(RekeyPlan {
                    needs_vacuum,
                    write_reserved,
                })
            }
        }
    }

    /// Collapses the rekey state; on success the write cipher becomes
    /// the read cipher, on failure the old pair is restored. A database
    /// that ended up plaintext loses its codec.
    pub fn finish_rekey(&mut self, db_index: usize, success: bool) {
        let Some(codec) = self.codecs.get_mut(db_index).and_then(Option::as_mut) else {
            return;
        };
        let still_encrypted = codec.finish_rekey(success);
        if still_encrypted {
            let reserved = codec.write_cipher_reserved();
            let page_size = codec.page_size();
            codec.size_change(page_size, reserved);
        } else {
            self.detach(db_index);
        }
    }

    /// Reads or sets a common parameter; returns the (new) value.
    pub fn config(&mut self, name: &str, value: Option<i64>) -> Result<i64> {
        match value {
            Some(value) => self.params.common_mut().set(name, value),
            None => self
                .params
                .common()
                .get(name)
                .ok_or_else(|| CodecError::invalid(format!("unknown parameter '{name}'"))),
        }
    }

    /// Reads or sets a cipher-specific parameter.
    pub fn config_cipher(&mut self, cipher: &str, name: &str, value: Option<i64>) -> Result<i64> {
        let table = self
            .params
            .scheme_mut(cipher)
            .ok_or_else(|| CodecError::invalid(format!("unknown cipher '{cipher}'")))?;
        match value {
            Some(value) => table.set(name, value),
            None => table
                .get(name)
                .ok_or_else(|| CodecError::invalid(format!("unknown parameter '{name}'"))),
        }
    }

    /// The attached-database variant of [`Self::config_cipher`].
    ///
    /// Parameter tables are connection-scoped, so this differs only in
    /// validating the database slot: values set here take effect for
    /// ciphers instantiated by the next key operation on that database.
    pub fn config_cipher_for(
        &mut self,
        db_index: usize,
        cipher: &str,
        name: &str,
        value: Option<i64>,
    ) -> Result<i64> {
        if value.is_some() && self.is_encrypted(db_index) {
            return Err(CodecError::invalid(
                "cannot reconfigure a cipher while its database is keyed",
            ));
        }
        self.config_cipher(cipher, name, value)
    }

    /// Resolves a cipher name to its registry id (for the `cipher`
    /// common parameter).
    pub fn cipher_id(&self, name: &str) -> Result<i64> {
        with_registry(|reg| reg.id_by_name(name))
            .map(|id| id as i64)
            .ok_or_else(|| CodecError::invalid(format!("unknown cipher '{name}'")))
    }

    /// Cipher-instance data readouts: `cipher_salt` (hex) and
    /// `cipher_name` of the attached database's codec.
    #[must_use]
    pub fn codec_data(&self, name: &str, db_index: usize) -> Option<String> {
        let codec = self.codec(db_index)?;
        match name {
            "cipher_salt" | "salt" => codec.salt().map(hex::encode),
            "cipher_name" | "cipher" => codec.scheme_name(),
            _ => None,
        }
    }

    /// Applies recognised parameters from a URI query string
    /// (`cipher=<name>`, `cipher_salt=<32 hex>`, and the per-scheme
    /// numeric family). Unknown keys are ignored, bad values fail.
    pub fn apply_uri_parameters(&mut self, query: &str) -> Result<()> {
        // First pass: the scheme selection, so numeric parameters land
        // in the right table.
        let mut scheme = self.effective_cipher()?;
        for (key, value) in query_pairs(query) {
            if key.eq_ignore_ascii_case("cipher") {
                let id = self.cipher_id(value)?;
                self.params.common_mut().set("cipher", id)?;
                scheme = value.to_string();
            }
        }
        for (key, value) in query_pairs(query) {
            if key.eq_ignore_ascii_case("cipher") {
                continue;
            }
            if key.eq_ignore_ascii_case("cipher_salt") {
                let bytes = value.as_bytes();
                if bytes.len() < 2 * SALT_LEN
                    || !bytes[..2 * SALT_LEN].iter().all(u8::is_ascii_hexdigit)
                {
                    return Err(CodecError::invalid("cipher_salt must be 32 hex characters"));
                }
                let decoded = hex::decode(&bytes[..2 * SALT_LEN]).map_err(CodecError::invalid)?;
                let mut salt = [0u8; SALT_LEN];
                salt.copy_from_slice(&decoded);
                self.key_salt = Some(salt);
                continue;
            }
            if key.eq_ignore_ascii_case("hmac_check") {
                let parsed = parse_number(value)?;
                self.params.common_mut().set("hmac_check", parsed)?;
                continue;
            }
            let known = self
                .params
                .scheme(&scheme)
                .is_some_and(|t| t.get(key).is_some());
            if known {
                let parsed = parse_number(value)?;
                if let Some(table) = self.params.scheme_mut(&scheme) {
                    table.set(key, parsed)?;
                }
            }
        }
        Ok(())
    }

    /// Opens a configuration savepoint tied to the host transaction.
    pub fn config_savepoint(&mut self) {
        self.params.savepoint();
    }

    /// Keeps configuration changes made since the savepoint.
    pub fn config_commit(&mut self) {
        self.params.commit();
    }

    /// Discards configuration changes made since the savepoint.
    pub fn config_rollback(&mut self) {
        self.params.rollback();
    }

    #[must_use]
    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }
}

fn query_pairs(query: &str) -> impl Iterator<Item = (&str, &str)> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter_map(|pair| pair.split_once('='))
}

fn parse_number(value: &str) -> Result<i64> {
    value
        .parse::<i64>()
        .map_err(|_| CodecError::invalid(format!("'{value}' is not a number")))
}
