//! Process-wide cipher registry.
//!
//! Populated once at library initialisation with the six built-in
//! schemes and append-only afterwards: ids are stable for the process
//! lifetime and an installed descriptor is never mutated. Connections
//! clone parameter defaults from here.

use std::sync::{Arc, Mutex};

use crate::config::CIPHER_NAME_MAX;
use crate::error::{CodecError, Result};
use crate::params::{ParamDef, ParamTable};

use super::CipherScheme;

struct Registered {
    scheme: Arc<dyn CipherScheme>,
}

/// Snapshot-free registry guarded by one process-wide mutex; hot paths
/// never take it because connections keep their own clones.
pub struct CipherRegistry {
    entries: Vec<Registered>,
    default_id: usize,
}

impl CipherRegistry {
    const fn empty() -> Self {
        Self {
            entries: Vec::new(),
            default_id: 0,
        }
    }

    /// 1-based id for a scheme name.
    #[must_use]
    pub fn id_by_name(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.scheme.name().eq_ignore_ascii_case(name))
            .map(|i| i + 1)
    }

    #[must_use]
    pub fn by_id(&self, id: usize) -> Option<Arc<dyn CipherScheme>> {
        if id == 0 {
            return None;
        }
        self.entries.get(id - 1).map(|e| Arc::clone(&e.scheme))
    }

    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<Arc<dyn CipherScheme>> {
        self.id_by_name(name).and_then(|id| self.by_id(id))
    }

    #[must_use]
    pub fn name_by_id(&self, id: usize) -> Option<String> {
        self.by_id(id).map(|s| s.name().to_string())
    }

    /// Id of the scheme used when none is configured explicitly.
    #[must_use]
    pub fn default_id(&self) -> usize {
        self.default_id
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Clones the default parameter tables for every registered scheme.
    #[must_use]
    pub fn scheme_tables(&self) -> Vec<(String, ParamTable)> {
        self.entries
            .iter()
            .map(|e| {
                (
                    e.scheme.name().to_string(),
                    ParamTable::from_defs(e.scheme.params()),
                )
            })
            .collect()
    }

    fn register(&mut self, scheme: Arc<dyn CipherScheme>, make_default: bool) -> Result<usize> {
        check_name(scheme.name())?;
        if self.id_by_name(scheme.name()).is_some() {
            return Err(CodecError::invalid(format!(
                "cipher '{}' is already registered",
                scheme.name()
            )));
        }
        for def in scheme.params() {
            check_name(def.name)?;
            if !def.is_valid() {
                return Err(CodecError::invalid(format!(
                    "parameter '{}' of cipher '{}' has an invalid range",
                    def.name,
                    scheme.name()
                )));
            }
        }
        self.entries.push(Registered { scheme });
        let id = self.entries.len();
        if make_default || self.default_id == 0 {
            self.default_id = id;
        }
        Ok(id)
    }
}

/// Valid names start with a letter and continue with letters, digits or
/// underscores; `global` is reserved for the common parameter table.
fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() >= CIPHER_NAME_MAX {
        return Err(CodecError::invalid(format!(
            "name '{name}' must be 1 to {} characters",
            CIPHER_NAME_MAX - 1
        )));
    }
    if name.eq_ignore_ascii_case("global") {
        return Err(CodecError::invalid("the name 'global' is reserved"));
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap_or('\0');
    if !first.is_ascii_alphabetic() {
        return Err(CodecError::invalid(format!(
            "name '{name}' must start with a letter"
        )));
    }
    if !chars.all(|c| c == '_' || c.is_ascii_alphanumeric()) {
        return Err(CodecError::invalid(format!(
            "name '{name}' contains invalid characters"
        )));
    }
    Ok(())
}

static REGISTRY: Mutex<CipherRegistry> = Mutex::new(CipherRegistry::empty());

/// Runs a closure against the registry.
pub fn with_registry<R>(f: impl FnOnce(&CipherRegistry) -> R) -> R {
    let guard = REGISTRY.lock().expect("cipher registry mutex poisoned");
    f(&guard)
}

/// Registers an additional cipher scheme; append-only, validated like
/// the built-ins. Returns the assigned id.
pub fn register_cipher(scheme: Arc<dyn CipherScheme>, make_default: bool) -> Result<usize> {
    let mut guard = REGISTRY.lock().expect("cipher registry mutex poisoned");
    guard.register(scheme, make_default)
}

/// Installs the built-in schemes. Idempotent; call once per process
/// before any codec work. `chacha20` is the default scheme.
pub fn initialize() -> Result<()> {
    let mut guard = REGISTRY.lock().expect("cipher registry mutex poisoned");
    if guard.count() > 0 {
        return Ok(());
    }
    guard.register(Arc::new(super::aescbc::Aes128CbcScheme), false)?;
    guard.register(Arc::new(super::aescbc::Aes256CbcScheme), false)?;
    guard.register(Arc::new(super::chacha20::ChaCha20Scheme), true)?;
    guard.register(Arc::new(super::sqlcipher::SqlCipherScheme), false)?;
    guard.register(Arc::new(super::rc4::Rc4Scheme), false)?;
    guard.register(Arc::new(super::ascon::Ascon128Scheme), false)?;
    guard.register(Arc::new(super::aegis::AegisScheme), false)?;
    Ok(())
}

/// Empties the registry; the inverse of [`initialize`] for orderly
/// library shutdown.
pub fn shutdown() {
    let mut guard = REGISTRY.lock().expect("cipher registry mutex poisoned");
    *guard = CipherRegistry::empty();
}
