//! Cipher configuration parameters.
//!
//! Every parameter is a named integer with a `(default, value, min,
//! max)` descriptor. The global registry holds the defaults; each
//! connection clones them so configuration is connection-scoped, and a
//! savepoint stack lets configuration changes commit or roll back
//! together with the transaction that made them.

use crate::error::{CodecError, Result};

/// Static descriptor of one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamDef {
    pub name: &'static str,
    pub default: i64,
    pub min: i64,
    pub max: i64,
}

impl ParamDef {
    #[must_use]
    pub const fn new(name: &'static str, default: i64, min: i64, max: i64) -> Self {
        Self {
            name,
            default,
            min,
            max,
        }
    }

    /// A descriptor is well-formed when its bounds are ordered and the
    /// default lies inside them.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.min >= 0
            && self.max >= self.min
            && (self.min..=self.max).contains(&self.default)
    }
}

#[derive(Debug, Clone)]
struct Param {
    def: ParamDef,
    value: i64,
}

/// Current values for one scheme's parameter vector.
#[derive(Debug, Clone)]
pub struct ParamTable {
    params: Vec<Param>,
}

impl ParamTable {
    #[must_use]
    pub fn from_defs(defs: &[ParamDef]) -> Self {
        Self {
            params: defs
                .iter()
                .map(|def| Param {
                    def: *def,
                    value: def.default,
                })
                .collect(),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<i64> {
        self.params
            .iter()
            .find(|p| p.def.name.eq_ignore_ascii_case(name))
            .map(|p| p.value)
    }

    /// Like [`Self::get`] but for parameters the caller knows exist.
    pub(crate) fn expect(&self, name: &str) -> i64 {
        self.get(name).unwrap_or_else(|| {
            unreachable!("parameter {name} missing from its own scheme table")
        })
    }

    /// Sets a parameter, enforcing its `[min, max]` range. Returns the
    /// new value.
    pub fn set(&mut self, name: &str, value: i64) -> Result<i64> {
        let param = self
            .params
            .iter_mut()
            .find(|p| p.def.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| CodecError::invalid(format!("unknown parameter '{name}'")))?;
        if !(param.def.min..=param.def.max).contains(&value) {
            return Err(CodecError::invalid(format!(
                "value {value} for '{name}' outside [{}, {}]",
                param.def.min, param.def.max
            )));
        }
        param.value = value;
        Ok(value)
    }

    /// Whether the parameter still holds its registered default.
    #[must_use]
    pub fn is_default(&self, name: &str) -> bool {
        self.params
            .iter()
            .find(|p| p.def.name.eq_ignore_ascii_case(name))
            .is_some_and(|p| p.value == p.def.default)
    }

    /// Overrides a parameter only if the user has not configured it.
    pub(crate) fn preset(&mut self, name: &str, value: i64) {
        if let Some(param) = self
            .params
            .iter_mut()
            .find(|p| p.def.name.eq_ignore_ascii_case(name))
            && param.value == param.def.default
        {
            param.value = value;
        }
    }

    pub fn defs(&self) -> impl Iterator<Item = &ParamDef> {
        self.params.iter().map(|p| &p.def)
    }
}

type Snapshot = (ParamTable, Vec<(String, ParamTable)>);

/// Per-connection parameter state: the common table plus one table per
/// registered scheme.
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    common: ParamTable,
    schemes: Vec<(String, ParamTable)>,
    savepoints: Vec<Snapshot>,
}

impl ConnectionParams {
    #[must_use]
    pub fn new(common: ParamTable, schemes: Vec<(String, ParamTable)>) -> Self {
        Self {
            common,
            schemes,
            savepoints: Vec::new(),
        }
    }

    #[must_use]
    pub fn common(&self) -> &ParamTable {
        &self.common
    }

    pub fn common_mut(&mut self) -> &mut ParamTable {
        &mut self.common
    }

    #[must_use]
    pub fn scheme(&self, name: &str) -> Option<&ParamTable> {
        self.schemes
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, t)| t)
    }

    pub fn scheme_mut(&mut self, name: &str) -> Option<&mut ParamTable> {
        self.schemes
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, t)| t)
    }

    /// Opens a configuration savepoint; changes made afterwards are
    /// discarded by [`Self::rollback`] or kept by [`Self::commit`].
    pub fn savepoint(&mut self) {
        self.savepoints
            .push((self.common.clone(), self.schemes.clone()));
    }

    /// Releases the innermost savepoint, keeping the changes.
    pub fn commit(&mut self) {
        self.savepoints.pop();
    }

    /// Restores the state captured by the innermost savepoint.
    pub fn rollback(&mut self) {
        if let Some((common, schemes)) = self.savepoints.pop() {
            self.common = common;
            self.schemes = schemes;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ParamTable {
        ParamTable::from_defs(&[
            ParamDef::new("kdf_iter", 64007, 1, i32::MAX as i64),
            ParamDef::new("legacy", 0, 0, 1),
        ])
    }

    #[test]
    fn test_defaults() {
        let t = table();
        assert_eq!(t.get("kdf_iter"), Some(64007));
        assert_eq!(t.get("legacy"), Some(0));
        assert_eq!(t.get("missing"), None);
        assert!(t.is_default("kdf_iter"));
    }

    #[test]
    fn test_set_in_range() {
        let mut t = table();
        assert_eq!(t.set("kdf_iter", 4000).unwrap(), 4000);
        assert_eq!(t.get("kdf_iter"), Some(4000));
        assert!(!t.is_default("kdf_iter"));
    }

    #[test]
    fn test_set_out_of_range() {
        let mut t = table();
        assert!(t.set("legacy", 2).is_err());
        assert!(t.set("kdf_iter", 0).is_err());
        assert!(t.set("nope", 1).is_err());
    }

    #[test]
    fn test_names_case_insensitive() {
        let mut t = table();
        assert_eq!(t.get("KDF_ITER"), Some(64007));
        assert!(t.set("Legacy", 1).is_ok());
    }

    #[test]
    fn test_preset_respects_user_values() {
        let mut t = table();
        t.preset("kdf_iter", 12345);
        assert_eq!(t.get("kdf_iter"), Some(12345));
        t.set("kdf_iter", 777).unwrap();
        t.preset("kdf_iter", 4000);
        assert_eq!(t.get("kdf_iter"), Some(777));
    }

    #[test]
    fn test_savepoint_rollback() {
        let mut params =
            ConnectionParams::new(table(), vec![("chacha20".to_string(), table())]);
        params.savepoint();
        params
            .scheme_mut("chacha20")
            .unwrap()
            .set("kdf_iter", 1000)
            .unwrap();
        params.common_mut().set("legacy", 1).unwrap();
        params.rollback();
        assert_eq!(params.scheme("chacha20").unwrap().get("kdf_iter"), Some(64007));
        assert_eq!(params.common().get("legacy"), Some(0));
    }

    #[test]
    fn test_savepoint_commit() {
        let mut params =
            ConnectionParams::new(table(), vec![("chacha20".to_string(), table())]);
        params.savepoint();
        params
            .scheme_mut("chacha20")
            .unwrap()
            .set("kdf_iter", 1000)
            .unwrap();
        params.commit();
        assert_eq!(params.scheme("chacha20").unwrap().get("kdf_iter"), Some(1000));
    }

    #[test]
    fn test_nested_savepoints() {
        let mut params = ConnectionParams::new(table(), Vec::new());
        params.savepoint();
        params.common_mut().set("legacy", 1).unwrap();
        params.savepoint();
        params.common_mut().set("kdf_iter", 2).unwrap();
        params.rollback();
        assert_eq!(params.common().get("legacy"), Some(1));
        assert_eq!(params.common().get("kdf_iter"), Some(64007));
        params.rollback();
        assert_eq!(params.common().get("legacy"), Some(0));
    }

    #[test]
    fn test_def_validity() {
        assert!(ParamDef::new("ok", 1, 0, 2).is_valid());
        assert!(!ParamDef::new("bad", 3, 0, 2).is_valid());
        assert!(!ParamDef::new("bad", 0, 2, 1).is_valid());
        assert!(!ParamDef::new("bad", 0, -1, 1).is_valid());
    }
}
