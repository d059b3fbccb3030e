//! FILENAME: core/engine/src/options.rs
//! PURPOSE: Engine configuration and the read-only environment lookup context.
//! CONTEXT: `EngineOptions` is plain serde data so hosts can load it from their
//! own configuration files. `Environment` backs the `m.` identifier domain; it is
//! passed explicitly into resolution instead of reading process state on demand.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::value::ResultValue;

/// Tunables for expression evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Result slots kept per expression; slot history backs `r.self` and `prevval()`.
    pub result_slots: usize,
    /// Fall back to ASCII case-insensitive column name matching.
    pub case_insensitive_columns: bool,
    /// Seed for `random()`; None seeds from the clock.
    pub random_seed: Option<u64>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            result_slots: 2,
            case_insensitive_columns: true,
            random_seed: None,
        }
    }
}

impl EngineOptions {
    /// Slot count actually used; at least two so a previous value always exists.
    pub fn slots(&self) -> usize {
        self.result_slots.max(2)
    }
}

/// Lookup context for `m.name`. User-set variables shadow environment entries.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    user_vars: FxHashMap<String, ResultValue>,
    env_vars: FxHashMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current process environment.
    pub fn from_process() -> Self {
        Environment {
            user_vars: FxHashMap::default(),
            env_vars: std::env::vars().collect(),
        }
    }

    pub fn with_env_var(mut self, name: &str, value: &str) -> Self {
        self.env_vars.insert(name.to_string(), value.to_string());
        self
    }

    /// Sets a user variable; expressions must be re-resolved to see the change.
    pub fn set_user_variable(&mut self, name: &str, value: ResultValue) {
        self.user_vars.insert(name.to_string(), value);
    }

    pub fn remove_user_variable(&mut self, name: &str) -> Option<ResultValue> {
        self.user_vars.remove(name)
    }

    /// The value of `m.name`: a user variable, an environment string, or None.
    pub fn lookup(&self, name: &str) -> Option<EnvValue> {
        if let Some(v) = self.user_vars.get(name) {
            return Some(EnvValue::User(v.clone()));
        }
        self.env_vars
            .get(name)
            .map(|s| EnvValue::Environment(ResultValue::string(s.as_str())))
    }
}

/// Where an `m.` lookup was satisfied from.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvValue {
    User(ResultValue),
    Environment(ResultValue),
}

impl EnvValue {
    pub fn into_value(self) -> ResultValue {
        match self {
            EnvValue::User(v) | EnvValue::Environment(v) => v,
        }
    }
}
