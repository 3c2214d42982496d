//! Typed key-value configuration store.
//!
//! [`ConfigStore`] is the boundary the external configuration collaborators
//! feed: a plain store with explicit `get`/`set`/`has` operations. Keys
//! follow the platform's uppercase convention, enforced as a validation rule
//! at the store boundary rather than as a side effect of how values are
//! assigned.
//!
//! Values are open [`serde_json::Value`]s; typed getters cover the common
//! scalar reads. [`ConfigStore::hydrate_from_env`] merges prefixed process
//! environment variables (after loading a `.env` file if present), which is
//! how the runtime picks up `WORKER_COUNT` at startup.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::core::error::RuntimeError;

/// Key holding the worker pool size; `0` or absent means one worker per
/// available core.
pub const WORKER_COUNT: &str = "WORKER_COUNT";

/// Environment variable prefix recognized by [`ConfigStore::hydrate_from_env`].
pub const ENV_PREFIX: &str = "AUTOMATON_";

/// Explicit typed key-value store consumed once at startup.
#[derive(Default)]
pub struct ConfigStore {
    values: RwLock<BTreeMap<String, Value>>,
}

impl ConfigStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with default values.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidKey`] when any default key violates
    /// the uppercase convention.
    pub fn with_defaults<I, K>(defaults: I) -> Result<Self, RuntimeError>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let store = Self::new();
        for (key, value) in defaults {
            store.set(key, value)?;
        }
        Ok(store)
    }

    /// Store a value under a key.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidKey`] when the key is not non-empty
    /// ASCII uppercase/digits/underscores.
    pub fn set<K: Into<String>>(&self, key: K, value: Value) -> Result<(), RuntimeError> {
        let key = key.into();
        validate_key(&key)?;
        self.values.write().insert(key, value);
        Ok(())
    }

    /// Fetch a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    /// Whether a key is present.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.values.read().contains_key(key)
    }

    /// Fetch a value as an unsigned integer, if present and numeric.
    #[must_use]
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.values.read().get(key).and_then(Value::as_u64)
    }

    /// Fetch a value as a string, if present and textual.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .get(key)
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
    }

    /// The configured worker count, if any.
    #[must_use]
    pub fn worker_count(&self) -> Option<usize> {
        self.get_u64(WORKER_COUNT)
            .and_then(|n| usize::try_from(n).ok())
    }

    /// Merge prefixed process environment variables into the store.
    ///
    /// Loads a `.env` file first if one exists, then scans the environment
    /// for `prefix`-prefixed variables whose remainder is a valid key.
    /// Values parsing as JSON scalars are stored typed; everything else is
    /// stored as a string. Returns the number of merged keys.
    pub fn hydrate_from_env(&self, prefix: &str) -> usize {
        let _ = dotenvy::dotenv();

        let mut merged = 0;
        for (name, raw) in std::env::vars() {
            let Some(key) = name.strip_prefix(prefix) else {
                continue;
            };
            if validate_key(key).is_err() {
                continue;
            }
            let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
            self.values.write().insert(key.to_owned(), value);
            merged += 1;
        }
        debug!(prefix, merged, "configuration hydrated from environment");
        merged
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

fn validate_key(key: &str) -> Result<(), RuntimeError> {
    let well_formed = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
    if well_formed {
        Ok(())
    } else {
        Err(RuntimeError::InvalidKey(key.to_owned()))
    }
}
