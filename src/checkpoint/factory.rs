//! impl_ref -> constructor table.
//!
//! A descriptor names its implementation by string. The table resolves that
//! string at registration time (so a typo fails fast) and the engine calls
//! the factory only when it reaches the checkpoint.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::Checkpoint;

/// Positional and keyword arguments captured at registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointArgs {
    pub args: Vec<String>,
    pub kwargs: BTreeMap<String, String>,
}

impl CheckpointArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(&self, i: usize) -> Option<&str> {
        self.args.get(i).map(String::as_str)
    }

    pub fn kwarg(&self, key: &str) -> Option<&str> {
        self.kwargs.get(key).map(String::as_str)
    }

    pub fn require_kwarg(&self, key: &str) -> Result<&str> {
        self.kwarg(key)
            .ok_or_else(|| anyhow!("missing keyword argument '{}'", key))
    }

    /// Parse an optional kwarg, falling back to `default` when absent.
    pub fn parse_kwarg<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: std::str::FromStr,
        T::Err: fmt::Display,
    {
        match self.kwarg(key) {
            None => Ok(default),
            Some(s) => s
                .trim()
                .parse::<T>()
                .map_err(|e| anyhow!("keyword argument {}='{}': {}", key, s, e)),
        }
    }
}

pub type CheckpointFactory =
    Arc<dyn Fn(&CheckpointArgs) -> Result<Box<dyn Checkpoint>> + Send + Sync>;

#[derive(Clone, Default)]
pub struct FactoryTable {
    map: BTreeMap<String, CheckpointFactory>,
}

impl fmt::Debug for FactoryTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryTable")
            .field("names", &self.names())
            .finish()
    }
}

impl FactoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the generic steps from `builtin` registered.
    pub fn with_builtin() -> Self {
        let mut t = Self::new();
        super::builtin::register_builtin(&mut t);
        t
    }

    /// Register (or replace) the constructor for `impl_ref`.
    pub fn register<S, F>(&mut self, impl_ref: S, f: F) -> &mut Self
    where
        S: Into<String>,
        F: Fn(&CheckpointArgs) -> Result<Box<dyn Checkpoint>> + Send + Sync + 'static,
    {
        let key = impl_ref.into();
        if self.map.insert(key.clone(), Arc::new(f)).is_some() {
            log::debug!("factory '{}' replaced", key);
        }
        self
    }

    pub fn resolve(&self, impl_ref: &str) -> Option<CheckpointFactory> {
        self.map.get(impl_ref).cloned()
    }

    pub fn contains(&self, impl_ref: &str) -> bool {
        self.map.contains_key(impl_ref)
    }

    pub fn names(&self) -> Vec<&str> {
        self.map.keys().map(String::as_str).collect()
    }
}
