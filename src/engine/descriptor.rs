use log::LevelFilter;
use serde::{Serialize, Serializer};
use std::fmt;

use crate::checkpoint::{CheckpointArgs, CheckpointFactory};

/// A registered checkpoint. Immutable after registration; the factory is
/// resolved up front and only called when the engine reaches the step.
#[derive(Clone, Serialize)]
pub struct CheckpointDescriptor {
    pub name: String,
    pub impl_ref: String,
    #[serde(serialize_with = "level_as_str")]
    pub loglevel: LevelFilter,
    pub args: CheckpointArgs,
    pub description: Option<String>,
    /// Snapshot point under `SnapshotPolicy::Boundaries`.
    pub boundary: bool,
    #[serde(skip)]
    pub(crate) factory: CheckpointFactory,
}

fn level_as_str<S: Serializer>(l: &LevelFilter, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&l.as_str().to_ascii_lowercase())
}

impl fmt::Debug for CheckpointDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckpointDescriptor")
            .field("name", &self.name)
            .field("impl_ref", &self.impl_ref)
            .field("loglevel", &self.loglevel)
            .field("args", &self.args)
            .field("description", &self.description)
            .field("boundary", &self.boundary)
            .finish()
    }
}

/// Arguments to `Engine::register_checkpoint`.
///
/// ```ignore
/// engine.register_checkpoint(
///     CheckpointRequest::new("transfer", "shell")
///         .arg("cp").arg("-a").arg("/src").arg(".")
///         .loglevel(LevelFilter::Debug)
///         .insert_before("boot-archive"),
/// )?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct CheckpointRequest {
    pub(crate) name: String,
    pub(crate) impl_ref: String,
    pub(crate) insert_before: Option<String>,
    pub(crate) loglevel: Option<LevelFilter>,
    pub(crate) args: CheckpointArgs,
    pub(crate) description: Option<String>,
    pub(crate) boundary: bool,
}

impl CheckpointRequest {
    pub fn new<N: Into<String>, I: Into<String>>(name: N, impl_ref: I) -> Self {
        Self {
            name: name.into(),
            impl_ref: impl_ref.into(),
            ..Default::default()
        }
    }

    pub fn insert_before<S: Into<String>>(mut self, name: S) -> Self {
        self.insert_before = Some(name.into());
        self
    }

    pub fn loglevel(mut self, l: LevelFilter) -> Self {
        self.loglevel = Some(l);
        self
    }

    pub fn arg<S: Into<String>>(mut self, a: S) -> Self {
        self.args.args.push(a.into());
        self
    }

    pub fn kwarg<K: Into<String>, V: Into<String>>(mut self, k: K, v: V) -> Self {
        self.args.kwargs.insert(k.into(), v.into());
        self
    }

    pub fn args(mut self, args: CheckpointArgs) -> Self {
        self.args = args;
        self
    }

    pub fn description<S: Into<String>>(mut self, d: S) -> Self {
        self.description = Some(d.into());
        self
    }

    pub fn boundary(mut self, on: bool) -> Self {
        self.boundary = on;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
