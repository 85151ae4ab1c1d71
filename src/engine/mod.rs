//! engine: the ordered checkpoint registry and the executor driving it.
//!
//! - mod.rs:        Engine, EngineBuilder, registration, accessors.
//! - state.rs:      EngineState / ExecStatus / Progress.
//! - descriptor.rs: CheckpointDescriptor and the CheckpointRequest builder.
//! - execute.rs:    execute / resume / resumable.
//! - manifest.rs:   registration from `<execution>` objects in the DOC.
//!
//! One Engine value owns the DOC, the error service, the snapshot provider
//! and the cancel token; checkpoints reach all of them through the
//! `ExecContext` they are handed.

mod descriptor;
mod execute;
mod manifest;
mod state;

pub use descriptor::{CheckpointDescriptor, CheckpointRequest};
pub use state::{EngineState, ExecStatus, Progress};

use crate::checkpoint::{CancelToken, FactoryTable};
use crate::config::EngineConfig;
use crate::doc::DataObjectCache;
use crate::error::{EngineError, EngineResult};
use crate::errsvc::ErrorService;
use crate::snapshots::{MemorySnapshots, SnapshotProvider};

pub struct Engine {
    config: EngineConfig,
    stop_on_error: bool,
    checkpoints: Vec<CheckpointDescriptor>,
    factories: FactoryTable,
    doc: DataObjectCache,
    errors: ErrorService,
    snapshots: Box<dyn SnapshotProvider>,
    cancel: CancelToken,
    state: EngineState,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("stop_on_error", &self.stop_on_error)
            .field("checkpoints", &self.checkpoint_names())
            .field("state", &self.state)
            .finish()
    }
}

/// Builder for `Engine`. `new()` starts from `EngineConfig::from_env()`,
/// `from_default()` from plain defaults.
pub struct EngineBuilder {
    config: EngineConfig,
    factories: Option<FactoryTable>,
    doc: Option<DataObjectCache>,
    snapshots: Option<Box<dyn SnapshotProvider>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            config: EngineConfig::from_env(),
            factories: None,
            doc: None,
            snapshots: None,
        }
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_default() -> Self {
        Self {
            config: EngineConfig::default(),
            factories: None,
            doc: None,
            snapshots: None,
        }
    }

    pub fn config(mut self, cfg: EngineConfig) -> Self {
        self.config = cfg;
        self
    }

    pub fn stop_on_error(mut self, on: bool) -> Self {
        self.config.stop_on_error = on;
        self
    }

    pub fn snapshot_policy(mut self, p: crate::snapshots::SnapshotPolicy) -> Self {
        self.config.snapshot_policy = p;
        self
    }

    /// Replace the built-in factory table.
    pub fn factories(mut self, t: FactoryTable) -> Self {
        self.factories = Some(t);
        self
    }

    /// Start from an existing DOC (e.g. with extra XML variants registered).
    pub fn doc(mut self, doc: DataObjectCache) -> Self {
        self.doc = Some(doc);
        self
    }

    pub fn snapshots<P: SnapshotProvider + 'static>(mut self, p: P) -> Self {
        self.snapshots = Some(Box::new(p));
        self
    }

    pub fn build(self) -> Engine {
        log::debug!("building engine with {}", self.config);
        Engine {
            stop_on_error: self.config.stop_on_error,
            config: self.config,
            checkpoints: Vec::new(),
            factories: self.factories.unwrap_or_else(FactoryTable::with_builtin),
            doc: self.doc.unwrap_or_default(),
            errors: ErrorService::new(),
            snapshots: self
                .snapshots
                .unwrap_or_else(|| Box::new(MemorySnapshots::new())),
            cancel: CancelToken::new(),
            state: EngineState::Idle,
        }
    }
}

impl Engine {
    /// Engine with in-memory snapshots and the built-in factories.
    pub fn new(config: EngineConfig) -> Self {
        EngineBuilder::from_default().config(config).build()
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stop_on_error(&self) -> bool {
        self.stop_on_error
    }

    pub fn set_stop_on_error(&mut self, on: bool) {
        self.stop_on_error = on;
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn doc(&self) -> &DataObjectCache {
        &self.doc
    }

    pub fn doc_mut(&mut self) -> &mut DataObjectCache {
        &mut self.doc
    }

    pub fn errors(&self) -> &ErrorService {
        &self.errors
    }

    pub fn factories(&self) -> &FactoryTable {
        &self.factories
    }

    pub fn factories_mut(&mut self) -> &mut FactoryTable {
        &mut self.factories
    }

    pub fn snapshots(&self) -> &dyn SnapshotProvider {
        self.snapshots.as_ref()
    }

    /// Trip the cancel token of the current (or next) run.
    pub fn cancel(&self) {
        log::warn!("cancel requested");
        self.cancel.cancel();
    }

    /// Handle another thread can use to cancel the run.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn checkpoints(&self) -> &[CheckpointDescriptor] {
        &self.checkpoints
    }

    pub fn checkpoint_names(&self) -> Vec<&str> {
        self.checkpoints.iter().map(|d| d.name.as_str()).collect()
    }

    pub(crate) fn index_of(&self, name: &str) -> EngineResult<usize> {
        self.checkpoints
            .iter()
            .position(|d| d.name == name)
            .ok_or_else(|| EngineError::UnknownCheckpoint(name.to_string()))
    }

    /// Append a checkpoint, or insert it before an existing one. Duplicate
    /// names, unknown `insert_before` targets and unresolvable `impl_ref`s
    /// are rejected immediately.
    pub fn register_checkpoint(&mut self, req: CheckpointRequest) -> EngineResult<()> {
        if self.checkpoints.iter().any(|d| d.name == req.name) {
            return Err(EngineError::DuplicateCheckpoint(req.name));
        }
        let at = match &req.insert_before {
            Some(before) => self.index_of(before)?,
            None => self.checkpoints.len(),
        };
        let factory = self.factories.resolve(&req.impl_ref).ok_or_else(|| {
            EngineError::UnresolvedImplementation {
                name: req.name.clone(),
                impl_ref: req.impl_ref.clone(),
            }
        })?;

        let d = CheckpointDescriptor {
            name: req.name,
            impl_ref: req.impl_ref,
            loglevel: req.loglevel.unwrap_or(self.config.default_loglevel),
            args: req.args,
            description: req.description,
            boundary: req.boundary,
            factory,
        };
        log::debug!("registered checkpoint '{}' ({}) at #{}", d.name, d.impl_ref, at);
        self.checkpoints.insert(at, d);
        Ok(())
    }

    /// Clear the DOC, the error list and every snapshot; registrations stay.
    pub fn reset(&mut self) -> EngineResult<()> {
        self.doc.clear();
        self.errors.clear_error_list();
        for name in self.snapshots.list() {
            self.snapshots.discard(&name).map_err(EngineError::Snapshot)?;
        }
        self.cancel.reset();
        self.state = EngineState::Idle;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        Engine::new(EngineConfig::default())
    }

    #[test]
    fn registration_order_and_insert_before() {
        let mut e = engine();
        e.register_checkpoint(CheckpointRequest::new("a", "noop")).unwrap();
        e.register_checkpoint(CheckpointRequest::new("c", "noop")).unwrap();
        e.register_checkpoint(CheckpointRequest::new("b", "noop").insert_before("c")).unwrap();
        assert_eq!(e.checkpoint_names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn registration_errors_are_immediate() {
        let mut e = engine();
        e.register_checkpoint(CheckpointRequest::new("a", "noop")).unwrap();
        assert!(matches!(
            e.register_checkpoint(CheckpointRequest::new("a", "noop")),
            Err(EngineError::DuplicateCheckpoint(n)) if n == "a"
        ));
        assert!(matches!(
            e.register_checkpoint(CheckpointRequest::new("b", "noop").insert_before("zz")),
            Err(EngineError::UnknownCheckpoint(n)) if n == "zz"
        ));
        assert!(matches!(
            e.register_checkpoint(CheckpointRequest::new("b", "no-such-impl")),
            Err(EngineError::UnresolvedImplementation { .. })
        ));
        assert_eq!(e.checkpoint_names(), vec!["a"]);
    }

    #[test]
    fn descriptor_takes_default_loglevel() {
        let cfg = EngineConfig::default().with_default_loglevel(log::LevelFilter::Warn);
        let mut e = Engine::new(cfg);
        e.register_checkpoint(CheckpointRequest::new("a", "noop")).unwrap();
        e.register_checkpoint(CheckpointRequest::new("b", "noop").loglevel(log::LevelFilter::Trace))
            .unwrap();
        assert_eq!(e.checkpoints()[0].loglevel, log::LevelFilter::Warn);
        assert_eq!(e.checkpoints()[1].loglevel, log::LevelFilter::Trace);
    }
}
