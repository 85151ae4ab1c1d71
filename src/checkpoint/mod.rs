//! checkpoint: the unit-of-work abstraction.
//!
//! - mod.rs    : Checkpoint trait, ExecContext handed to execute(), CheckpointLogger.
//! - cancel.rs : CancelToken and process-group aware subprocess runner.
//! - factory.rs: CheckpointArgs and the impl_ref -> constructor table.
//! - builtin.rs: generic steps usable straight from a manifest.

pub mod builtin;
pub mod cancel;
pub mod factory;

use log::{Level, LevelFilter};
use std::fmt;
use std::path::Path;

use crate::doc::DataObjectCache;
use crate::error::CheckpointError;

pub use cancel::{run_command, run_command_checked, CancelToken};
pub use factory::{CheckpointArgs, CheckpointFactory, FactoryTable};

/// Progress weight used when a checkpoint does not say otherwise.
pub const DEFAULT_PROGRESS_ESTIMATE_SECS: u64 = 1;

/// A named, independently implemented unit of install/build work.
///
/// An instance is constructed by its factory right before the engine runs
/// it, and `execute` is called exactly once on that instance.
pub trait Checkpoint: Send {
    /// Perform the step, or only validate preconditions when `dry_run`.
    /// Long-running work must call `ctx.checkpoint()` at safe points.
    fn execute(&mut self, ctx: &mut ExecContext<'_>, dry_run: bool) -> Result<(), CheckpointError>;

    /// Advisory duration in seconds, used only to weight progress.
    fn get_progress_estimate(&self) -> u64 {
        DEFAULT_PROGRESS_ESTIMATE_SECS
    }
}

/// Everything a checkpoint may touch while it runs.
pub struct ExecContext<'a> {
    pub name: &'a str,
    pub doc: &'a mut DataObjectCache,
    pub cancel: CancelToken,
    pub log: CheckpointLogger,
    /// Working dataset directory of the snapshot provider, if it has one.
    pub dataset: Option<&'a Path>,
    /// Grace period between SIGTERM and SIGKILL for cancelled subprocesses.
    pub cancel_grace: std::time::Duration,
}

impl<'a> ExecContext<'a> {
    /// Cancellation safe point.
    pub fn checkpoint(&self) -> Result<(), CheckpointError> {
        self.cancel.check()
    }
}

/// Logger bound to one checkpoint: target `checkpoint::<name>`, filtered by
/// the descriptor's log level before the global filter applies.
#[derive(Debug, Clone)]
pub struct CheckpointLogger {
    target: String,
    level: LevelFilter,
}

impl CheckpointLogger {
    pub fn new(name: &str, level: LevelFilter) -> Self {
        Self {
            target: format!("checkpoint::{}", name),
            level,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn enabled(&self, level: Level) -> bool {
        level <= self.level
    }

    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        if self.enabled(level) {
            log::log!(target: self.target.as_str(), level, "{}", args);
        }
    }

    pub fn error<D: fmt::Display>(&self, msg: D) {
        self.log(Level::Error, format_args!("{}", msg));
    }

    pub fn warn<D: fmt::Display>(&self, msg: D) {
        self.log(Level::Warn, format_args!("{}", msg));
    }

    pub fn info<D: fmt::Display>(&self, msg: D) {
        self.log(Level::Info, format_args!("{}", msg));
    }

    pub fn debug<D: fmt::Display>(&self, msg: D) {
        self.log(Level::Debug, format_args!("{}", msg));
    }
}
