//! Snapshot providers split into submodules:
//! - memory.rs: MemorySnapshots (persistent-subtree images kept in process).
//! - dir.rs: DirSnapshots (dataset directory copies + doc.xml under <root>/.snapshots).
//! - registry.rs: persisted snapshot registry (.snapshots/registry.json).
//!
//! A snapshot keyed by checkpoint name is the state that existed right
//! before that checkpoint ran: the working dataset (if any) plus the DOC
//! persistent subtree. The volatile subtree is never captured; rollback
//! leaves it empty.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::doc::DataObjectCache;

mod registry;

pub mod dir;
pub mod memory;

pub use dir::DirSnapshots;
pub use memory::MemorySnapshots;

/// Rollback facility the engine coordinates with.
pub trait SnapshotProvider: Send {
    /// False when there is no working dataset; such a provider never has
    /// a resumable snapshot.
    fn has_dataset(&self) -> bool;

    /// Working dataset directory handed to checkpoints, if there is one.
    fn dataset_path(&self) -> Option<&Path> {
        None
    }

    /// Record state under `name`, replacing any earlier snapshot of that name.
    fn snapshot(&mut self, name: &str, doc: &DataObjectCache) -> Result<()>;

    /// Restore the state recorded under `name`.
    fn rollback_to(&mut self, name: &str, doc: &mut DataObjectCache) -> Result<()>;

    /// True when a valid snapshot exists for `name`.
    fn has_snapshot(&self, name: &str) -> bool;

    /// Drop the snapshot for `name`. Missing snapshots are not an error.
    fn discard(&mut self, name: &str) -> Result<()>;

    /// Names with a snapshot, in the order they were taken.
    fn list(&self) -> Vec<String>;
}

/// Which checkpoints get a rollback point before they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotPolicy {
    /// One snapshot before every checkpoint.
    #[default]
    EveryCheckpoint,
    /// Only before checkpoints registered with `boundary = true`.
    Boundaries,
    /// No snapshots at all; resume is never possible.
    Never,
}

impl SnapshotPolicy {
    pub fn wants(&self, boundary: bool) -> bool {
        match self {
            SnapshotPolicy::EveryCheckpoint => true,
            SnapshotPolicy::Boundaries => boundary,
            SnapshotPolicy::Never => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotPolicy::EveryCheckpoint => "every_checkpoint",
            SnapshotPolicy::Boundaries => "boundaries",
            SnapshotPolicy::Never => "never",
        }
    }
}

impl fmt::Display for SnapshotPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "every_checkpoint" | "every" | "all" => Ok(SnapshotPolicy::EveryCheckpoint),
            "boundaries" | "boundary" | "phase" => Ok(SnapshotPolicy::Boundaries),
            "never" | "none" | "off" => Ok(SnapshotPolicy::Never),
            other => Err(anyhow!("unknown snapshot policy '{}'", other)),
        }
    }
}
