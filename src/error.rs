//! Typed errors of the engine, the object tree and the XML layer.
//!
//! I/O-heavy collaborators (snapshot providers, lock, CLI) stay on
//! `anyhow::Result` with `.context(..)`; everything a caller is expected to
//! match on lives here.

use thiserror::Error;

use crate::doc::NodeId;

/// Object tree (DOC) errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("node {node} ('{name}') already has a parent; detach it first")]
    Ownership { node: NodeId, name: String },

    #[error("inserting node {node} under {target} would create a cycle")]
    Cycle { node: NodeId, target: NodeId },

    #[error("no matching object found: {0}")]
    NotFound(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("node {0} does not exist")]
    NoSuchNode(NodeId),
}

/// Raised when no registered variant claims an element, or a variant rejects it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot import element <{tag}> at {path}: {reason}")]
pub struct ParsingError {
    pub tag: String,
    pub path: String,
    pub reason: String,
}

impl ParsingError {
    pub fn new(tag: &str, path: &str, reason: impl Into<String>) -> Self {
        Self {
            tag: tag.to_string(),
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

/// XML text <-> `Element` conversion errors.
#[derive(Error, Debug)]
pub enum XmlError {
    #[error("malformed XML: {0}")]
    Malformed(String),

    #[error("XML document has no root element")]
    Empty,

    #[error("failed to write XML: {0}")]
    Write(String),

    #[error(transparent)]
    Parsing(#[from] ParsingError),

    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Outcome of a failed `Checkpoint::execute`.
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("{0:#}")]
    Failed(#[from] anyhow::Error),

    #[error("checkpoint cancelled")]
    Cancelled,
}

impl CheckpointError {
    pub fn failed(msg: impl Into<String>) -> Self {
        CheckpointError::Failed(anyhow::anyhow!(msg.into()))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CheckpointError::Cancelled)
    }
}

/// Engine-level errors: registration, resume and snapshot coordination.
///
/// Checkpoint execution failures are never returned through this type; they
/// are collected in the error service and summarized in the run status.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("checkpoint '{0}' is already registered")]
    DuplicateCheckpoint(String),

    #[error("unknown checkpoint '{0}'")]
    UnknownCheckpoint(String),

    #[error("cannot resolve implementation '{impl_ref}' for checkpoint '{name}'")]
    UnresolvedImplementation { name: String, impl_ref: String },

    #[error("nothing to resume: no snapshot recorded for checkpoint '{0}'")]
    NoResumePoint(String),

    #[error("invalid manifest: {0}")]
    Manifest(String),

    #[error("snapshot provider failed: {0:#}")]
    Snapshot(anyhow::Error),

    #[error(transparent)]
    Tree(#[from] TreeError),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
