//! Error service: failures collected per originating checkpoint.
//!
//! Records keep encounter order across the whole run; lookups by checkpoint
//! name (`mod_id`) return that checkpoint's records in the same order. The
//! engine clears the list at the start of every run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::CheckpointError;
use crate::util::now_nanos;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// `execute()` (or instantiation) returned a failure.
    Execution,
    /// The checkpoint stopped because the run was cancelled.
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Execution => f.write_str("execution"),
            ErrorKind::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub mod_id: String,
    pub kind: ErrorKind,
    /// Top-level error text.
    pub message: String,
    /// Underlying causes, outermost first (excluding `message`).
    pub causes: Vec<String>,
    pub timestamp_nanos: u128,
    pub metadata: BTreeMap<String, String>,
}

impl ErrorRecord {
    pub fn new<S: Into<String>, M: Into<String>>(mod_id: S, kind: ErrorKind, message: M) -> Self {
        Self {
            mod_id: mod_id.into(),
            kind,
            message: message.into(),
            causes: Vec::new(),
            timestamp_nanos: now_nanos(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn from_checkpoint_error(mod_id: &str, err: &CheckpointError) -> Self {
        match err {
            CheckpointError::Cancelled => {
                ErrorRecord::new(mod_id, ErrorKind::Cancelled, "checkpoint cancelled")
            }
            CheckpointError::Failed(e) => {
                let mut chain = e.chain().map(|c| c.to_string());
                let message = chain.next().unwrap_or_default();
                let mut rec = ErrorRecord::new(mod_id, ErrorKind::Execution, message);
                rec.causes = chain.collect();
                rec
            }
        }
    }

    pub fn with_meta<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// "message: cause: cause" on one line.
    pub fn full_text(&self) -> String {
        let mut s = self.message.clone();
        for c in &self.causes {
            s.push_str(": ");
            s.push_str(c);
        }
        s
    }
}

#[derive(Debug, Clone, Default)]
pub struct ErrorService {
    records: Vec<ErrorRecord>,
}

impl ErrorService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear_error_list(&mut self) {
        self.records.clear();
    }

    pub fn add_error(&mut self, record: ErrorRecord) {
        log::debug!("error recorded for '{}': {}", record.mod_id, record.full_text());
        self.records.push(record);
    }

    pub fn get_errors_by_mod_id(&self, mod_id: &str) -> Vec<&ErrorRecord> {
        self.records.iter().filter(|r| r.mod_id == mod_id).collect()
    }

    pub fn get_errors_by_kind(&self, kind: ErrorKind) -> Vec<&ErrorRecord> {
        self.records.iter().filter(|r| r.kind == kind).collect()
    }

    pub fn get_all_errors(&self) -> &[ErrorRecord] {
        &self.records
    }

    /// Distinct checkpoint names in first-failure order.
    pub fn failed_mod_ids(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for r in &self.records {
            if !out.iter().any(|m| *m == r.mod_id) {
                out.push(r.mod_id.clone());
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// One line per record: "<name> [kind]: <error text>".
    pub fn report(&self) -> String {
        let mut out = String::new();
        for r in &self.records {
            out.push_str(&format!("{} [{}]: {}\n", r.mod_id, r.kind, r.full_text()));
        }
        out
    }
}
