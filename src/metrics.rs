//! Lightweight global metrics for the engine.
//!
//! Thread-safe atomic counters per subsystem:
//! - Checkpoints (run / failed / cancelled)
//! - Snapshots (taken / rollbacks / discarded)
//! - DOC (xml elements decoded, nodes inserted)

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

// ----- Checkpoints -----
static CHECKPOINTS_RUN: AtomicU64 = AtomicU64::new(0);
static CHECKPOINTS_FAILED: AtomicU64 = AtomicU64::new(0);
static CHECKPOINTS_CANCELLED: AtomicU64 = AtomicU64::new(0);
static CHECKPOINT_EXEC_MICROS: AtomicU64 = AtomicU64::new(0);

// ----- Snapshots -----
static SNAPSHOTS_TAKEN: AtomicU64 = AtomicU64::new(0);
static SNAPSHOT_ROLLBACKS: AtomicU64 = AtomicU64::new(0);
static SNAPSHOTS_DISCARDED: AtomicU64 = AtomicU64::new(0);

// ----- DOC -----
static XML_ELEMENTS_DECODED: AtomicU64 = AtomicU64::new(0);
static DOC_NODES_INSERTED: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    // Checkpoints
    pub checkpoints_run: u64,
    pub checkpoints_failed: u64,
    pub checkpoints_cancelled: u64,
    pub checkpoint_exec_micros: u64,

    // Snapshots
    pub snapshots_taken: u64,
    pub snapshot_rollbacks: u64,
    pub snapshots_discarded: u64,

    // DOC
    pub xml_elements_decoded: u64,
    pub doc_nodes_inserted: u64,
}

impl MetricsSnapshot {
    pub fn failure_ratio(&self) -> f64 {
        if self.checkpoints_run == 0 {
            0.0
        } else {
            self.checkpoints_failed as f64 / self.checkpoints_run as f64
        }
    }

    pub fn avg_checkpoint_millis(&self) -> f64 {
        if self.checkpoints_run == 0 {
            0.0
        } else {
            self.checkpoint_exec_micros as f64 / 1000.0 / self.checkpoints_run as f64
        }
    }
}

// ----- Recorders (Checkpoints) -----
pub fn record_checkpoint_run(micros: u64) {
    CHECKPOINTS_RUN.fetch_add(1, Ordering::Relaxed);
    CHECKPOINT_EXEC_MICROS.fetch_add(micros, Ordering::Relaxed);
}

pub fn record_checkpoint_failed() {
    CHECKPOINTS_FAILED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_checkpoint_cancelled() {
    CHECKPOINTS_CANCELLED.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Snapshots) -----
pub fn record_snapshot_taken() {
    SNAPSHOTS_TAKEN.fetch_add(1, Ordering::Relaxed);
}

pub fn record_snapshot_rollback() {
    SNAPSHOT_ROLLBACKS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_snapshot_discarded() {
    SNAPSHOTS_DISCARDED.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (DOC) -----
pub fn record_xml_element_decoded() {
    XML_ELEMENTS_DECODED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_nodes_inserted(n: usize) {
    DOC_NODES_INSERTED.fetch_add(n as u64, Ordering::Relaxed);
}

// ----- Snapshot / Reset -----
pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        checkpoints_run: CHECKPOINTS_RUN.load(Ordering::Relaxed),
        checkpoints_failed: CHECKPOINTS_FAILED.load(Ordering::Relaxed),
        checkpoints_cancelled: CHECKPOINTS_CANCELLED.load(Ordering::Relaxed),
        checkpoint_exec_micros: CHECKPOINT_EXEC_MICROS.load(Ordering::Relaxed),

        snapshots_taken: SNAPSHOTS_TAKEN.load(Ordering::Relaxed),
        snapshot_rollbacks: SNAPSHOT_ROLLBACKS.load(Ordering::Relaxed),
        snapshots_discarded: SNAPSHOTS_DISCARDED.load(Ordering::Relaxed),

        xml_elements_decoded: XML_ELEMENTS_DECODED.load(Ordering::Relaxed),
        doc_nodes_inserted: DOC_NODES_INSERTED.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    CHECKPOINTS_RUN.store(0, Ordering::Relaxed);
    CHECKPOINTS_FAILED.store(0, Ordering::Relaxed);
    CHECKPOINTS_CANCELLED.store(0, Ordering::Relaxed);
    CHECKPOINT_EXEC_MICROS.store(0, Ordering::Relaxed);

    SNAPSHOTS_TAKEN.store(0, Ordering::Relaxed);
    SNAPSHOT_ROLLBACKS.store(0, Ordering::Relaxed);
    SNAPSHOTS_DISCARDED.store(0, Ordering::Relaxed);

    XML_ELEMENTS_DECODED.store(0, Ordering::Relaxed);
    DOC_NODES_INSERTED.store(0, Ordering::Relaxed);
}
