//! The executor loop plus the resume entry points.
//!
//! Per descriptor, from the start index, in registration order:
//!   pause check -> cancel check -> snapshot (per policy) -> instantiate ->
//!   execute -> progress callback | error record.
//!
//! Snapshot bookkeeping outside dry runs:
//! - execute from index k discards snapshots of k and later first, so the
//!   resumable set never mixes two histories;
//! - resume from k rolls back to k's snapshot and discards later ones;
//! - a pause at p always records p's snapshot, whatever the policy, so a
//!   paused run can be resumed.

use anyhow::Context;
use std::time::Instant;

use crate::checkpoint::{CheckpointLogger, ExecContext, DEFAULT_PROGRESS_ESTIMATE_SECS};
use crate::doc::objects::ApplicationInfo;
use crate::doc::Query;
use crate::error::{CheckpointError, EngineError, EngineResult};
use crate::errsvc::ErrorRecord;
use crate::metrics::{record_checkpoint_cancelled, record_checkpoint_failed, record_checkpoint_run};
use crate::util::now_nanos;

use super::descriptor::CheckpointDescriptor;
use super::state::{EngineState, ExecStatus, Progress};
use super::Engine;

pub type ProgressCallback<'a> = Option<&'a mut dyn FnMut(&Progress)>;

const APPLICATION_NODE: &str = "application";

impl Engine {
    /// Run the registry from `start_from` (or the first checkpoint).
    ///
    /// Returns `(Success, [])`, `(Paused, [])`, or `(Failure, names)` with
    /// failed names in encounter order. Checkpoint failures never surface as
    /// `Err`; those are registration, lookup and snapshot problems.
    pub fn execute_checkpoints(
        &mut self,
        start_from: Option<&str>,
        pause_before: Option<&str>,
        dry_run: bool,
        callback: ProgressCallback<'_>,
    ) -> EngineResult<(ExecStatus, Vec<String>)> {
        let start = match start_from {
            Some(n) => self.index_of(n)?,
            None => 0,
        };
        let pause = pause_before.map(|n| self.index_of(n)).transpose()?;

        self.begin_run(dry_run);
        let res = self.discard_from(start, dry_run).and_then(|_| {
            self.run_from(start, pause, dry_run, callback)
        });
        self.finish_run(res)
    }

    /// Roll back to the snapshot taken before `start_from`, then run from it.
    /// `NoResumePoint` when no valid snapshot exists for that name. A dry
    /// run checks the snapshot but does not roll back.
    pub fn resume_execute_checkpoints(
        &mut self,
        start_from: &str,
        pause_before: Option<&str>,
        dry_run: bool,
        callback: ProgressCallback<'_>,
    ) -> EngineResult<(ExecStatus, Vec<String>)> {
        let start = self.index_of(start_from)?;
        let pause = pause_before.map(|n| self.index_of(n)).transpose()?;
        if !self.snapshots.has_dataset() || !self.snapshots.has_snapshot(start_from) {
            return Err(EngineError::NoResumePoint(start_from.to_string()));
        }

        if !dry_run {
            log::info!("resuming from '{}'", start_from);
            self.snapshots
                .rollback_to(start_from, &mut self.doc)
                .map_err(EngineError::Snapshot)?;
        }

        self.begin_run(dry_run);
        let res = self.discard_from(start + 1, dry_run).and_then(|_| {
            self.run_from(start, pause, dry_run, callback)
        });
        self.finish_run(res)
    }

    /// Registered names, in registration order, with a valid snapshot.
    pub fn get_resumable_checkpoints(&self) -> Vec<String> {
        if !self.snapshots.has_dataset() {
            return Vec::new();
        }
        self.checkpoints
            .iter()
            .filter(|d| self.snapshots.has_snapshot(&d.name))
            .map(|d| d.name.clone())
            .collect()
    }

    fn begin_run(&mut self, dry_run: bool) {
        self.errors.clear_error_list();
        self.cancel.reset();
        self.state = EngineState::Running;
        if !dry_run {
            self.touch_application_info();
        }
    }

    fn finish_run(
        &mut self,
        res: EngineResult<(ExecStatus, Vec<String>)>,
    ) -> EngineResult<(ExecStatus, Vec<String>)> {
        match &res {
            Ok((status, failed)) => {
                self.state = (*status).into();
                if failed.is_empty() {
                    log::info!("run finished: {}", status);
                } else {
                    log::error!("run finished: {} ({} failed: {})", status, failed.len(), failed.join(", "));
                }
            }
            Err(e) => {
                self.state = EngineState::Failure;
                log::error!("run aborted: {}", e);
            }
        }
        res
    }

    /// Run-scoped metadata under the persistent root.
    fn touch_application_info(&mut self) {
        let root = self.doc.persistent();
        let dataset = self.snapshots.dataset_path().map(|p| p.to_path_buf());
        let q = Query::new()
            .named(APPLICATION_NODE)
            .of_type::<ApplicationInfo>();
        let existing = self.doc.get_first_child(root, &q);
        let id = match existing {
            Some(id) => id,
            None => {
                let id = self.doc.tree_mut().new_node(
                    APPLICATION_NODE,
                    ApplicationInfo {
                        app: env!("CARGO_PKG_NAME").to_string(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                        ..Default::default()
                    },
                );
                if let Err(e) = self.doc.insert_children(root, &[id], None) {
                    log::warn!("could not record application info: {}", e);
                    return;
                }
                id
            }
        };
        if let Some(info) = self.doc.tree_mut().get_mut::<ApplicationInfo>(id) {
            info.runs += 1;
            info.started_nanos = now_nanos();
            info.dataset = dataset;
        }
    }

    fn discard_from(&mut self, from: usize, dry_run: bool) -> EngineResult<()> {
        if dry_run {
            return Ok(());
        }
        for d in self.checkpoints.iter().skip(from) {
            if self.snapshots.has_snapshot(&d.name) {
                log::debug!("discarding stale snapshot '{}'", d.name);
            }
            self.snapshots.discard(&d.name).map_err(EngineError::Snapshot)?;
        }
        Ok(())
    }

    fn take_snapshot(&mut self, name: &str) -> EngineResult<()> {
        self.snapshots
            .snapshot(name, &self.doc)
            .with_context(|| format!("snapshot before '{}'", name))
            .map_err(EngineError::Snapshot)
    }

    fn run_from(
        &mut self,
        start: usize,
        pause: Option<usize>,
        dry_run: bool,
        mut callback: ProgressCallback<'_>,
    ) -> EngineResult<(ExecStatus, Vec<String>)> {
        let end = pause.filter(|&p| p >= start).unwrap_or(self.checkpoints.len());
        let total = end - start;
        let weights = if callback.is_some() {
            self.progress_weights(start, end)
        } else {
            Vec::new()
        };
        let total_weight: u64 = weights.iter().sum();
        let mut weight_done = 0u64;
        let policy = self.config.snapshot_policy;
        let mut failed: Vec<String> = Vec::new();
        let mut completed = 0usize;
        let mut secs_done = 0u64;

        for i in start..self.checkpoints.len() {
            let d = self.checkpoints[i].clone();

            if pause == Some(i) {
                if !dry_run {
                    self.take_snapshot(&d.name)?;
                }
                log::info!("pausing before '{}'", d.name);
                if failed.is_empty() {
                    return Ok((ExecStatus::Paused, failed));
                }
                // Failures before the pause point are still reported.
                return Ok((ExecStatus::Failure, failed));
            }

            if self.cancel.is_cancelled() {
                log::warn!("run cancelled before '{}'", d.name);
                self.record_failure(&d, &CheckpointError::Cancelled, dry_run);
                failed.push(d.name.clone());
                break;
            }

            if !dry_run && policy.wants(d.boundary) {
                self.take_snapshot(&d.name)?;
            }

            log::info!(
                "[{}/{}] {} checkpoint '{}'",
                i + 1,
                self.checkpoints.len(),
                if dry_run { "validating" } else { "running" },
                d.name
            );
            let t0 = Instant::now();
            let outcome = self.run_one(&d, dry_run);
            record_checkpoint_run(t0.elapsed().as_micros() as u64);

            match outcome {
                Ok(estimate) => {
                    completed += 1;
                    secs_done += estimate;
                    weight_done += weights.get(i - start).copied().unwrap_or(0);
                    log::debug!("checkpoint '{}' done in {:?}", d.name, t0.elapsed());
                    if let Some(cb) = callback.as_deref_mut() {
                        let percent = if total_weight == 0 {
                            100
                        } else {
                            ((weight_done.min(total_weight) * 100) / total_weight) as u8
                        };
                        cb(&Progress {
                            name: d.name.clone(),
                            completed,
                            total,
                            percent,
                            estimated_secs_done: secs_done,
                        });
                    }
                }
                Err(err) => {
                    let cancelled = err.is_cancelled();
                    self.record_failure(&d, &err, dry_run);
                    failed.push(d.name.clone());
                    if cancelled {
                        log::warn!("checkpoint '{}' cancelled", d.name);
                        break;
                    }
                    log::error!("checkpoint '{}' failed: {}", d.name, err);
                    if self.stop_on_error {
                        break;
                    }
                }
            }
        }

        if failed.is_empty() {
            Ok((ExecStatus::Success, failed))
        } else {
            Ok((ExecStatus::Failure, failed))
        }
    }

    /// Per-step progress weights for `start..end` from each checkpoint's
    /// estimate. A step that cannot be instantiated here weighs the default;
    /// its real failure is recorded when it runs.
    fn progress_weights(&self, start: usize, end: usize) -> Vec<u64> {
        self.checkpoints[start..end]
            .iter()
            .map(|d| {
                (d.factory)(&d.args)
                    .map(|cp| cp.get_progress_estimate())
                    .unwrap_or(DEFAULT_PROGRESS_ESTIMATE_SECS)
                    .max(1)
            })
            .collect()
    }

    /// Instantiate and execute one checkpoint; returns its progress estimate.
    fn run_one(&mut self, d: &CheckpointDescriptor, dry_run: bool) -> Result<u64, CheckpointError> {
        let mut cp = (d.factory)(&d.args)
            .with_context(|| format!("instantiate '{}' ({})", d.name, d.impl_ref))?;
        let estimate = cp.get_progress_estimate();
        let mut ctx = ExecContext {
            name: &d.name,
            doc: &mut self.doc,
            cancel: self.cancel.clone(),
            log: CheckpointLogger::new(&d.name, d.loglevel),
            dataset: self.snapshots.dataset_path(),
            cancel_grace: self.config.cancel_grace(),
        };
        cp.execute(&mut ctx, dry_run)?;
        Ok(estimate)
    }

    fn record_failure(&mut self, d: &CheckpointDescriptor, err: &CheckpointError, dry_run: bool) {
        if err.is_cancelled() {
            record_checkpoint_cancelled();
        } else {
            record_checkpoint_failed();
        }
        let rec = ErrorRecord::from_checkpoint_error(&d.name, err)
            .with_meta("impl_ref", d.impl_ref.as_str())
            .with_meta("dry_run", dry_run.to_string());
        self.errors.add_error(rec);
    }
}
