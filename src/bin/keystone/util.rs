use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use keystone::errsvc::ErrorRecord;
use keystone::metrics::{self, MetricsSnapshot};
use keystone::{CancelToken, DirSnapshots, Engine, EngineConfig, ExecStatus, SnapshotPolicy};

/// Engine over a run root with the manifest imported and registered.
pub fn open_engine(root: &Path, manifest: &Path, policy: Option<&str>, keep_going: bool) -> Result<Engine> {
    let mut cfg = EngineConfig::from_env();
    if let Some(p) = policy {
        cfg = cfg.with_snapshot_policy(p.parse::<SnapshotPolicy>()?);
    }
    let snaps = DirSnapshots::open(root)
        .with_context(|| format!("open run root {}", root.display()))?;
    let mut engine = Engine::builder().config(cfg).snapshots(snaps).build();
    engine.load_manifest(manifest)?;
    if keep_going {
        engine.set_stop_on_error(false);
    }
    Ok(engine)
}

#[derive(Serialize)]
struct Outcome<'a> {
    status: ExecStatus,
    failed: &'a [String],
    errors: &'a [ErrorRecord],
    resumable: Vec<String>,
    metrics: MetricsSnapshot,
}

/// Print a run result; returns the process exit code.
pub fn report(engine: &Engine, status: ExecStatus, failed: &[String], json: bool) -> Result<i32> {
    if json {
        let o = Outcome {
            status,
            failed,
            errors: engine.errors().get_all_errors(),
            resumable: engine.get_resumable_checkpoints(),
            metrics: metrics::snapshot(),
        };
        println!("{}", serde_json::to_string_pretty(&o)?);
    } else {
        println!("status: {}", status);
        if !failed.is_empty() {
            print!("{}", engine.errors().report());
        }
        let m = metrics::snapshot();
        println!(
            "checkpoints: {} run, {} failed ({:.0}%), avg {:.1} ms; snapshots: {} taken, {} rollbacks",
            m.checkpoints_run,
            m.checkpoints_failed,
            m.failure_ratio() * 100.0,
            m.avg_checkpoint_millis(),
            m.snapshots_taken,
            m.snapshot_rollbacks
        );
    }
    Ok(match status {
        ExecStatus::Success | ExecStatus::Paused => 0,
        ExecStatus::Failure => 1,
    })
}

static SIGNALLED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_sig: nix::libc::c_int) {
    SIGNALLED.store(true, Ordering::SeqCst);
}

/// SIGINT / SIGTERM trip `token` instead of killing the process, so the
/// running checkpoint can unwind and its subprocess group is cleaned up.
pub fn cancel_on_signal(token: CancelToken) -> Result<()> {
    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

    let action = SigAction::new(SigHandler::Handler(on_signal), SaFlags::empty(), SigSet::empty());
    for sig in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: the handler only stores to an atomic.
        unsafe { sigaction(sig, &action) }.with_context(|| format!("install {} handler", sig))?;
    }
    std::thread::spawn(move || loop {
        if SIGNALLED.swap(false, Ordering::SeqCst) {
            log::warn!("signal received; cancelling run");
            token.cancel();
        }
        std::thread::sleep(Duration::from_millis(50));
    });
    Ok(())
}
