use anyhow::Result;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use keystone::snapshots::SnapshotProvider;
use keystone::{
    Checkpoint, CheckpointArgs, CheckpointError, CheckpointRequest, DirSnapshots, Engine,
    EngineConfig, EngineError, ExecContext, ExecStatus, SnapshotPolicy,
};

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("ks-{}-{}-{}", prefix, pid, t))
}

type Trace = Arc<Mutex<Vec<String>>>;

/// Writes `<name>-<attempt>` into the dataset; fails while `healthy` is false.
struct Writer {
    name: String,
    trace: Trace,
    healthy: Arc<AtomicBool>,
    attempts: Arc<AtomicUsize>,
}

impl Checkpoint for Writer {
    fn execute(&mut self, ctx: &mut ExecContext<'_>, _dry_run: bool) -> Result<(), CheckpointError> {
        self.trace.lock().unwrap().push(self.name.clone());
        let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let data = ctx
            .dataset
            .ok_or_else(|| CheckpointError::failed("no dataset"))?;
        fs::write(data.join(format!("{}-{}", self.name, n)), b"x")
            .map_err(|e| CheckpointError::Failed(e.into()))?;
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(CheckpointError::failed(format!("{} is unhealthy", self.name)));
        }
        Ok(())
    }
}

struct Harness {
    trace: Trace,
    c_healthy: Arc<AtomicBool>,
    attempts: Arc<AtomicUsize>,
}

impl Harness {
    fn new() -> Self {
        Self {
            trace: Arc::new(Mutex::new(Vec::new())),
            c_healthy: Arc::new(AtomicBool::new(false)),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A (writer) -> B (set-property stage=b) -> C (writer, may fail) -> D (require stage=b)
    fn engine(&self, root: &PathBuf, policy: SnapshotPolicy) -> Result<Engine> {
        let cfg = EngineConfig::default().with_snapshot_policy(policy);
        let mut e = Engine::builder()
            .config(cfg)
            .snapshots(DirSnapshots::open(root)?)
            .build();

        let trace = self.trace.clone();
        let healthy = self.c_healthy.clone();
        let attempts = self.attempts.clone();
        e.factories_mut().register("writer", move |a: &CheckpointArgs| {
            let name = a.require_kwarg("id")?.to_string();
            let (healthy, attempts) = if name == "C" {
                (healthy.clone(), attempts.clone())
            } else {
                (Arc::new(AtomicBool::new(true)), Arc::new(AtomicUsize::new(0)))
            };
            Ok(Box::new(Writer {
                name,
                trace: trace.clone(),
                healthy,
                attempts,
            }) as Box<dyn Checkpoint>)
        });

        e.register_checkpoint(CheckpointRequest::new("A", "writer").kwarg("id", "A"))?;
        e.register_checkpoint(
            CheckpointRequest::new("B", "set-property")
                .kwarg("name", "stage")
                .kwarg("value", "b"),
        )?;
        e.register_checkpoint(CheckpointRequest::new("C", "writer").kwarg("id", "C").boundary(true))?;
        e.register_checkpoint(
            CheckpointRequest::new("D", "require-property")
                .kwarg("name", "stage")
                .kwarg("value", "b"),
        )?;
        Ok(e)
    }

    fn ran(&self) -> Vec<String> {
        self.trace.lock().unwrap().clone()
    }
}

#[test]
fn resume_after_failure_in_a_new_engine() -> Result<()> {
    let root = unique_root("resume");
    let h = Harness::new();

    {
        let mut e = h.engine(&root, SnapshotPolicy::EveryCheckpoint)?;
        let (st, failed) = e.execute_checkpoints(None, None, false, None)?;
        assert_eq!(st, ExecStatus::Failure);
        assert_eq!(failed, vec!["C"]);
        assert_eq!(h.ran(), vec!["A", "C"]);
        assert_eq!(e.get_resumable_checkpoints(), vec!["A", "B", "C"]);
        assert!(root.join("data").join("C-1").exists());
    }

    h.c_healthy.store(true, Ordering::SeqCst);
    let mut e = h.engine(&root, SnapshotPolicy::EveryCheckpoint)?;
    assert_eq!(e.get_resumable_checkpoints(), vec!["A", "B", "C"]);
    let (st, failed) = e.resume_execute_checkpoints("C", None, false, None)?;
    assert_eq!(st, ExecStatus::Success, "errors: {}", e.errors().report());
    assert!(failed.is_empty());

    // A and B were not re-run; A's file survived, C's failed attempt was rolled back.
    assert_eq!(h.ran(), vec!["A", "C", "C"]);
    let data = root.join("data");
    assert!(data.join("A-1").exists());
    assert!(!data.join("C-1").exists());
    assert!(data.join("C-2").exists());

    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn resume_without_snapshot_is_not_a_failure() -> Result<()> {
    let root = unique_root("noresume");
    let h = Harness::new();
    let mut e = h.engine(&root, SnapshotPolicy::EveryCheckpoint)?;

    match e.resume_execute_checkpoints("C", None, false, None) {
        Err(EngineError::NoResumePoint(n)) => assert_eq!(n, "C"),
        other => panic!("expected NoResumePoint, got {:?}", other.map(|r| r.0)),
    }
    assert!(h.ran().is_empty());
    assert!(e.errors().is_empty());

    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn boundary_policy_snapshots_only_boundaries() -> Result<()> {
    let root = unique_root("boundary");
    let h = Harness::new();
    let mut e = h.engine(&root, SnapshotPolicy::Boundaries)?;
    let (st, _) = e.execute_checkpoints(None, None, false, None)?;
    assert_eq!(st, ExecStatus::Failure);
    assert_eq!(e.get_resumable_checkpoints(), vec!["C"]);
    assert!(matches!(
        e.resume_execute_checkpoints("B", None, false, None),
        Err(EngineError::NoResumePoint(_))
    ));

    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn never_policy_still_resumes_a_pause() -> Result<()> {
    let root = unique_root("pause");
    let h = Harness::new();
    h.c_healthy.store(true, Ordering::SeqCst);

    let mut e = h.engine(&root, SnapshotPolicy::Never)?;
    let (st, failed) = e.execute_checkpoints(None, Some("C"), false, None)?;
    assert_eq!((st, failed.len()), (ExecStatus::Paused, 0));
    assert_eq!(e.get_resumable_checkpoints(), vec!["C"]);

    let mut e = h.engine(&root, SnapshotPolicy::Never)?;
    let (st, _) = e.resume_execute_checkpoints("C", None, false, None)?;
    assert_eq!(st, ExecStatus::Success);
    assert_eq!(h.ran(), vec!["A", "C"]);

    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn fresh_run_discards_stale_snapshots() -> Result<()> {
    let root = unique_root("stale");
    let h = Harness::new();
    h.c_healthy.store(true, Ordering::SeqCst);

    let mut e = h.engine(&root, SnapshotPolicy::EveryCheckpoint)?;
    e.execute_checkpoints(None, None, false, None)?;
    assert_eq!(e.get_resumable_checkpoints(), vec!["A", "B", "C", "D"]);

    // Re-running from B throws away B.. and retakes them as the run proceeds.
    e.execute_checkpoints(Some("B"), Some("D"), false, None)?;
    assert_eq!(e.get_resumable_checkpoints(), vec!["A", "B", "C", "D"]);

    e.reset()?;
    assert!(e.get_resumable_checkpoints().is_empty());
    assert!(e.snapshots().list().is_empty());

    let _ = fs::remove_dir_all(&root);
    Ok(())
}
