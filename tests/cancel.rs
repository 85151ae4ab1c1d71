use anyhow::Result;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use keystone::{CheckpointRequest, Engine, EngineConfig, ErrorKind, ExecStatus};

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("ks-{}-{}-{}", prefix, pid, t))
}

fn cancel_after(e: &Engine, d: Duration) -> thread::JoinHandle<()> {
    let token = e.cancel_token();
    thread::spawn(move || {
        thread::sleep(d);
        token.cancel();
    })
}

#[test]
fn cancel_stops_a_sleeping_checkpoint_and_the_run() -> Result<()> {
    // keep-going must not carry on past a cancellation
    let mut e = Engine::new(EngineConfig::default().with_stop_on_error(false));
    e.register_checkpoint(CheckpointRequest::new("first", "noop"))?;
    e.register_checkpoint(CheckpointRequest::new("wait", "sleep").kwarg("seconds", "30"))?;
    e.register_checkpoint(CheckpointRequest::new("after", "set-property").kwarg("name", "after"))?;

    let h = cancel_after(&e, Duration::from_millis(150));
    let t0 = Instant::now();
    let (st, failed) = e.execute_checkpoints(None, None, false, None)?;
    h.join().unwrap();

    assert!(t0.elapsed() < Duration::from_secs(10));
    assert_eq!(st, ExecStatus::Failure);
    assert_eq!(failed, vec!["wait"]);
    let recs = e.errors().get_errors_by_mod_id("wait");
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].kind, ErrorKind::Cancelled);

    let p = e.doc().persistent();
    assert!(e
        .doc()
        .get_first_child(p, &keystone::Query::new().named("after"))
        .is_none());
    Ok(())
}

#[cfg(unix)]
#[test]
fn cancel_kills_the_subprocess_group() -> Result<()> {
    let dir = unique_root("cancel-shell");
    std::fs::create_dir_all(&dir)?;
    let marker = dir.join("marker");

    let mut e = Engine::new(EngineConfig::default().with_cancel_grace_ms(200));
    e.register_checkpoint(
        CheckpointRequest::new("long", "shell")
            .arg("sh")
            .arg("-c")
            .arg("sleep 1; touch marker")
            .kwarg("cwd", dir.to_string_lossy()),
    )?;

    let h = cancel_after(&e, Duration::from_millis(200));
    let (st, failed) = e.execute_checkpoints(None, None, false, None)?;
    h.join().unwrap();
    assert_eq!(st, ExecStatus::Failure);
    assert_eq!(failed, vec!["long"]);

    thread::sleep(Duration::from_millis(1500));
    assert!(!marker.exists(), "grandchild survived the cancel");

    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}

#[test]
fn a_new_run_rearms_the_token() -> Result<()> {
    let mut e = Engine::new(EngineConfig::default());
    e.register_checkpoint(CheckpointRequest::new("a", "noop"))?;
    e.cancel();
    let (st, _) = e.execute_checkpoints(None, None, false, None)?;
    assert_eq!(st, ExecStatus::Success);
    Ok(())
}
