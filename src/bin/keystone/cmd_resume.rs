use anyhow::Result;
use std::path::PathBuf;

use keystone::lock::{lock_run, try_lock_run, LockMode};

use crate::util::{cancel_on_signal, open_engine, report};

pub struct ResumeArgs {
    pub path: PathBuf,
    pub manifest: PathBuf,
    pub from: String,
    pub pause_before: Option<String>,
    pub dry_run: bool,
    pub keep_going: bool,
    pub policy: Option<String>,
    pub wait: bool,
    pub json: bool,
}

pub fn exec(a: ResumeArgs) -> Result<i32> {
    let _lock = if a.wait {
        lock_run(&a.path, LockMode::Exclusive)?
    } else {
        try_lock_run(&a.path, LockMode::Exclusive)?
    };
    let mut engine = open_engine(&a.path, &a.manifest, a.policy.as_deref(), a.keep_going)?;
    cancel_on_signal(engine.cancel_token())?;

    let mut on_progress = |p: &keystone::Progress| {
        log::info!("{:>3}% {} ({}/{})", p.percent, p.name, p.completed, p.total);
    };
    let (status, failed) = engine.resume_execute_checkpoints(
        &a.from,
        a.pause_before.as_deref(),
        a.dry_run,
        Some(&mut on_progress),
    )?;
    report(&engine, status, &failed, a.json)
}
