//! Advisory lock on a run root (fs2).
//!
//! Two pipeline invocations against the same root must not interleave:
//! - run / resume take the lock exclusively;
//! - read-only commands (resumable) take it shared.
//!
//! Lock file: <root>/LOCK. The exclusive holder writes its pid into it so
//! a contending command can say who is in the way. Released on Drop.

use anyhow::{anyhow, Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

pub struct RunLock {
    file: File,
    path: PathBuf,
    mode: LockMode,
}

impl RunLock {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl std::fmt::Debug for RunLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLock")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .finish()
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if self.mode == LockMode::Exclusive {
            let _ = self.file.set_len(0);
        }
        let _ = FileExt::unlock(&self.file);
    }
}

fn lock_file_path(root: &Path) -> PathBuf {
    root.join("LOCK")
}

fn open_lock_file(root: &Path) -> Result<File> {
    std::fs::create_dir_all(root).with_context(|| format!("create run root {}", root.display()))?;
    let path = lock_file_path(root);
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&path)
        .with_context(|| format!("open lock file {}", path.display()))
}

/// Pid recorded by the exclusive holder, if readable.
fn holder_pid(root: &Path) -> Option<u32> {
    let mut s = String::new();
    File::open(lock_file_path(root)).ok()?.read_to_string(&mut s).ok()?;
    s.trim().parse().ok()
}

fn stamp_pid(file: &mut File) -> Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    write!(file, "{}", std::process::id())?;
    let _ = file.sync_data();
    Ok(())
}

fn finish(mut file: File, root: &Path, mode: LockMode) -> Result<RunLock> {
    if mode == LockMode::Exclusive {
        stamp_pid(&mut file).context("record lock holder")?;
    }
    log::debug!("locked {} ({:?})", root.display(), mode);
    Ok(RunLock {
        file,
        path: lock_file_path(root),
        mode,
    })
}

/// Block until the lock is granted.
pub fn lock_run(root: &Path, mode: LockMode) -> Result<RunLock> {
    let file = open_lock_file(root)?;
    let res = match mode {
        LockMode::Shared => FileExt::lock_shared(&file),
        LockMode::Exclusive => FileExt::lock_exclusive(&file),
    };
    res.with_context(|| format!("lock {}", lock_file_path(root).display()))?;
    finish(file, root, mode)
}

/// Fail fast when another invocation holds a conflicting lock.
pub fn try_lock_run(root: &Path, mode: LockMode) -> Result<RunLock> {
    let file = open_lock_file(root)?;
    let res = match mode {
        LockMode::Shared => FileExt::try_lock_shared(&file),
        LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
    };
    if res.is_err() {
        let who = holder_pid(root)
            .map(|p| format!(" (held by pid {})", p))
            .unwrap_or_default();
        return Err(anyhow!("run root {} is busy{}", root.display(), who));
    }
    finish(file, root, mode)
}
