//! util: small helpers shared by the snapshot providers, config and CLI.
//!
//! - now_nanos(): current Unix time in nanoseconds.
//! - sha256_hex(): content digest used to validate snapshot images.
//! - copy_dir_all() / clear_dir(): dataset copy for directory snapshots.
//! - env_bool() / parse_level(): env parsing used by EngineConfig::from_env.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix time in nanoseconds (0 if the clock is before the epoch).
#[inline]
pub fn now_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut s = String::with_capacity(digest.len() * 2);
    for b in digest.iter() {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

/// Map an arbitrary checkpoint name to a single safe path component.
/// A short digest suffix keeps distinct names from colliding after mapping.
pub fn path_component(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}-{}", mapped, &sha256_hex(name.as_bytes())[..8])
}

/// Recursively copy `src` into `dst` (created if missing). Symlinks are
/// recreated, not followed.
pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).with_context(|| format!("create {}", dst.display()))?;
    for entry in fs::read_dir(src).with_context(|| format!("read dir {}", src.display()))? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let ft = entry.file_type()?;
        if ft.is_dir() {
            copy_dir_all(&from, &to)?;
        } else if ft.is_symlink() {
            copy_symlink(&from, &to)?;
        } else {
            fs::copy(&from, &to)
                .with_context(|| format!("copy {} -> {}", from.display(), to.display()))?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    let target = fs::read_link(from).with_context(|| format!("readlink {}", from.display()))?;
    std::os::unix::fs::symlink(&target, to)
        .with_context(|| format!("symlink {} -> {}", to.display(), target.display()))?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    fs::copy(from, to).with_context(|| format!("copy {} -> {}", from.display(), to.display()))?;
    Ok(())
}

/// Remove everything inside `dir`, keeping the directory itself.
pub fn clear_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        return Ok(());
    }
    for entry in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let entry = entry?;
        let p = entry.path();
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&p).with_context(|| format!("remove {}", p.display()))?;
        } else {
            fs::remove_file(&p).with_context(|| format!("remove {}", p.display()))?;
        }
    }
    Ok(())
}

/// "1|true|yes|on" (any case) => true.
pub fn env_bool(name: &str) -> Option<bool> {
    std::env::var(name).ok().map(|v| {
        let s = v.trim().to_ascii_lowercase();
        s == "1" || s == "true" || s == "yes" || s == "on"
    })
}

/// Parse a log level name ("info", "DEBUG", "off", ...).
pub fn parse_level(s: &str) -> Option<log::LevelFilter> {
    s.trim().parse::<log::LevelFilter>().ok()
}
