//! Persisted snapshot registry.
//!
//! Format: <root>/.snapshots/registry.json
//! {
//!   "entries": [
//!     {"name":"<checkpoint>","dir":"<path component>","doc_sha256":"<hex>","ts_nanos":<u128>},
//!     ...
//!   ]
//! }
//!
//! Entries are kept in the order the snapshots were taken. Writes go
//! through tmp+rename.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::util::now_nanos;

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct Registry {
    pub entries: Vec<RegEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct RegEntry {
    pub name: String,
    pub dir: String,
    pub doc_sha256: String,
    pub ts_nanos: u128,
}

impl Registry {
    pub fn find(&self, name: &str) -> Option<&RegEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Replace any entry of the same name and append as the newest.
    pub fn upsert(&mut self, name: &str, dir: &str, doc_sha256: &str) {
        self.remove(name);
        self.entries.push(RegEntry {
            name: name.to_string(),
            dir: dir.to_string(),
            doc_sha256: doc_sha256.to_string(),
            ts_nanos: now_nanos(),
        });
    }

    pub fn remove(&mut self, name: &str) -> Option<RegEntry> {
        let i = self.entries.iter().position(|e| e.name == name)?;
        Some(self.entries.remove(i))
    }
}

pub(crate) fn registry_dir(root: &Path) -> PathBuf {
    root.join(".snapshots")
}

fn registry_path(root: &Path) -> PathBuf {
    registry_dir(root).join("registry.json")
}

pub(crate) fn registry_load(root: &Path) -> Result<Registry> {
    let p = registry_path(root);
    if !p.exists() {
        return Ok(Registry::default());
    }
    let bytes = fs::read(&p).with_context(|| format!("read {}", p.display()))?;
    let reg: Registry = serde_json::from_slice(&bytes).context("parse registry.json")?;
    Ok(reg)
}

pub(crate) fn registry_save(root: &Path, reg: &Registry) -> Result<()> {
    let dir = registry_dir(root);
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    let path = registry_path(root);
    let tmp = dir.join("registry.json.tmp");

    let mut f = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(&tmp)
        .with_context(|| format!("open {}", tmp.display()))?;

    let data = serde_json::to_vec_pretty(reg).context("serialize registry.json")?;
    f.write_all(&data)?;
    let _ = f.sync_all();

    fs::rename(&tmp, &path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}
