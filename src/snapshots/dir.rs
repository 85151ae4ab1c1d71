//! Directory-backed snapshots.
//!
//! Layout under the run root:
//!   <root>/data                          working dataset handed to checkpoints
//!   <root>/.snapshots/registry.json      entries (see registry.rs)
//!   <root>/.snapshots/<component>/data   copy of the dataset
//!   <root>/.snapshots/<component>/doc.xml  persistent subtree as XML
//!
//! A snapshot is valid only when its registry entry, its directory and a
//! doc.xml whose sha256 matches the entry all exist. Images taken in this
//! process are also kept in memory and take precedence on rollback, so
//! runtime-only DOC objects survive an in-process resume.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::doc::{xml, DataObjectCache, DocImage, Subtree};
use crate::metrics::{record_snapshot_discarded, record_snapshot_rollback, record_snapshot_taken};
use crate::util::{clear_dir, copy_dir_all, path_component, sha256_hex};

use super::registry::{registry_dir, registry_load, registry_save, RegEntry, Registry};
use super::SnapshotProvider;

const DATA_DIR: &str = "data";
const DOC_FILE: &str = "doc.xml";

#[derive(Debug)]
pub struct DirSnapshots {
    root: PathBuf,
    data: PathBuf,
    reg: Registry,
    images: HashMap<String, DocImage>,
}

impl DirSnapshots {
    /// Open (or create) a run root. The dataset directory is created if missing.
    pub fn open(root: &Path) -> Result<Self> {
        let data = root.join(DATA_DIR);
        fs::create_dir_all(&data).with_context(|| format!("create dataset {}", data.display()))?;
        let reg = registry_load(root)?;
        log::debug!(
            "opened snapshot root {} ({} registered)",
            root.display(),
            reg.entries.len()
        );
        Ok(Self {
            root: root.to_path_buf(),
            data,
            reg,
            images: HashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> &Path {
        &self.data
    }

    fn snap_dir(&self, e: &RegEntry) -> PathBuf {
        registry_dir(&self.root).join(&e.dir)
    }

    fn is_valid(&self, e: &RegEntry) -> bool {
        let dir = self.snap_dir(e);
        if !dir.join(DATA_DIR).is_dir() {
            return false;
        }
        match fs::read(dir.join(DOC_FILE)) {
            Ok(bytes) => sha256_hex(&bytes) == e.doc_sha256,
            Err(_) => false,
        }
    }

    fn valid_entry(&self, name: &str) -> Option<&RegEntry> {
        self.reg.find(name).filter(|e| self.is_valid(e))
    }
}

impl SnapshotProvider for DirSnapshots {
    fn has_dataset(&self) -> bool {
        self.data.is_dir()
    }

    fn dataset_path(&self) -> Option<&Path> {
        Some(&self.data)
    }

    fn snapshot(&mut self, name: &str, doc: &DataObjectCache) -> Result<()> {
        let component = path_component(name);
        let dir = registry_dir(&self.root).join(&component);
        if dir.exists() {
            fs::remove_dir_all(&dir).with_context(|| format!("remove stale {}", dir.display()))?;
        }
        copy_dir_all(&self.data, &dir.join(DATA_DIR))
            .with_context(|| format!("copy dataset for snapshot '{}'", name))?;

        let text = doc
            .export_xml_string(Subtree::Persistent)
            .with_context(|| format!("serialize DOC for snapshot '{}'", name))?;
        let doc_path = dir.join(DOC_FILE);
        fs::write(&doc_path, text.as_bytes())
            .with_context(|| format!("write {}", doc_path.display()))?;

        self.reg.upsert(name, &component, &sha256_hex(text.as_bytes()));
        registry_save(&self.root, &self.reg)?;
        self.images.insert(name.to_string(), doc.persistent_image());

        log::debug!("snapshot '{}' -> {}", name, dir.display());
        record_snapshot_taken();
        Ok(())
    }

    fn rollback_to(&mut self, name: &str, doc: &mut DataObjectCache) -> Result<()> {
        let e = self
            .valid_entry(name)
            .ok_or_else(|| anyhow!("no valid snapshot named '{}'", name))?
            .clone();
        let dir = self.snap_dir(&e);

        clear_dir(&self.data)?;
        copy_dir_all(&dir.join(DATA_DIR), &self.data)
            .with_context(|| format!("restore dataset from snapshot '{}'", name))?;

        match self.images.get(name) {
            Some(image) => doc.restore_persistent(image)?,
            None => {
                let doc_path = dir.join(DOC_FILE);
                let text = fs::read_to_string(&doc_path)
                    .with_context(|| format!("read {}", doc_path.display()))?;
                let wrapper = xml::parse_str(&text)
                    .with_context(|| format!("parse {}", doc_path.display()))?;
                doc.restore_persistent_xml(&wrapper)
                    .with_context(|| format!("restore DOC from {}", doc_path.display()))?;
            }
        }

        log::info!("rolled back to snapshot '{}'", name);
        record_snapshot_rollback();
        Ok(())
    }

    fn has_snapshot(&self, name: &str) -> bool {
        self.valid_entry(name).is_some()
    }

    fn discard(&mut self, name: &str) -> Result<()> {
        self.images.remove(name);
        let Some(e) = self.reg.remove(name) else {
            return Ok(());
        };
        let dir = self.snap_dir(&e);
        if dir.exists() {
            fs::remove_dir_all(&dir).with_context(|| format!("remove {}", dir.display()))?;
        }
        registry_save(&self.root, &self.reg)?;
        record_snapshot_discarded();
        Ok(())
    }

    fn list(&self) -> Vec<String> {
        self.reg
            .entries
            .iter()
            .filter(|e| self.is_valid(e))
            .map(|e| e.name.clone())
            .collect()
    }
}
