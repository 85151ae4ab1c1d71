//! In-process snapshots: persistent-subtree images only, no dataset files.

use anyhow::{anyhow, Result};

use crate::doc::{DataObjectCache, DocImage};
use crate::metrics::{record_snapshot_discarded, record_snapshot_rollback, record_snapshot_taken};

use super::SnapshotProvider;

#[derive(Debug, Clone)]
pub struct MemorySnapshots {
    enabled: bool,
    images: Vec<(String, DocImage)>,
}

impl Default for MemorySnapshots {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySnapshots {
    pub fn new() -> Self {
        Self {
            enabled: true,
            images: Vec::new(),
        }
    }

    /// Provider with no working dataset: snapshots are not recorded and
    /// nothing is ever resumable.
    pub fn without_dataset() -> Self {
        Self {
            enabled: false,
            images: Vec::new(),
        }
    }

    pub fn image(&self, name: &str) -> Option<&DocImage> {
        self.images.iter().find(|(n, _)| n == name).map(|(_, i)| i)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.images.iter().position(|(n, _)| n == name)
    }
}

impl SnapshotProvider for MemorySnapshots {
    fn has_dataset(&self) -> bool {
        self.enabled
    }

    fn snapshot(&mut self, name: &str, doc: &DataObjectCache) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if let Some(i) = self.position(name) {
            self.images.remove(i);
        }
        let image = doc.persistent_image();
        log::debug!("memory snapshot '{}' ({} nodes)", name, image.node_count());
        self.images.push((name.to_string(), image));
        record_snapshot_taken();
        Ok(())
    }

    fn rollback_to(&mut self, name: &str, doc: &mut DataObjectCache) -> Result<()> {
        let image = self
            .image(name)
            .ok_or_else(|| anyhow!("no snapshot named '{}'", name))?;
        doc.restore_persistent(image)?;
        record_snapshot_rollback();
        Ok(())
    }

    fn has_snapshot(&self, name: &str) -> bool {
        self.enabled && self.position(name).is_some()
    }

    fn discard(&mut self, name: &str) -> Result<()> {
        if let Some(i) = self.position(name) {
            self.images.remove(i);
            record_snapshot_discarded();
        }
        Ok(())
    }

    fn list(&self) -> Vec<String> {
        self.images.iter().map(|(n, _)| n.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::objects::Property;

    fn set(doc: &mut DataObjectCache, name: &str, v: &str) {
        let id = doc.tree_mut().new_node(name, Property::new(v));
        let p = doc.persistent();
        doc.insert_children(p, &[id], None).unwrap();
    }

    #[test]
    fn rollback_restores_persistent_and_clears_volatile() {
        let mut snaps = MemorySnapshots::new();
        let mut doc = DataObjectCache::new();
        set(&mut doc, "a", "1");
        snaps.snapshot("b", &doc).unwrap();
        set(&mut doc, "b", "2");
        let scratch = doc.tree_mut().new_node("scratch", Property::new("x"));
        let v = doc.volatile();
        doc.insert_children(v, &[scratch], None).unwrap();

        snaps.rollback_to("b", &mut doc).unwrap();
        let names: Vec<_> = doc
            .tree()
            .children(doc.persistent())
            .unwrap()
            .iter()
            .map(|&c| doc.tree().name(c).unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a"]);
        assert!(doc.tree().children(doc.volatile()).unwrap().is_empty());
    }

    #[test]
    fn retake_moves_to_end_and_discard_is_idempotent() {
        let mut snaps = MemorySnapshots::new();
        let doc = DataObjectCache::new();
        snaps.snapshot("a", &doc).unwrap();
        snaps.snapshot("b", &doc).unwrap();
        snaps.snapshot("a", &doc).unwrap();
        assert_eq!(snaps.list(), vec!["b", "a"]);
        snaps.discard("b").unwrap();
        snaps.discard("b").unwrap();
        assert!(!snaps.has_snapshot("b"));
        assert!(snaps.rollback_to("b", &mut DataObjectCache::new()).is_err());
    }

    #[test]
    fn without_dataset_records_nothing() {
        let mut snaps = MemorySnapshots::without_dataset();
        snaps.snapshot("a", &DataObjectCache::new()).unwrap();
        assert!(!snaps.has_dataset());
        assert!(!snaps.has_snapshot("a"));
        assert!(snaps.list().is_empty());
    }
}
