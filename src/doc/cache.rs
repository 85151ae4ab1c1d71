//! DataObjectCache: the two DOC roots plus the XML dispatch table.
//!
//! - volatile:   rebuilt or cleared each run, never captured by snapshots.
//! - persistent: retained information (imported manifest, run metadata);
//!               snapshots capture exactly this subtree.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{TreeError, XmlError};

use super::objects::CacheRoot;
use super::query::Query;
use super::registry::XmlRegistry;
use super::tree::{NodeId, ObjectTree};
use super::xml::{self, Element};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subtree {
    Volatile,
    Persistent,
}

impl Subtree {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subtree::Volatile => "volatile",
            Subtree::Persistent => "persistent",
        }
    }
}

impl FromStr for Subtree {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "volatile" => Ok(Subtree::Volatile),
            "persistent" => Ok(Subtree::Persistent),
            other => Err(anyhow::anyhow!("unknown subtree '{}'", other)),
        }
    }
}

impl fmt::Display for Subtree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detached copy of the persistent subtree, used as an in-memory snapshot.
#[derive(Debug, Clone)]
pub struct DocImage {
    tree: ObjectTree,
    root: NodeId,
}

impl DocImage {
    pub fn node_count(&self) -> usize {
        self.tree.len()
    }
}

type TreeResult<T> = std::result::Result<T, TreeError>;

#[derive(Debug, Clone)]
pub struct DataObjectCache {
    tree: ObjectTree,
    volatile: NodeId,
    persistent: NodeId,
    registry: XmlRegistry,
}

impl Default for DataObjectCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DataObjectCache {
    /// Empty cache with the built-in XML variants registered.
    pub fn new() -> Self {
        Self::with_registry(XmlRegistry::with_builtin())
    }

    pub fn with_registry(registry: XmlRegistry) -> Self {
        let mut tree = ObjectTree::new();
        let volatile = tree.new_node(Subtree::Volatile.as_str(), CacheRoot);
        let persistent = tree.new_node(Subtree::Persistent.as_str(), CacheRoot);
        Self {
            tree,
            volatile,
            persistent,
            registry,
        }
    }

    pub fn registry(&self) -> &XmlRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut XmlRegistry {
        &mut self.registry
    }

    pub fn tree(&self) -> &ObjectTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut ObjectTree {
        &mut self.tree
    }

    pub fn root(&self, which: Subtree) -> NodeId {
        match which {
            Subtree::Volatile => self.volatile,
            Subtree::Persistent => self.persistent,
        }
    }

    pub fn volatile(&self) -> NodeId {
        self.volatile
    }

    pub fn persistent(&self) -> NodeId {
        self.persistent
    }

    /// Free every node below `which`, keeping the root itself.
    pub fn clear_subtree(&mut self, which: Subtree) {
        let root = self.root(which);
        let kids: Vec<NodeId> = self.tree.children(root).map(|c| c.to_vec()).unwrap_or_default();
        for k in kids {
            let _ = self.tree.purge(k);
        }
    }

    pub fn clear_volatile(&mut self) {
        self.clear_subtree(Subtree::Volatile);
    }

    /// Reset both subtrees. Detached nodes still held by callers are freed too.
    pub fn clear(&mut self) {
        let registry = std::mem::take(&mut self.registry);
        *self = Self::with_registry(registry);
    }

    // ----- query surface (delegates to the arena) -----

    pub fn insert_children(&mut self, parent: NodeId, nodes: &[NodeId], before: Option<NodeId>) -> TreeResult<()> {
        self.tree.insert_children(parent, nodes, before)
    }

    pub fn get_children(&self, parent: NodeId, q: &Query) -> TreeResult<Vec<NodeId>> {
        self.tree.get_children(parent, q)
    }

    pub fn get_first_child(&self, parent: NodeId, q: &Query) -> Option<NodeId> {
        self.tree.get_first_child(parent, q)
    }

    pub fn get_descendants(&self, parent: NodeId, q: &Query) -> TreeResult<Vec<NodeId>> {
        self.tree.get_descendants(parent, q)
    }

    pub fn delete_children(&mut self, parent: NodeId, q: &Query) -> TreeResult<Vec<NodeId>> {
        self.tree.delete_children(parent, q)
    }

    // ----- XML import / export -----

    /// Decode a parsed manifest and attach it under the chosen root.
    pub fn import_from_manifest_xml(&mut self, root_element: &Element, into: Subtree) -> Result<NodeId, XmlError> {
        let parent = self.root(into);
        let base = format!("/{}", into.as_str());
        let id = self.registry.decode_tree(root_element, &mut self.tree, &base)?;
        self.tree.insert_children(parent, &[id], None)?;
        log::debug!(
            "imported <{}> into {} as {}",
            root_element.tag,
            into,
            self.tree.path(id)?
        );
        Ok(id)
    }

    pub fn import_from_manifest_str(&mut self, text: &str, into: Subtree) -> Result<NodeId, XmlError> {
        let el = xml::parse_str(text)?;
        self.import_from_manifest_xml(&el, into)
    }

    pub fn import_from_manifest_file(&mut self, path: &Path, into: Subtree) -> anyhow::Result<NodeId> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read manifest {}", path.display()))?;
        let id = self
            .import_from_manifest_str(&text, into)
            .with_context(|| format!("import manifest {}", path.display()))?;
        Ok(id)
    }

    /// Element for `id` and its re-emittable descendants. Nodes whose
    /// variant has no XML form are skipped along with their subtree.
    pub fn node_to_xml(&self, id: NodeId) -> Option<Element> {
        let name = self.tree.name(id).ok()?;
        let mut el = self.tree.data(id).ok()?.to_xml(name)?;
        for &c in self.tree.children(id).ok()? {
            if let Some(child) = self.node_to_xml(c) {
                el.children.push(child);
            }
        }
        Some(el)
    }

    /// `<volatile>` / `<persistent>` wrapper holding every re-emittable top-level object.
    pub fn export_xml(&self, which: Subtree) -> Element {
        let mut wrapper = Element::new(which.as_str());
        if let Ok(kids) = self.tree.children(self.root(which)) {
            for &k in kids {
                if let Some(el) = self.node_to_xml(k) {
                    wrapper.children.push(el);
                }
            }
        }
        wrapper
    }

    pub fn export_xml_string(&self, which: Subtree) -> Result<String, XmlError> {
        xml::to_string_pretty(&self.export_xml(which))
    }

    /// Replace the persistent subtree with the objects of an exported
    /// `<persistent>` wrapper; the volatile subtree is emptied.
    pub fn restore_persistent_xml(&mut self, wrapper: &Element) -> Result<(), XmlError> {
        self.clear();
        for child in &wrapper.children {
            self.import_from_manifest_xml(child, Subtree::Persistent)?;
        }
        Ok(())
    }

    // ----- in-memory images -----

    pub fn persistent_image(&self) -> DocImage {
        let mut tree = ObjectTree::new();
        // The persistent root is always alive, so the copy cannot fail.
        let root = self
            .tree
            .copy_subtree(self.persistent, &mut tree)
            .unwrap_or_else(|_| tree.new_node(Subtree::Persistent.as_str(), CacheRoot));
        DocImage { tree, root }
    }

    /// Restore the persistent subtree from an image and empty the volatile one.
    pub fn restore_persistent(&mut self, image: &DocImage) -> TreeResult<()> {
        self.clear();
        let kids = image.tree.children(image.root)?.to_vec();
        let mut copies = Vec::with_capacity(kids.len());
        for k in kids {
            copies.push(image.tree.copy_subtree(k, &mut self.tree)?);
        }
        self.tree.insert_children(self.persistent, &copies, None)
    }

    /// Debug listing of both subtrees.
    pub fn render_tree(&self) -> String {
        let mut s = self.tree.render(self.persistent);
        s.push_str(&self.tree.render(self.volatile));
        s
    }
}
