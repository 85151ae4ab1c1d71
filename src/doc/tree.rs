//! ObjectTree: arena of DOC nodes.
//!
//! Nodes live in a slot table addressed by `NodeId`; each node stores its
//! child ids in insertion order and an optional parent id. Ownership is
//! exclusive: a node with a parent cannot be inserted anywhere else until it
//! is detached, and insertion refuses any node that is an ancestor of (or
//! equal to) the target, so the structure stays a forest.

use std::fmt;

use crate::error::TreeError;
use crate::metrics::record_nodes_inserted;

use super::object::DataObject;
use super::query::Query;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
struct Node {
    name: String,
    data: Box<dyn DataObject>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Clone for Node {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            data: self.data.clone_object(),
            parent: self.parent,
            children: self.children.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ObjectTree {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
}

type TreeResult<T> = std::result::Result<T, TreeError>;

impl ObjectTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes (attached or not).
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create a detached node.
    pub fn new_node<S: Into<String>, T: DataObject>(&mut self, name: S, data: T) -> NodeId {
        self.new_boxed(name, Box::new(data))
    }

    pub fn new_boxed<S: Into<String>>(&mut self, name: S, data: Box<dyn DataObject>) -> NodeId {
        let node = Node {
            name: name.into(),
            data,
            parent: None,
            children: Vec::new(),
        };
        match self.free.pop() {
            Some(i) => {
                self.slots[i] = Some(node);
                NodeId(i)
            }
            None => {
                self.slots.push(Some(node));
                NodeId(self.slots.len() - 1)
            }
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        matches!(self.slots.get(id.0), Some(Some(_)))
    }

    fn node(&self, id: NodeId) -> TreeResult<&Node> {
        self.slots
            .get(id.0)
            .and_then(|s| s.as_ref())
            .ok_or(TreeError::NoSuchNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> TreeResult<&mut Node> {
        self.slots
            .get_mut(id.0)
            .and_then(|s| s.as_mut())
            .ok_or(TreeError::NoSuchNode(id))
    }

    pub fn name(&self, id: NodeId) -> TreeResult<&str> {
        Ok(self.node(id)?.name.as_str())
    }

    pub fn set_name<S: Into<String>>(&mut self, id: NodeId, name: S) -> TreeResult<()> {
        self.node_mut(id)?.name = name.into();
        Ok(())
    }

    pub fn parent(&self, id: NodeId) -> TreeResult<Option<NodeId>> {
        Ok(self.node(id)?.parent)
    }

    /// All direct children, insertion order.
    pub fn children(&self, id: NodeId) -> TreeResult<&[NodeId]> {
        Ok(self.node(id)?.children.as_slice())
    }

    pub fn data(&self, id: NodeId) -> TreeResult<&dyn DataObject> {
        Ok(self.node(id)?.data.as_ref())
    }

    /// Typed view of a node payload; None if the id is dead or the type differs.
    pub fn get<T: DataObject>(&self, id: NodeId) -> Option<&T> {
        self.node(id).ok()?.data.as_any().downcast_ref::<T>()
    }

    pub fn get_mut<T: DataObject>(&mut self, id: NodeId) -> Option<&mut T> {
        self.node_mut(id).ok()?.data.as_any_mut().downcast_mut::<T>()
    }

    /// True if `ancestor` is `node` or lies on the parent chain of `node`.
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(c) = cur {
            if c == ancestor {
                return true;
            }
            cur = self.node(c).ok().and_then(|n| n.parent);
        }
        false
    }

    /// Attach `nodes` to `parent`, keeping call order, appended or placed
    /// right before the existing child `before`.
    ///
    /// All nodes are validated first; on error nothing is attached.
    pub fn insert_children(
        &mut self,
        parent: NodeId,
        nodes: &[NodeId],
        before: Option<NodeId>,
    ) -> TreeResult<()> {
        self.node(parent)?;
        for (i, &n) in nodes.iter().enumerate() {
            let node = self.node(n)?;
            if node.parent.is_some() || nodes[..i].contains(&n) {
                return Err(TreeError::Ownership {
                    node: n,
                    name: node.name.clone(),
                });
            }
            if self.is_ancestor_or_self(n, parent) {
                return Err(TreeError::Cycle { node: n, target: parent });
            }
        }

        let pos = match before {
            Some(b) => {
                let siblings = &self.node(parent)?.children;
                siblings.iter().position(|&c| c == b).ok_or_else(|| {
                    TreeError::NotFound(format!("{} is not a child of {}", b, parent))
                })?
            }
            None => self.node(parent)?.children.len(),
        };

        for &n in nodes {
            self.node_mut(n)?.parent = Some(parent);
        }
        let p = self.node_mut(parent)?;
        p.children.splice(pos..pos, nodes.iter().copied());
        record_nodes_inserted(nodes.len());
        Ok(())
    }

    /// Clear the parent link of `id` and drop it from its parent's child list.
    /// The subtree stays alive and can be inserted elsewhere.
    pub fn detach(&mut self, id: NodeId) -> TreeResult<()> {
        let parent = self.node(id)?.parent;
        if let Some(p) = parent {
            self.node_mut(p)?.children.retain(|&c| c != id);
            self.node_mut(id)?.parent = None;
        }
        Ok(())
    }

    /// Detach `id` and free it together with its whole subtree.
    pub fn purge(&mut self, id: NodeId) -> TreeResult<()> {
        self.detach(id)?;
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            if let Some(node) = self.slots.get_mut(n.0).and_then(|s| s.take()) {
                stack.extend(node.children);
                self.free.push(n.0);
            }
        }
        Ok(())
    }

    fn not_found(q: &Query, what: &str, parent: NodeId) -> TreeError {
        TreeError::NotFound(format!("{} of {} matching {}", what, parent, q.describe()))
    }

    pub fn get_children(&self, parent: NodeId, q: &Query) -> TreeResult<Vec<NodeId>> {
        let mut out = Vec::new();
        for &c in &self.node(parent)?.children {
            if q.limit_reached(out.len()) {
                break;
            }
            let n = self.node(c)?;
            if q.matches(&n.name, n.data.as_ref()) {
                out.push(c);
            }
        }
        if out.is_empty() && q.not_found_is_err {
            return Err(Self::not_found(q, "children", parent));
        }
        Ok(out)
    }

    /// First matching direct child. Never errors; a dead parent yields None.
    pub fn get_first_child(&self, parent: NodeId, q: &Query) -> Option<NodeId> {
        let q = q.clone().max_count(1).not_found_is_err(false);
        self.get_children(parent, &q).ok()?.into_iter().next()
    }

    /// Depth-first preorder search below `parent` (the root itself is not a
    /// candidate). Direct children are at depth 1, so `max_depth(0)` matches
    /// nothing.
    pub fn get_descendants(&self, parent: NodeId, q: &Query) -> TreeResult<Vec<NodeId>> {
        if !q.has_filter() {
            return Err(TreeError::InvalidQuery(
                "get_descendants needs a name or class_type filter".into(),
            ));
        }
        let root = self.node(parent)?;
        let mut out = Vec::new();
        let within = |depth: usize| q.max_depth.map(|d| depth <= d).unwrap_or(true);
        let mut stack: Vec<(NodeId, usize)> = if within(1) {
            root.children.iter().rev().map(|&c| (c, 1)).collect()
        } else {
            Vec::new()
        };

        while let Some((id, depth)) = stack.pop() {
            if q.limit_reached(out.len()) {
                break;
            }
            let n = self.node(id)?;
            if q.matches(&n.name, n.data.as_ref()) {
                out.push(id);
            }
            if within(depth + 1) {
                stack.extend(n.children.iter().rev().map(|&c| (c, depth + 1)));
            }
        }

        if out.is_empty() && q.not_found_is_err {
            return Err(Self::not_found(q, "descendants", parent));
        }
        Ok(out)
    }

    /// Detach every matching direct child and return the detached ids.
    /// A filterless query detaches all children.
    pub fn delete_children(&mut self, parent: NodeId, q: &Query) -> TreeResult<Vec<NodeId>> {
        let victims = self.get_children(parent, q)?;
        for &v in &victims {
            self.detach(v)?;
        }
        Ok(victims)
    }

    /// "/name/name/..." from the top of the node's tree.
    pub fn path(&self, id: NodeId) -> TreeResult<String> {
        let mut names = Vec::new();
        let mut cur = Some(id);
        while let Some(c) = cur {
            let n = self.node(c)?;
            names.push(n.name.as_str());
            cur = n.parent;
        }
        names.reverse();
        Ok(format!("/{}", names.join("/")))
    }

    /// Deep-copy the subtree rooted at `id` into `dst`; returns the detached copy.
    pub fn copy_subtree(&self, id: NodeId, dst: &mut ObjectTree) -> TreeResult<NodeId> {
        let n = self.node(id)?;
        let copy = dst.new_boxed(n.name.clone(), n.data.clone_object());
        let mut kids = Vec::with_capacity(n.children.len());
        for &c in &n.children {
            kids.push(self.copy_subtree(c, dst)?);
        }
        dst.insert_children(copy, &kids, None)?;
        Ok(copy)
    }

    /// Indented "name [Class]" listing, one node per line.
    pub fn render(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.render_into(id, 0, &mut out);
        out
    }

    fn render_into(&self, id: NodeId, depth: usize, out: &mut String) {
        if let Ok(n) = self.node(id) {
            out.push_str(&format!(
                "{}{} [{}]\n",
                "  ".repeat(depth),
                n.name,
                n.data.class_name()
            ));
            for &c in &n.children {
                self.render_into(c, depth + 1, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Disk;
    impl DataObject for Disk {}

    #[derive(Debug, Clone)]
    struct Partition(u32);
    impl DataObject for Partition {}

    fn names(t: &ObjectTree, ids: &[NodeId]) -> Vec<String> {
        ids.iter().map(|&i| t.name(i).unwrap().to_string()).collect()
    }

    #[test]
    fn sibling_order_is_preserved() {
        let mut t = ObjectTree::new();
        let root = t.new_node("root", Disk);
        let a = t.new_node("a", Disk);
        let b = t.new_node("b", Disk);
        let c = t.new_node("c", Disk);
        t.insert_children(root, &[a, b, c], None).unwrap();
        let kids = t.get_children(root, &Query::new()).unwrap();
        assert_eq!(names(&t, &kids), vec!["a", "b", "c"]);
    }

    #[test]
    fn insert_before_places_nodes_in_call_order() {
        let mut t = ObjectTree::new();
        let root = t.new_node("root", Disk);
        let a = t.new_node("a", Disk);
        let d = t.new_node("d", Disk);
        t.insert_children(root, &[a, d], None).unwrap();
        let b = t.new_node("b", Disk);
        let c = t.new_node("c", Disk);
        t.insert_children(root, &[b, c], Some(d)).unwrap();
        assert_eq!(names(&t, t.children(root).unwrap()), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn insert_refuses_owned_node_and_cycles() {
        let mut t = ObjectTree::new();
        let root = t.new_node("root", Disk);
        let child = t.new_node("child", Disk);
        let other = t.new_node("other", Disk);
        t.insert_children(root, &[child], None).unwrap();

        let err = t.insert_children(other, &[child], None).unwrap_err();
        assert!(matches!(err, TreeError::Ownership { .. }));

        let err = t.insert_children(child, &[root], None).unwrap_err();
        assert!(matches!(err, TreeError::Cycle { .. }));

        let err = t.insert_children(other, &[other], None).unwrap_err();
        assert!(matches!(err, TreeError::Cycle { .. }));

        // Nothing partially attached.
        let x = t.new_node("x", Disk);
        assert!(t.insert_children(other, &[x, child], None).is_err());
        assert_eq!(t.parent(x).unwrap(), None);
        assert!(t.children(other).unwrap().is_empty());
    }

    #[test]
    fn detach_then_reinsert_elsewhere() {
        let mut t = ObjectTree::new();
        let r1 = t.new_node("r1", Disk);
        let r2 = t.new_node("r2", Disk);
        let n = t.new_node("n", Partition(1));
        t.insert_children(r1, &[n], None).unwrap();
        t.detach(n).unwrap();
        t.insert_children(r2, &[n], None).unwrap();
        assert_eq!(t.parent(n).unwrap(), Some(r2));
        assert!(t.children(r1).unwrap().is_empty());
    }

    #[test]
    fn filters_are_anded_and_not_found_is_configurable() {
        let mut t = ObjectTree::new();
        let root = t.new_node("root", Disk);
        let p1 = t.new_node("s0", Partition(0));
        let d1 = t.new_node("s0", Disk);
        let p2 = t.new_node("s1", Partition(1));
        t.insert_children(root, &[p1, d1, p2], None).unwrap();

        let q = Query::new().named("s0").of_type::<Partition>();
        assert_eq!(t.get_children(root, &q).unwrap(), vec![p1]);

        let q = Query::new().named("s9");
        assert!(matches!(t.get_children(root, &q), Err(TreeError::NotFound(_))));
        let q = q.not_found_is_err(false);
        assert!(t.get_children(root, &q).unwrap().is_empty());

        let q = Query::new().of_type::<Partition>().max_count(1);
        assert_eq!(t.get_children(root, &q).unwrap(), vec![p1]);

        assert_eq!(t.get_first_child(root, &Query::new().of_type::<Disk>()), Some(d1));
        assert_eq!(t.get_first_child(root, &Query::new().named("zz")), None);
        assert_eq!(t.get::<Partition>(p2).map(|p| p.0), Some(1));
    }

    #[test]
    fn descendants_preorder_depth_and_count() {
        // root
        //   a (P)
        //     b (P)
        //       c (P)
        //   d (P)
        let mut t = ObjectTree::new();
        let root = t.new_node("root", Disk);
        let a = t.new_node("a", Partition(1));
        let b = t.new_node("b", Partition(2));
        let c = t.new_node("c", Partition(3));
        let d = t.new_node("d", Partition(4));
        t.insert_children(root, &[a, d], None).unwrap();
        t.insert_children(a, &[b], None).unwrap();
        t.insert_children(b, &[c], None).unwrap();

        let all = t
            .get_descendants(root, &Query::new().of_type::<Partition>())
            .unwrap();
        assert_eq!(all, vec![a, b, c, d]);

        let shallow = t
            .get_descendants(root, &Query::new().of_type::<Partition>().max_depth(2))
            .unwrap();
        assert_eq!(shallow, vec![a, b, d]);

        let two = t
            .get_descendants(root, &Query::new().of_type::<Partition>().max_count(2))
            .unwrap();
        assert_eq!(two, vec![a, b]);

        assert!(matches!(
            t.get_descendants(root, &Query::new()),
            Err(TreeError::InvalidQuery(_))
        ));
    }

    #[test]
    fn delete_children_detaches_but_keeps_subtree() {
        let mut t = ObjectTree::new();
        let root = t.new_node("root", Disk);
        let a = t.new_node("a", Disk);
        let a1 = t.new_node("a1", Partition(0));
        let b = t.new_node("b", Disk);
        t.insert_children(root, &[a, b], None).unwrap();
        t.insert_children(a, &[a1], None).unwrap();

        let gone = t.delete_children(root, &Query::new().named("a")).unwrap();
        assert_eq!(gone, vec![a]);
        assert_eq!(t.parent(a).unwrap(), None);
        assert_eq!(t.children(a).unwrap(), &[a1]);
        assert_eq!(names(&t, t.children(root).unwrap()), vec!["b"]);

        let empty = t
            .delete_children(root, &Query::new().named("a").not_found_is_err(false))
            .unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn purge_frees_slots_for_reuse() {
        let mut t = ObjectTree::new();
        let root = t.new_node("root", Disk);
        let a = t.new_node("a", Disk);
        let b = t.new_node("b", Disk);
        t.insert_children(root, &[a], None).unwrap();
        t.insert_children(a, &[b], None).unwrap();
        t.purge(a).unwrap();
        assert!(!t.contains(a));
        assert!(!t.contains(b));
        assert_eq!(t.len(), 1);
        let c = t.new_node("c", Disk);
        assert!(c == a || c == b);
    }

    #[test]
    fn path_and_copy_subtree() {
        let mut t = ObjectTree::new();
        let root = t.new_node("persistent", Disk);
        let a = t.new_node("target", Disk);
        let b = t.new_node("disk0", Partition(7));
        t.insert_children(root, &[a], None).unwrap();
        t.insert_children(a, &[b], None).unwrap();
        assert_eq!(t.path(b).unwrap(), "/persistent/target/disk0");

        let mut other = ObjectTree::new();
        let copy = t.copy_subtree(a, &mut other).unwrap();
        assert_eq!(other.len(), 2);
        let kid = other.children(copy).unwrap()[0];
        assert_eq!(other.get::<Partition>(kid).map(|p| p.0), Some(7));
        assert!(t.render(root).contains("  target [Disk]"));
    }
}
