//! XML dispatch: an ordered table of (predicate, decoder) pairs.
//!
//! For every element the table is walked in registration order and the
//! first variant whose `can_handle` accepts the element decodes it. Order
//! matters when predicates overlap and is kept exactly as registered.
//! Unless the winning variant consumes its child elements, decoding recurses
//! and the document nesting becomes parent/child links in the tree.

use crate::error::{ParsingError, XmlError};
use crate::metrics::record_xml_element_decoded;

use super::object::DataObject;
use super::objects::{CheckpointSpec, Execution, Manifest, Property, Software};
use super::tree::{NodeId, ObjectTree};
use super::xml::Element;

/// Decoding half of a variant's XML contract (`to_xml` lives on `DataObject`).
pub trait XmlCodec: DataObject + Sized {
    fn can_handle(element: &Element) -> bool;

    fn from_xml(element: &Element) -> Result<Self, ParsingError>;

    /// True if `from_xml` already absorbed the child elements.
    fn consumes_children() -> bool {
        false
    }

    /// Node name for a decoded element: the `name` attribute, else the tag.
    fn node_name(element: &Element) -> String {
        element.attr("name").unwrap_or(&element.tag).to_string()
    }
}

type DecodeFn = fn(&Element) -> Result<(String, Box<dyn DataObject>), ParsingError>;

#[derive(Clone)]
pub struct XmlHandler {
    pub class_name: &'static str,
    pub can_handle: fn(&Element) -> bool,
    decode: DecodeFn,
    pub consumes_children: bool,
}

impl std::fmt::Debug for XmlHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlHandler")
            .field("class_name", &self.class_name)
            .field("consumes_children", &self.consumes_children)
            .finish()
    }
}

fn decode_as<T: XmlCodec>(el: &Element) -> Result<(String, Box<dyn DataObject>), ParsingError> {
    let obj = T::from_xml(el)?;
    Ok((T::node_name(el), Box::new(obj)))
}

fn class_name_of<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

#[derive(Debug, Clone, Default)]
pub struct XmlRegistry {
    handlers: Vec<XmlHandler>,
}

impl XmlRegistry {
    /// Empty table: every element is rejected until variants are registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the built-in manifest variants, in dispatch order.
    pub fn with_builtin() -> Self {
        let mut r = Self::new();
        r.register::<Manifest>();
        r.register::<Execution>();
        r.register::<CheckpointSpec>();
        r.register::<Software>();
        r.register::<Property>();
        r
    }

    /// Append a variant at the end of the dispatch order. Registering the same
    /// class twice keeps the first position.
    pub fn register<T: XmlCodec>(&mut self) -> &mut Self {
        let name = class_name_of::<T>();
        if !self.handlers.iter().any(|h| h.class_name == name) {
            self.handlers.push(Self::handler::<T>());
        }
        self
    }

    /// Put a variant ahead of everything already registered.
    pub fn register_first<T: XmlCodec>(&mut self) -> &mut Self {
        let name = class_name_of::<T>();
        self.handlers.retain(|h| h.class_name != name);
        self.handlers.insert(0, Self::handler::<T>());
        self
    }

    fn handler<T: XmlCodec>() -> XmlHandler {
        XmlHandler {
            class_name: class_name_of::<T>(),
            can_handle: T::can_handle,
            decode: decode_as::<T>,
            consumes_children: T::consumes_children(),
        }
    }

    pub fn class_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.class_name).collect()
    }

    pub fn find(&self, element: &Element) -> Option<&XmlHandler> {
        self.handlers.iter().find(|h| (h.can_handle)(element))
    }

    /// Decode `element` and everything below it into detached nodes of
    /// `tree`; returns the new subtree root. On error nothing is left behind.
    pub fn decode_tree(
        &self,
        element: &Element,
        tree: &mut ObjectTree,
        parent_path: &str,
    ) -> Result<NodeId, XmlError> {
        let path = format!("{}/{}", parent_path, element.tag);
        let handler = self.find(element).ok_or_else(|| {
            ParsingError::new(&element.tag, &path, "no registered object type handles this element")
        })?;
        let (name, obj) = (handler.decode)(element).map_err(|mut e| {
            if e.path.is_empty() {
                // A rejected child absorbed by this variant names itself.
                e.path = if e.tag == element.tag {
                    path.clone()
                } else {
                    format!("{}/{}", path, e.tag)
                };
            }
            e
        })?;
        record_xml_element_decoded();
        let id = tree.new_boxed(name, obj);
        if handler.consumes_children {
            return Ok(id);
        }

        let mut kids = Vec::with_capacity(element.children.len());
        for child in &element.children {
            match self.decode_tree(child, tree, &path) {
                Ok(k) => kids.push(k),
                Err(e) => {
                    for k in kids {
                        let _ = tree.purge(k);
                    }
                    let _ = tree.purge(id);
                    return Err(e);
                }
            }
        }
        tree.insert_children(id, &kids, None)?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::Query;

    /// Claims every element; used to show first-match ordering.
    #[derive(Debug, Clone)]
    struct CatchAll(String);

    impl DataObject for CatchAll {}

    impl XmlCodec for CatchAll {
        fn can_handle(_element: &Element) -> bool {
            true
        }
        fn from_xml(element: &Element) -> Result<Self, ParsingError> {
            Ok(CatchAll(element.tag.clone()))
        }
    }

    #[test]
    fn unknown_element_is_a_parsing_error() {
        let reg = XmlRegistry::with_builtin();
        let mut tree = ObjectTree::new();
        let el = Element::new("manifest").with_child(Element::new("disk"));
        let err = reg.decode_tree(&el, &mut tree, "").unwrap_err();
        match err {
            XmlError::Parsing(p) => {
                assert_eq!(p.tag, "disk");
                assert_eq!(p.path, "/manifest/disk");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(tree.is_empty(), "failed import must not leave nodes behind");
    }

    #[test]
    fn rejected_absorbed_child_is_named_in_the_path() {
        let reg = XmlRegistry::with_builtin();
        let mut tree = ObjectTree::new();
        let el = Element::new("manifest").with_child(
            Element::new("checkpoint")
                .with_attr("name", "a")
                .with_attr("mod_path", "noop")
                .with_child(Element::new("disk")),
        );
        match reg.decode_tree(&el, &mut tree, "").unwrap_err() {
            XmlError::Parsing(p) => {
                assert_eq!(p.tag, "disk");
                assert_eq!(p.path, "/manifest/checkpoint/disk");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let el = Element::new("checkpoint").with_attr("name", "a");
        match reg.decode_tree(&el, &mut tree, "").unwrap_err() {
            XmlError::Parsing(p) => assert_eq!(p.path, "/checkpoint"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn first_matching_variant_wins() {
        let el = Element::new("property").with_attr("name", "k").with_attr("value", "v");

        let mut reg = XmlRegistry::with_builtin();
        reg.register::<CatchAll>();
        let mut tree = ObjectTree::new();
        let id = reg.decode_tree(&el, &mut tree, "").unwrap();
        assert!(tree.get::<Property>(id).is_some());

        reg.register_first::<CatchAll>();
        assert_eq!(reg.class_names()[0], "CatchAll");
        let id = reg.decode_tree(&el, &mut tree, "").unwrap();
        assert!(tree.get::<CatchAll>(id).is_some());
    }

    #[test]
    fn nesting_becomes_parent_child_links() {
        let el = Element::new("manifest")
            .with_attr("name", "m")
            .with_child(Element::new("property").with_attr("name", "a").with_attr("value", "1"))
            .with_child(
                Element::new("software")
                    .with_attr("name", "base")
                    .with_child(Element::new("pkg").with_text("core")),
            );
        let reg = XmlRegistry::with_builtin();
        let mut tree = ObjectTree::new();
        let root = reg.decode_tree(&el, &mut tree, "").unwrap();
        assert_eq!(tree.name(root).unwrap(), "m");
        let kids = tree.get_children(root, &Query::new()).unwrap();
        assert_eq!(kids.len(), 2);
        // <pkg> was absorbed by Software, not turned into a node.
        assert!(tree.children(kids[1]).unwrap().is_empty());
        assert_eq!(tree.get::<Software>(kids[1]).unwrap().packages, vec!["core"]);
    }
}
