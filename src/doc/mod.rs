//! doc: the Data Object Cache (DOC): a typed, hierarchical object store
//! shared by every checkpoint of a run.
//!
//! Layout:
//! - object.rs  : DataObject trait (the node payload / "variant") and ClassType.
//! - tree.rs    : ObjectTree arena: nodes keyed by NodeId, parent/child links.
//! - query.rs   : Query filters (name, class type, depth, count, not_found_is_err).
//! - xml.rs     : generic parsed Element plus quick-xml read/write.
//! - registry.rs: ordered XML dispatch table (first can_handle wins).
//! - objects.rs : built-in variants (Manifest, Execution, CheckpointSpec, ...).
//! - cache.rs   : DataObjectCache: volatile/persistent roots, import/export, images.

mod object;
mod query;
mod tree;

pub mod cache;
pub mod objects;
pub mod registry;
pub mod xml;

pub use cache::{DataObjectCache, DocImage, Subtree};
pub use object::{ClassType, DataObject, ObjectAny};
pub use query::Query;
pub use registry::{XmlCodec, XmlHandler, XmlRegistry};
pub use tree::{NodeId, ObjectTree};
pub use xml::Element;
