use std::any::{Any, TypeId};
use std::fmt;

use super::xml::Element;

/// Payload of a DOC node. The concrete Rust type is the node's class type.
///
/// Variants that can be re-emitted into a manifest return `Some` from
/// `to_xml`; purely runtime state keeps the default `None` and is never
/// written out.
pub trait DataObject: ObjectAny + fmt::Debug + Send {
    /// Element for this node alone; the cache appends the node's children.
    fn to_xml(&self, _name: &str) -> Option<Element> {
        None
    }
}

/// Type plumbing implemented for every `DataObject + Clone`.
pub trait ObjectAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn clone_object(&self) -> Box<dyn DataObject>;
    fn class_name(&self) -> &'static str;
}

impl<T: DataObject + Clone> ObjectAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_object(&self) -> Box<dyn DataObject> {
        Box::new(self.clone())
    }

    fn class_name(&self) -> &'static str {
        short_type_name::<T>()
    }
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

/// Class-type filter for queries: `ClassType::of::<Software>()`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassType {
    id: TypeId,
    name: &'static str,
}

impl ClassType {
    pub fn of<T: DataObject>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: short_type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn matches(&self, obj: &dyn DataObject) -> bool {
        obj.as_any().type_id() == self.id
    }
}

impl fmt::Debug for ClassType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassType({})", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Disk;
    impl DataObject for Disk {}

    #[derive(Debug, Clone)]
    struct Slice;
    impl DataObject for Slice {}

    #[test]
    fn class_type_matches_only_its_type() {
        let d: Box<dyn DataObject> = Box::new(Disk);
        assert!(ClassType::of::<Disk>().matches(d.as_ref()));
        assert!(!ClassType::of::<Slice>().matches(d.as_ref()));
        assert_eq!(d.class_name(), "Disk");
        assert_eq!(ClassType::of::<Slice>().name(), "Slice");
    }
}
