use super::object::{ClassType, DataObject};

/// Filter set shared by every tree query.
///
/// `name` and `class_type` are ANDed. `max_depth` only applies to
/// descendant searches. An empty result is an error unless
/// `not_found_is_err(false)` is set.
#[derive(Debug, Clone)]
pub struct Query {
    pub name: Option<String>,
    pub class_type: Option<ClassType>,
    pub max_depth: Option<usize>,
    pub max_count: Option<usize>,
    pub not_found_is_err: bool,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            name: None,
            class_type: None,
            max_depth: None,
            max_count: None,
            not_found_is_err: true,
        }
    }
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn of_type<T: DataObject>(mut self) -> Self {
        self.class_type = Some(ClassType::of::<T>());
        self
    }

    pub fn class(mut self, ct: ClassType) -> Self {
        self.class_type = Some(ct);
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn max_count(mut self, count: usize) -> Self {
        self.max_count = Some(count);
        self
    }

    pub fn not_found_is_err(mut self, on: bool) -> Self {
        self.not_found_is_err = on;
        self
    }

    pub(crate) fn has_filter(&self) -> bool {
        self.name.is_some() || self.class_type.is_some()
    }

    pub(crate) fn matches(&self, name: &str, obj: &dyn DataObject) -> bool {
        if let Some(n) = &self.name {
            if n != name {
                return false;
            }
        }
        if let Some(ct) = &self.class_type {
            if !ct.matches(obj) {
                return false;
            }
        }
        true
    }

    pub(crate) fn limit_reached(&self, found: usize) -> bool {
        self.max_count.map(|m| found >= m).unwrap_or(false)
    }

    pub(crate) fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(n) = &self.name {
            parts.push(format!("name='{}'", n));
        }
        if let Some(ct) = &self.class_type {
            parts.push(format!("class_type={}", ct.name()));
        }
        if let Some(d) = self.max_depth {
            parts.push(format!("max_depth={}", d));
        }
        if parts.is_empty() {
            "any".to_string()
        } else {
            parts.join(", ")
        }
    }
}
