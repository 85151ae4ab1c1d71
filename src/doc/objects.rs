//! Built-in DOC variants.
//!
//! Manifest-backed variants (`Manifest`, `Execution`, `CheckpointSpec`,
//! `Software`, `Property`) decode from and re-emit to XML. `ApplicationInfo`
//! and `CacheRoot` are runtime state and never appear in a manifest.

use std::path::PathBuf;

use crate::error::ParsingError;

use super::object::DataObject;
use super::registry::XmlCodec;
use super::xml::Element;

fn parse_bool(el: &Element, attr: &str, default: bool) -> Result<bool, ParsingError> {
    match el.attr(attr).map(|s| s.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(s) => match s.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ParsingError::new(
                &el.tag,
                "",
                format!("attribute {}='{}' is not a boolean", attr, other),
            )),
        },
    }
}

fn required_attr<'a>(el: &'a Element, attr: &str) -> Result<&'a str, ParsingError> {
    el.attr(attr)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ParsingError::new(&el.tag, "", format!("missing attribute '{}'", attr)))
}

/// `name` attribute for re-emitted elements; omitted when the node was
/// named after its tag, which is what `node_name` falls back to.
fn with_node_name(el: Element, name: &str) -> Element {
    if name == el.tag {
        el
    } else {
        el.with_attr("name", name)
    }
}

/// Top-level `<manifest name="...">`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Manifest;

impl DataObject for Manifest {
    fn to_xml(&self, name: &str) -> Option<Element> {
        Some(with_node_name(Element::new("manifest"), name))
    }
}

impl XmlCodec for Manifest {
    fn can_handle(element: &Element) -> bool {
        element.tag == "manifest"
    }

    fn from_xml(_element: &Element) -> Result<Self, ParsingError> {
        Ok(Manifest)
    }
}

/// `<execution stop_on_error="true">`: holds the ordered checkpoint list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub stop_on_error: bool,
}

impl Default for Execution {
    fn default() -> Self {
        Self { stop_on_error: true }
    }
}

impl DataObject for Execution {
    fn to_xml(&self, name: &str) -> Option<Element> {
        Some(
            with_node_name(Element::new("execution"), name)
                .with_attr("stop_on_error", self.stop_on_error.to_string()),
        )
    }
}

impl XmlCodec for Execution {
    fn can_handle(element: &Element) -> bool {
        element.tag == "execution"
    }

    fn from_xml(element: &Element) -> Result<Self, ParsingError> {
        Ok(Self {
            stop_on_error: parse_bool(element, "stop_on_error", true)?,
        })
    }
}

/// One checkpoint to register:
///
/// ```xml
/// <checkpoint name="transfer" mod_path="shell" loglevel="debug" description="..." boundary="true">
///   <arg>cp</arg>
///   <kwarg name="seconds">2</kwarg>
/// </checkpoint>
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CheckpointSpec {
    pub mod_path: String,
    pub loglevel: Option<String>,
    pub description: Option<String>,
    pub boundary: bool,
    pub args: Vec<String>,
    pub kwargs: Vec<(String, String)>,
}

impl DataObject for CheckpointSpec {
    fn to_xml(&self, name: &str) -> Option<Element> {
        let mut el = Element::new("checkpoint")
            .with_attr("name", name)
            .with_attr("mod_path", self.mod_path.as_str());
        if let Some(l) = &self.loglevel {
            el.set_attr("loglevel", l.as_str());
        }
        if let Some(d) = &self.description {
            el.set_attr("description", d.as_str());
        }
        if self.boundary {
            el.set_attr("boundary", "true");
        }
        for a in &self.args {
            el.children.push(Element::new("arg").with_text(a.as_str()));
        }
        for (k, v) in &self.kwargs {
            el.children
                .push(Element::new("kwarg").with_attr("name", k.as_str()).with_text(v.as_str()));
        }
        Some(el)
    }
}

impl XmlCodec for CheckpointSpec {
    fn can_handle(element: &Element) -> bool {
        element.tag == "checkpoint"
    }

    fn from_xml(element: &Element) -> Result<Self, ParsingError> {
        required_attr(element, "name")?;
        let mut spec = CheckpointSpec {
            mod_path: required_attr(element, "mod_path")?.to_string(),
            loglevel: element.attr("loglevel").map(str::to_string),
            description: element.attr("description").map(str::to_string),
            boundary: parse_bool(element, "boundary", false)?,
            ..Default::default()
        };
        for child in &element.children {
            match child.tag.as_str() {
                "arg" => spec.args.push(child.text.clone().unwrap_or_default()),
                "kwarg" => {
                    let k = required_attr(child, "name")?;
                    spec.kwargs
                        .push((k.to_string(), child.text.clone().unwrap_or_default()));
                }
                other => {
                    return Err(ParsingError::new(
                        other,
                        "",
                        "only <arg> and <kwarg> are allowed inside <checkpoint>",
                    ))
                }
            }
        }
        Ok(spec)
    }

    fn consumes_children() -> bool {
        true
    }
}

/// `<software name="..." type="...">` with `<pkg>` entries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Software {
    pub kind: Option<String>,
    pub packages: Vec<String>,
}

impl DataObject for Software {
    fn to_xml(&self, name: &str) -> Option<Element> {
        let mut el = Element::new("software").with_attr("name", name);
        if let Some(k) = &self.kind {
            el.set_attr("type", k.as_str());
        }
        for p in &self.packages {
            el.children.push(Element::new("pkg").with_text(p.as_str()));
        }
        Some(el)
    }
}

impl XmlCodec for Software {
    fn can_handle(element: &Element) -> bool {
        element.tag == "software"
    }

    fn from_xml(element: &Element) -> Result<Self, ParsingError> {
        let mut sw = Software {
            kind: element.attr("type").map(str::to_string),
            packages: Vec::new(),
        };
        for child in &element.children {
            if child.tag != "pkg" {
                return Err(ParsingError::new(
                    &child.tag,
                    "",
                    "only <pkg> is allowed inside <software>",
                ));
            }
            if let Some(p) = child.text_trimmed() {
                sw.packages.push(p.to_string());
            }
        }
        Ok(sw)
    }

    fn consumes_children() -> bool {
        true
    }
}

/// `<property name="k" value="v"/>`; the value may also be given as text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Property {
    pub value: String,
}

impl Property {
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self { value: value.into() }
    }
}

impl DataObject for Property {
    fn to_xml(&self, name: &str) -> Option<Element> {
        Some(
            Element::new("property")
                .with_attr("name", name)
                .with_attr("value", self.value.as_str()),
        )
    }
}

impl XmlCodec for Property {
    fn can_handle(element: &Element) -> bool {
        element.tag == "property"
    }

    fn from_xml(element: &Element) -> Result<Self, ParsingError> {
        required_attr(element, "name")?;
        let value = match element.attr("value") {
            Some(v) => v.to_string(),
            None => element.text_trimmed().unwrap_or_default().to_string(),
        };
        Ok(Property { value })
    }
}

/// Run-scoped application metadata kept in the persistent subtree.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApplicationInfo {
    pub app: String,
    pub version: String,
    pub dataset: Option<PathBuf>,
    pub started_nanos: u128,
    pub runs: u64,
}

impl DataObject for ApplicationInfo {}

/// Payload of the two DOC roots.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CacheRoot;

impl DataObject for CacheRoot {}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: XmlCodec>(el: &Element) -> Element {
        let obj = T::from_xml(el).unwrap();
        obj.to_xml(&T::node_name(el)).unwrap()
    }

    #[test]
    fn checkpoint_spec_roundtrip() {
        let el = Element::new("checkpoint")
            .with_attr("name", "transfer")
            .with_attr("mod_path", "shell")
            .with_attr("loglevel", "debug")
            .with_attr("description", "copy payload")
            .with_attr("boundary", "true")
            .with_child(Element::new("arg").with_text("cp"))
            .with_child(Element::new("kwarg").with_attr("name", "retries").with_text("2"));
        assert_eq!(roundtrip::<CheckpointSpec>(&el), el);
    }

    #[test]
    fn software_and_property_roundtrip() {
        let sw = Element::new("software")
            .with_attr("name", "base")
            .with_attr("type", "ips")
            .with_child(Element::new("pkg").with_text("core"))
            .with_child(Element::new("pkg").with_text("shell"));
        assert_eq!(roundtrip::<Software>(&sw), sw);

        let p = Element::new("property").with_attr("name", "k").with_attr("value", "v");
        assert_eq!(roundtrip::<Property>(&p), p);

        let e = Element::new("execution").with_attr("stop_on_error", "false");
        assert_eq!(roundtrip::<Execution>(&e), e);
    }

    #[test]
    fn name_attribute_survives_only_when_given() {
        let e = Element::new("execution")
            .with_attr("name", "main")
            .with_attr("stop_on_error", "true");
        assert_eq!(roundtrip::<Execution>(&e), e);

        let m = Element::new("manifest");
        assert_eq!(roundtrip::<Manifest>(&m), m);
        let m = Element::new("manifest").with_attr("name", "site");
        assert_eq!(roundtrip::<Manifest>(&m), m);
    }

    #[test]
    fn runtime_variants_never_emit_xml() {
        assert!(ApplicationInfo::default().to_xml("app").is_none());
        assert!(CacheRoot.to_xml("persistent").is_none());
    }

    #[test]
    fn checkpoint_spec_requires_name_and_mod_path() {
        let el = Element::new("checkpoint").with_attr("name", "x");
        let err = CheckpointSpec::from_xml(&el).unwrap_err();
        assert!(err.reason.contains("mod_path"));

        let el = Element::new("checkpoint")
            .with_attr("name", "x")
            .with_attr("mod_path", "noop")
            .with_child(Element::new("disk"));
        assert!(CheckpointSpec::from_xml(&el).is_err());
    }

    #[test]
    fn bad_boolean_is_rejected() {
        let el = Element::new("execution").with_attr("stop_on_error", "maybe");
        assert!(Execution::from_xml(&el).is_err());
    }
}
