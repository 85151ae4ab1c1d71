//! Generic parsed XML element and quick-xml based read/write.
//!
//! The DOC never sees raw XML text: manifests are parsed once into an
//! `Element` tree, and object variants decode from / encode to `Element`.
//! Whitespace-only text is dropped; comments, declarations and processing
//! instructions are ignored.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::XmlError;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    pub tag: String,
    /// Attributes in document order.
    pub attrs: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new<S: Into<String>>(tag: S) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn with_attr<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Replace an existing attribute in place or append a new one.
    pub fn set_attr<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        let key = key.into();
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((key, value)),
        }
    }

    pub fn text_trimmed(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn find(&self, tag: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.tag == tag)
    }

    pub fn find_all<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.tag == tag)
    }
}

fn malformed<E: std::fmt::Display>(pos: usize, e: E) -> XmlError {
    XmlError::Malformed(format!("at byte {}: {}", pos, e))
}

fn write_err<E: std::fmt::Display>(e: E) -> XmlError {
    XmlError::Write(e.to_string())
}

fn start_element(e: &BytesStart<'_>, pos: usize) -> Result<Element, XmlError> {
    let mut el = Element::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes() {
        let a = attr.map_err(|err| malformed(pos, err))?;
        let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
        let value = a.unescape_value().map_err(|err| malformed(pos, err))?;
        el.attrs.push((key, value.into_owned()));
    }
    Ok(el)
}

fn append_text(stack: &mut [Element], txt: &str) {
    if let Some(top) = stack.last_mut() {
        match &mut top.text {
            Some(t) => t.push_str(txt),
            None => top.text = Some(txt.to_string()),
        }
    }
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element, pos: usize) -> Result<(), XmlError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(el);
        return Ok(());
    }
    if root.is_some() {
        return Err(malformed(pos, format!("second root element <{}>", el.tag)));
    }
    *root = Some(el);
    Ok(())
}

/// Parse a whole document into its root element.
pub fn parse_str(s: &str) -> Result<Element, XmlError> {
    let mut reader = Reader::from_str(s);
    reader.trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let pos = reader.buffer_position();
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(start_element(&e, pos)?),
            Ok(Event::Empty(e)) => {
                let el = start_element(&e, pos)?;
                attach(&mut stack, &mut root, el, pos)?;
            }
            Ok(Event::End(_)) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| malformed(pos, "unexpected closing tag"))?;
                attach(&mut stack, &mut root, el, pos)?;
            }
            Ok(Event::Text(t)) => {
                let txt = t.unescape().map_err(|e| malformed(pos, e))?;
                append_text(&mut stack, &txt);
            }
            Ok(Event::CData(c)) => {
                let txt = String::from_utf8_lossy(&c).into_owned();
                append_text(&mut stack, &txt);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(malformed(pos, e)),
        }
    }

    if let Some(open) = stack.last() {
        return Err(XmlError::Malformed(format!("unclosed element <{}>", open.tag)));
    }
    root.ok_or(XmlError::Empty)
}

/// Serialize with two-space indentation (no XML declaration).
pub fn to_string_pretty(el: &Element) -> Result<String, XmlError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    write_element(&mut writer, el)?;
    String::from_utf8(writer.into_inner()).map_err(write_err)
}

fn write_element(w: &mut Writer<Vec<u8>>, el: &Element) -> Result<(), XmlError> {
    let mut start = BytesStart::new(el.tag.as_str());
    for (k, v) in &el.attrs {
        start.push_attribute((k.as_str(), v.as_str()));
    }
    if el.children.is_empty() && el.text.is_none() {
        w.write_event(Event::Empty(start)).map_err(write_err)?;
        return Ok(());
    }
    w.write_event(Event::Start(start)).map_err(write_err)?;
    if let Some(t) = &el.text {
        w.write_event(Event::Text(BytesText::new(t))).map_err(write_err)?;
    }
    for c in &el.children {
        write_element(w, c)?;
    }
    w.write_event(Event::End(BytesEnd::new(el.tag.as_str())))
        .map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_nested_document() {
        let doc = r#"<?xml version="1.0"?>
            <!-- build manifest -->
            <manifest name="demo">
              <software name="base" type="ips">
                <pkg>shell &amp; tools</pkg>
                <pkg><![CDATA[<raw>]]></pkg>
              </software>
              <property name="locale" value="C"/>
            </manifest>"#;
        let root = parse_str(doc).unwrap();
        assert_eq!(root.tag, "manifest");
        assert_eq!(root.attr("name"), Some("demo"));
        assert_eq!(root.children.len(), 2);
        let sw = root.find("software").unwrap();
        let pkgs: Vec<_> = sw.find_all("pkg").map(|p| p.text_trimmed().unwrap()).collect();
        assert_eq!(pkgs, vec!["shell & tools", "<raw>"]);
        assert_eq!(root.find("property").unwrap().attr("value"), Some("C"));
    }

    #[test]
    fn malformed_and_empty_documents() {
        assert!(matches!(parse_str("<a><b></a>"), Err(XmlError::Malformed(_))));
        assert!(matches!(parse_str("<a>"), Err(XmlError::Malformed(_))));
        assert!(matches!(parse_str("<a/><b/>"), Err(XmlError::Malformed(_))));
        assert!(matches!(parse_str("  "), Err(XmlError::Empty)));
    }

    #[test]
    fn write_then_parse_preserves_structure() {
        let el = Element::new("checkpoint")
            .with_attr("name", "a<b")
            .with_child(Element::new("arg").with_text("--force"))
            .with_child(Element::new("kwarg").with_attr("name", "k").with_text("v & w"));
        let s = to_string_pretty(&el).unwrap();
        assert!(s.contains("a&lt;b"));
        assert_eq!(parse_str(&s).unwrap(), el);
    }
}
