//! Descriptive metadata documents.
//!
//! A small owned XML element tree (parsed and written with quick-xml), the
//! Dublin Core (`dcterms`) operations performed on the DIP's metadata
//! document, and wrapping of a metadata document into an Atom entry for
//! metadata-only deposits.

use crate::error::{DipError, Result};
use crate::timestamp::Timestamp;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::writer::Writer;
use std::io::Cursor;

/// Dublin Core terms namespace
pub const DCTERMS_NS: &str = "http://purl.org/dc/terms/";

/// Atom syndication namespace
pub const ATOM_NS: &str = "http://www.w3.org/2005/Atom";

/// Root element name of a freshly created metadata document.
pub const DEFAULT_ROOT: &str = "metadata";

const DCTERMS_PREFIX: &str = "dcterms";

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// An XML element with its attributes and children, in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) {
        match self.attributes.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value.to_string(),
            None => self.attributes.push((name.to_string(), value.to_string())),
        }
    }

    /// Child elements, skipping text.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// Concatenated direct text content.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|c| match c {
                XmlNode::Text(t) => Some(t.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }

    /// Parse a document and return its root element.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = quick_xml::Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    stack.push(element_from_start(e)?);
                }
                Ok(Event::Empty(ref e)) => {
                    let element = element_from_start(e)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::End(_)) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| DipError::Xml("unbalanced end tag".to_string()))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::Text(ref t)) => {
                    let text = t.unescape().map_err(|e| DipError::Xml(e.to_string()))?;
                    push_text(&mut stack, &text)?;
                }
                Ok(Event::CData(ref t)) => {
                    let text = String::from_utf8_lossy(t).into_owned();
                    push_text(&mut stack, &text)?;
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(DipError::Xml(e.to_string())),
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(DipError::Xml(format!(
                "unclosed element <{}>",
                stack[stack.len() - 1].name
            )));
        }
        root.ok_or_else(|| DipError::Xml("document has no root element".to_string()))
    }

    /// Serialize as a standalone document with an XML declaration.
    pub fn to_document(&self) -> Result<String> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(|e| DipError::Xml(e.to_string()))?;
        self.write_xml(&mut writer)?;
        String::from_utf8(writer.into_inner().into_inner())
            .map_err(|e| DipError::Xml(e.to_string()))
    }

    pub fn write_xml<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (k, v) in &self.attributes {
            start.push_attribute((k.as_str(), v.as_str()));
        }

        if self.children.is_empty() {
            return writer
                .write_event(Event::Empty(start))
                .map_err(|e| DipError::Xml(e.to_string()));
        }

        writer
            .write_event(Event::Start(start))
            .map_err(|e| DipError::Xml(e.to_string()))?;
        for child in &self.children {
            match child {
                XmlNode::Element(e) => e.write_xml(writer)?,
                XmlNode::Text(t) => writer
                    .write_event(Event::Text(BytesText::new(t)))
                    .map_err(|e| DipError::Xml(e.to_string()))?,
            }
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(|e| DipError::Xml(e.to_string()))
    }

    /// Resolve a namespace prefix (`None` for the default namespace) against
    /// this element's own declarations.
    fn declared_namespace(&self, prefix: Option<&str>) -> Option<&str> {
        match prefix {
            Some(p) => self.attribute(&format!("xmlns:{}", p)),
            None => self.attribute("xmlns"),
        }
    }
}

fn element_from_start(e: &BytesStart<'_>) -> Result<XmlElement> {
    let mut element = XmlElement::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes() {
        let attr = attr.map_err(|e| DipError::Xml(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| DipError::Xml(e.to_string()))?
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(element)),
        None => {
            if root.is_some() {
                return Err(DipError::Xml("multiple root elements".to_string()));
            }
            *root = Some(element);
        }
    }
    Ok(())
}

fn push_text(stack: &mut [XmlElement], text: &str) -> Result<()> {
    if text.is_empty() {
        return Ok(());
    }
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(XmlNode::Text(text.to_string()));
            Ok(())
        }
        None => Err(DipError::Xml("text outside the root element".to_string())),
    }
}

/// An empty metadata document: a root element with no children.
pub fn default_document() -> XmlElement {
    XmlElement::new(DEFAULT_ROOT)
}

// ─────────────────────────────────────────────────────
// Dublin Core
// ─────────────────────────────────────────────────────

/// One Dublin Core statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DcValue {
    pub term: String,
    pub value: String,
    pub lang: Option<String>,
}

/// Match criteria for Dublin Core statements; `None` matches anything.
#[derive(Debug, Clone, Default)]
pub struct DcFilter<'a> {
    pub term: Option<&'a str>,
    pub value: Option<&'a str>,
    pub lang: Option<&'a str>,
}

impl DcFilter<'_> {
    fn matches(&self, dc: &DcValue) -> bool {
        self.term.is_none_or(|t| t == dc.term)
            && self.value.is_none_or(|v| v == dc.value)
            && self.lang.is_none_or(|l| dc.lang.as_deref() == Some(l))
    }
}

/// Append a dcterms statement to the document root.
///
/// `term` becomes the local part of an element name and must be an XML
/// NCName; the document is left untouched when it is not.
pub fn add_dcterm(root: &mut XmlElement, term: &str, value: &str, lang: Option<&str>) -> Result<()> {
    if !is_ncname(term) {
        return Err(DipError::Xml(format!("{:?} is not a valid Dublin Core term", term)));
    }
    let ns_attr = format!("xmlns:{}", DCTERMS_PREFIX);
    let prefix = match dcterms_prefix(root) {
        Some(p) => p,
        None => {
            root.set_attribute(&ns_attr, DCTERMS_NS);
            DCTERMS_PREFIX.to_string()
        }
    };

    let mut element = XmlElement::new(format!("{}:{}", prefix, term)).with_text(value);
    if let Some(lang) = lang {
        element.set_attribute("xml:lang", lang);
    }
    root.children.push(XmlNode::Element(element));
    Ok(())
}

/// Non-colonised XML name.
fn is_ncname(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '-' | '.' | '_'))
}

/// Dublin Core statements of the document matching `filter`.
pub fn dcterms(root: &XmlElement, filter: &DcFilter<'_>) -> Vec<DcValue> {
    root.elements()
        .filter_map(|e| dc_value(root, e))
        .filter(|dc| filter.matches(dc))
        .collect()
}

/// Remove matching statements; returns how many were removed.
pub fn remove_dcterms(root: &mut XmlElement, filter: &DcFilter<'_>) -> usize {
    let before = root.children.len();
    let snapshot = root.clone();
    root.children.retain(|child| match child {
        XmlNode::Element(e) => match dc_value(&snapshot, e) {
            Some(dc) => !filter.matches(&dc),
            None => true,
        },
        XmlNode::Text(_) => true,
    });
    before - root.children.len()
}

/// The prefix bound to the dcterms namespace on the root, if any.
fn dcterms_prefix(root: &XmlElement) -> Option<String> {
    root.attributes.iter().find_map(|(k, v)| {
        k.strip_prefix("xmlns:")
            .filter(|_| v == DCTERMS_NS)
            .map(str::to_string)
    })
}

fn dc_value(root: &XmlElement, element: &XmlElement) -> Option<DcValue> {
    let (prefix, local) = match element.name.split_once(':') {
        Some((p, l)) => (Some(p), l),
        None => (None, element.name.as_str()),
    };
    let ns = element
        .declared_namespace(prefix)
        .or_else(|| root.declared_namespace(prefix))?;
    if ns != DCTERMS_NS {
        return None;
    }
    Some(DcValue {
        term: local.to_string(),
        value: element.text(),
        lang: element.attribute("xml:lang").map(str::to_string),
    })
}

// ─────────────────────────────────────────────────────
// Atom entry wrapping
// ─────────────────────────────────────────────────────

/// Wrap a metadata document in an Atom entry.
///
/// With `include_root` the whole document element is embedded; otherwise
/// only its children are, and the root's namespace declarations move to the
/// entry (or, for a default namespace, onto each child) so that the children
/// keep their meaning. Unprefixed elements outside any default namespace get
/// `xmlns=""` so they do not fall into the Atom namespace.
pub fn atom_entry(document: &XmlElement, include_root: bool, updated: Timestamp) -> XmlElement {
    let mut entry = XmlElement::new("entry")
        .with_attribute("xmlns", ATOM_NS)
        .with_child(XmlElement::new("updated").with_text(updated.to_string()));

    if include_root {
        let mut root = document.clone();
        undeclare_default_namespace(&mut root, false);
        entry.children.push(XmlNode::Element(root));
        return entry;
    }

    for (k, v) in &document.attributes {
        if k.starts_with("xmlns:") && entry.attribute(k).is_none() {
            entry.set_attribute(k, v);
        }
    }
    let default_ns = document.attribute("xmlns");
    for child in &document.children {
        match child {
            XmlNode::Element(e) => {
                let mut e = e.clone();
                match default_ns {
                    Some(ns) if e.attribute("xmlns").is_none() => e.set_attribute("xmlns", ns),
                    Some(_) => {}
                    None => undeclare_default_namespace(&mut e, false),
                }
                entry.children.push(XmlNode::Element(e));
            }
            XmlNode::Text(t) => entry.children.push(XmlNode::Text(t.clone())),
        }
    }
    entry
}

/// Give unprefixed elements with no default namespace in scope an explicit
/// empty one.
fn undeclare_default_namespace(element: &mut XmlElement, in_scope: bool) {
    let mut in_scope = in_scope || element.attribute("xmlns").is_some();
    if !in_scope && !element.name.contains(':') {
        element.set_attribute("xmlns", "");
        in_scope = true;
    }
    for child in &mut element.children {
        if let XmlNode::Element(e) = child {
            undeclare_default_namespace(e, in_scope);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_document_is_empty() {
        let doc = default_document();
        assert_eq!(doc.name, "metadata");
        assert_eq!(doc.elements().count(), 0);
        let xml = doc.to_document().unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<metadata/>"));
    }

    #[test]
    fn test_parse_nested_document() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<other xmlns:x="urn:x">
  <sub a="1">some &amp; text</sub>
  <x:empty/>
</other>"#;
        let root = XmlElement::parse(xml).unwrap();
        assert_eq!(root.name, "other");
        assert_eq!(root.attribute("xmlns:x"), Some("urn:x"));
        let children: Vec<_> = root.elements().collect();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].attribute("a"), Some("1"));
        assert_eq!(children[0].text(), "some & text");
        assert_eq!(children[1].name, "x:empty");
    }

    #[test]
    fn test_parse_rejects_non_xml() {
        assert!(XmlElement::parse("just some words").is_err());
        assert!(XmlElement::parse("").is_err());
        assert!(XmlElement::parse("<a><b></a>").is_err());
    }

    #[test]
    fn test_write_then_parse_preserves_escaping() {
        let doc = XmlElement::new("root").with_child(XmlElement::new("v").with_text("a < b & \"c\""));
        let xml = doc.to_document().unwrap();
        let back = XmlElement::parse(&xml).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_add_and_query_dcterms() {
        let mut doc = default_document();
        add_dcterm(&mut doc, "title", "A title", Some("en")).unwrap();
        add_dcterm(&mut doc, "title", "Titlen", Some("no")).unwrap();
        add_dcterm(&mut doc, "creator", "Richard", None).unwrap();

        assert_eq!(doc.attribute("xmlns:dcterms"), Some(DCTERMS_NS));
        assert_eq!(dcterms(&doc, &DcFilter::default()).len(), 3);

        let titles = dcterms(&doc, &DcFilter { term: Some("title"), ..Default::default() });
        assert_eq!(titles.len(), 2);

        let norwegian = dcterms(&doc, &DcFilter { lang: Some("no"), ..Default::default() });
        assert_eq!(norwegian, vec![DcValue {
            term: "title".into(),
            value: "Titlen".into(),
            lang: Some("no".into()),
        }]);
    }

    #[test]
    fn test_add_dcterm_rejects_invalid_term() {
        let mut doc = default_document();
        for term in ["date issued", "", "1st", "dc:title", "a<b"] {
            let err = add_dcterm(&mut doc, term, "2024", None).unwrap_err();
            assert!(matches!(err, DipError::Xml(_)), "{:?}", term);
        }
        assert_eq!(doc, default_document());

        add_dcterm(&mut doc, "dateAccepted", "2024", None).unwrap();
        add_dcterm(&mut doc, "is-part_of.v2", "x", None).unwrap();
        assert_eq!(dcterms(&doc, &DcFilter::default()).len(), 2);
    }

    #[test]
    fn test_dcterms_survive_serialization() {
        let mut doc = default_document();
        add_dcterm(&mut doc, "identifier", "123456", None).unwrap();
        let back = XmlElement::parse(&doc.to_document().unwrap()).unwrap();
        let ids = dcterms(&back, &DcFilter { term: Some("identifier"), ..Default::default() });
        assert_eq!(ids[0].value, "123456");
    }

    #[test]
    fn test_other_prefix_bound_to_dcterms_is_recognised() {
        let doc = XmlElement::parse(
            r#"<metadata xmlns:dc="http://purl.org/dc/terms/" xmlns:o="urn:other"><dc:title>T</dc:title><o:title>X</o:title></metadata>"#,
        )
        .unwrap();
        let all = dcterms(&doc, &DcFilter::default());
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].term, "title");
    }

    #[test]
    fn test_remove_dcterms_wildcards() {
        let mut doc = default_document();
        add_dcterm(&mut doc, "title", "A", Some("en")).unwrap();
        add_dcterm(&mut doc, "title", "B", Some("no")).unwrap();
        add_dcterm(&mut doc, "creator", "C", None).unwrap();

        let removed = remove_dcterms(&mut doc, &DcFilter { lang: Some("en"), ..Default::default() });
        assert_eq!(removed, 1);
        let removed = remove_dcterms(&mut doc, &DcFilter { term: Some("rights"), ..Default::default() });
        assert_eq!(removed, 0);
        let removed = remove_dcterms(&mut doc, &DcFilter::default());
        assert_eq!(removed, 2);
        assert_eq!(doc.elements().count(), 0);
    }

    #[test]
    fn test_atom_entry_with_root() {
        let mut doc = default_document();
        add_dcterm(&mut doc, "creator", "Richard", None).unwrap();
        let ts = Timestamp::parse("2024-01-01T00:00:00.000000Z").unwrap();
        let entry = atom_entry(&doc, true, ts);

        assert_eq!(entry.attribute("xmlns"), Some(ATOM_NS));
        let names: Vec<_> = entry.elements().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["updated", "metadata"]);
    }

    #[test]
    fn test_atom_entry_keeps_unqualified_elements_out_of_atom() {
        let doc = XmlElement::parse(
            r#"<metadata xmlns:dcterms="http://purl.org/dc/terms/"><dcterms:title>T</dcterms:title><note><line>n</line></note></metadata>"#,
        )
        .unwrap();
        let ts = Timestamp::parse("2024-01-01T00:00:00.000000Z").unwrap();

        let entry = atom_entry(&doc, true, ts);
        let root = entry.elements().find(|e| e.name == "metadata").unwrap();
        assert_eq!(root.attribute("xmlns"), Some(""));
        let title = root.elements().find(|e| e.name == "dcterms:title").unwrap();
        assert_eq!(title.attribute("xmlns"), None);
        let note = root.elements().find(|e| e.name == "note").unwrap();
        assert_eq!(note.attribute("xmlns"), None);

        let entry = atom_entry(&doc, false, ts);
        assert_eq!(entry.attribute("xmlns"), Some(ATOM_NS));
        let note = entry.elements().find(|e| e.name == "note").unwrap();
        assert_eq!(note.attribute("xmlns"), Some(""));
        let updated = entry.elements().find(|e| e.name == "updated").unwrap();
        assert_eq!(updated.attribute("xmlns"), None);
        assert!(entry.to_document().unwrap().contains(r#"<note xmlns="">"#));
    }

    #[test]
    fn test_atom_entry_children_only() {
        let mut doc = default_document();
        add_dcterm(&mut doc, "creator", "Richard", None).unwrap();
        let ts = Timestamp::parse("2024-01-01T00:00:00.000000Z").unwrap();
        let entry = atom_entry(&doc, false, ts);

        assert_eq!(entry.attribute("xmlns:dcterms"), Some(DCTERMS_NS));
        let names: Vec<_> = entry.elements().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["updated", "dcterms:creator"]);
        // still recognisable as Dublin Core once lifted into the entry
        assert_eq!(dcterms(&entry, &DcFilter::default()).len(), 1);
    }

    #[test]
    fn test_atom_entry_children_keep_default_namespace() {
        let doc = XmlElement::parse(r#"<mods xmlns="urn:mods"><title>T</title></mods>"#).unwrap();
        let ts = Timestamp::parse("2024-01-01T00:00:00.000000Z").unwrap();
        let entry = atom_entry(&doc, false, ts);
        let title = entry.elements().find(|e| e.name == "title").unwrap();
        assert_eq!(title.attribute("xmlns"), Some("urn:mods"));
    }
}
