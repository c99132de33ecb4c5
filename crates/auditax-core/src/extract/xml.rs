//! Minimal owned element tree over quick-xml's namespace-aware reader.

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;

use crate::error::DocumentParseError;

/// An element with its resolved namespace, attributes, children and text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub namespace: Option<String>,
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

impl XmlElement {
    fn open(namespace: Option<String>, start: &BytesStart<'_>) -> Self {
        let attributes = start
            .attributes()
            .flatten()
            .map(|attr| {
                let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
                let value = attr
                    .unescape_value()
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
                (key, value)
            })
            .collect();

        Self {
            namespace,
            name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
            attributes,
            children: Vec::new(),
            text: String::new(),
        }
    }

    /// Whether this element has the given local name, within `namespace` when set.
    pub fn is(&self, namespace: Option<&str>, name: &str) -> bool {
        self.name == name
            && match namespace {
                Some(ns) => self.namespace.as_deref() == Some(ns),
                None => true,
            }
    }

    /// First direct child with the given name.
    pub fn child(&self, namespace: Option<&str>, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.is(namespace, name))
    }

    /// First descendant (pre-order, excluding self) with the given name.
    pub fn descendant(&self, namespace: Option<&str>, name: &str) -> Option<&XmlElement> {
        self.children.iter().find_map(|c| {
            if c.is(namespace, name) {
                Some(c)
            } else {
                c.descendant(namespace, name)
            }
        })
    }

    /// All descendants with the given name, in document order.
    pub fn descendants<'a>(&'a self, namespace: Option<&str>, name: &str) -> Vec<&'a XmlElement> {
        let mut found = Vec::new();
        self.collect_descendants(namespace, name, &mut found);
        found
    }

    fn collect_descendants<'a>(&'a self, namespace: Option<&str>, name: &str, found: &mut Vec<&'a XmlElement>) {
        for child in &self.children {
            if child.is(namespace, name) {
                found.push(child);
            }
            child.collect_descendants(namespace, name, found);
        }
    }

    /// First child element, whatever its name.
    pub fn first_child(&self) -> Option<&XmlElement> {
        self.children.first()
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Parse `xml` into an element tree rooted at the document element.
pub fn parse_tree(xml: &str) -> Result<XmlElement, DocumentParseError> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let position = reader.buffer_position() as u64;
        match reader.read_resolved_event() {
            Ok((ns, Event::Start(ref e))) => {
                stack.push(XmlElement::open(namespace_of(ns), e));
            }
            Ok((ns, Event::Empty(ref e))) => {
                let element = XmlElement::open(namespace_of(ns), e);
                attach(&mut stack, &mut root, element);
            }
            Ok((_, Event::End(_))) => {
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut root, element);
                }
            }
            Ok((_, Event::Text(ref e))) => {
                let text = e.unescape().map_err(|err| DocumentParseError::Xml {
                    position,
                    reason: err.to_string(),
                })?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Ok((_, Event::CData(e))) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Ok((_, Event::Eof)) => break,
            Ok(_) => {}
            Err(err) => {
                return Err(DocumentParseError::Xml {
                    position,
                    reason: err.to_string(),
                });
            }
        }
    }

    if !stack.is_empty() {
        return Err(DocumentParseError::Xml {
            position: xml.len() as u64,
            reason: format!("unclosed element <{}>", stack[stack.len() - 1].name),
        });
    }

    root.ok_or(DocumentParseError::MissingRoot)
}

fn namespace_of(resolved: ResolveResult<'_>) -> Option<String> {
    match resolved {
        ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.into_inner()).into_owned()),
        _ => None,
    }
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NS: &str = "http://example.com/ns";

    #[test]
    fn test_parse_namespaced_tree() {
        let xml = r#"<?xml version="1.0"?>
            <root xmlns="http://example.com/ns">
                <a Id="x1"><b>one</b></a>
                <c><a><b>two &amp; three</b></a></c>
                <empty/>
            </root>"#;

        let root = parse_tree(xml).unwrap();
        assert_eq!(root.name, "root");
        assert_eq!(root.namespace.as_deref(), Some(NS));
        assert_eq!(root.child(Some(NS), "a").unwrap().attribute("Id"), Some("x1"));
        assert!(root.child(Some("urn:other"), "a").is_none());
        assert!(root.child(Some(NS), "empty").is_some());

        let bs = root.descendants(Some(NS), "b");
        assert_eq!(bs.len(), 2);
        assert_eq!(bs[1].text, "two & three");
    }

    #[test]
    fn test_unscoped_lookup_ignores_namespace() {
        let root = parse_tree(r#"<r><x xmlns="urn:a"><y>1</y></x></r>"#).unwrap();
        assert_eq!(root.descendant(None, "y").unwrap().text, "1");
    }

    #[test]
    fn test_empty_document_has_no_root() {
        assert!(matches!(parse_tree("   "), Err(DocumentParseError::MissingRoot)));
    }

    #[test]
    fn test_mismatched_tags_fail() {
        assert!(matches!(
            parse_tree("<a><b></a>"),
            Err(DocumentParseError::Xml { .. })
        ));
    }
}
