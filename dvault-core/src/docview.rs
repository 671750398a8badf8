//! Pull-based reader for DocView and version history documents

use crate::codec;
use crate::error::{Result, VaultError};
use crate::names::{self, jcr, vlt};
use crate::node::ContentNode;
use crate::value::Property;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

/// One element with ISO 9075 decoded tag and attribute names
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
}

impl Element {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn require(&self, name: &str) -> Result<&str> {
        self.attribute(name)
            .ok_or_else(|| VaultError::missing_attribute(&self.tag, name))
    }

    fn from_start(start: &BytesStart<'_>) -> Result<Self> {
        let qname = start.name();
        let tag = utf8(qname.as_ref())?;
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = utf8(attr.key.as_ref())?;
            if key == "xmlns" || key.starts_with("xmlns:") {
                continue;
            }
            let value = attr.unescape_value()?.into_owned();
            attributes.push((names::iso9075_decode(key), value));
        }
        Ok(Self {
            tag: names::iso9075_decode(tag),
            attributes,
        })
    }
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| VaultError::Malformed(format!("invalid UTF-8 in name: {}", e)))
}

#[derive(Debug, Clone, PartialEq)]
pub enum XmlEvent {
    Start(Element),
    End,
}

/// Element event source over an in-memory document
///
/// Empty elements are reported as a start followed by an end. Text,
/// comments and declarations are skipped.
pub struct ElementReader<'a> {
    reader: Reader<&'a [u8]>,
    depth: usize,
    pending_end: bool,
}

impl<'a> ElementReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let mut reader = Reader::from_reader(data);
        reader.config_mut().trim_text(true);
        Self {
            reader,
            depth: 0,
            pending_end: false,
        }
    }

    /// Next element event, `None` at the end of a well-formed document
    pub fn next_event(&mut self) -> Result<Option<XmlEvent>> {
        if self.pending_end {
            self.pending_end = false;
            self.depth -= 1;
            return Ok(Some(XmlEvent::End));
        }
        loop {
            match self.reader.read_event()? {
                Event::Start(e) => {
                    self.depth += 1;
                    return Ok(Some(XmlEvent::Start(Element::from_start(&e)?)));
                }
                Event::Empty(e) => {
                    self.depth += 1;
                    self.pending_end = true;
                    return Ok(Some(XmlEvent::Start(Element::from_start(&e)?)));
                }
                Event::End(_) => {
                    self.depth = self.depth.checked_sub(1).ok_or_else(|| {
                        VaultError::Malformed("unbalanced end element".to_string())
                    })?;
                    return Ok(Some(XmlEvent::End));
                }
                Event::Eof => {
                    if self.depth != 0 {
                        return Err(VaultError::Malformed(format!(
                            "document ends with {} open element(s)",
                            self.depth
                        )));
                    }
                    return Ok(None);
                }
                _ => {}
            }
        }
    }
}

/// Node as described by one DocView element
#[derive(Debug, Clone, PartialEq)]
pub struct DocViewNode {
    pub name: String,
    pub primary_type: String,
    pub mixins: Vec<String>,
    pub properties: Vec<Property>,
}

impl DocViewNode {
    /// Decode an element; the primary type falls back to the element tag
    pub fn from_element(element: &Element) -> Result<Self> {
        let name = element.require(vlt::NODENAME)?.to_string();
        let mut primary_type = element.tag.clone();
        let mut mixins = Vec::new();
        let mut properties = Vec::new();
        for (key, value) in &element.attributes {
            match key.as_str() {
                vlt::NODENAME => {}
                jcr::PRIMARY_TYPE => {
                    if let Some(t) = codec::decode(value)?.values.into_iter().next() {
                        primary_type = t;
                    }
                }
                jcr::MIXIN_TYPES => mixins = codec::decode(value)?.values,
                _ => properties.push(codec::parse(key, value)?),
            }
        }
        Ok(Self {
            name,
            primary_type,
            mixins,
            properties,
        })
    }

    pub fn into_node(self) -> ContentNode {
        ContentNode {
            name: self.name,
            primary_type: self.primary_type,
            mixins: self.mixins,
            properties: self.properties,
            children: Vec::new(),
        }
    }
}

/// Parse a DocView document into a content tree
pub fn parse(data: &[u8]) -> Result<ContentNode> {
    let mut reader = ElementReader::new(data);
    let mut stack: Vec<ContentNode> = Vec::new();
    let mut root = None;
    while let Some(event) = reader.next_event()? {
        match event {
            XmlEvent::Start(element) => {
                if root.is_some() {
                    return Err(VaultError::Malformed("more than one root element".to_string()));
                }
                stack.push(DocViewNode::from_element(&element)?.into_node());
            }
            XmlEvent::End => {
                let node = stack
                    .pop()
                    .ok_or_else(|| VaultError::Malformed("unbalanced end element".to_string()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = Some(node),
                }
            }
        }
    }
    root.ok_or_else(|| VaultError::Malformed("document has no root element".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AggregatorManager;
    use crate::artifact::Serializer;
    use crate::config::ExportConfig;
    use crate::memory::MemorySession;
    use crate::serializer::DocViewSerializer;
    use crate::session::Session;
    use crate::value::{PropertyType, Value};
    use bytes::Bytes;

    #[test]
    fn test_parse_simple_document() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
<nt:unstructured xmlns:jcr="http://www.jcp.org/jcr/1.0"
    jcr:primaryType="{Name}nt:unstructured"
    jcr:mixinTypes="{Name}[mix:versionable]"
    count="{Long}5"
    vlt:nodename="page">
    <nt:folder jcr:primaryType="{Name}nt:folder" vlt:nodename="child"/>
</nt:unstructured>"#;
        let node = parse(xml).unwrap();
        assert_eq!(node.name, "page");
        assert_eq!(node.primary_type, "nt:unstructured");
        assert_eq!(node.mixins, vec!["mix:versionable".to_string()]);
        assert_eq!(node.property("count"), Some(&Property::new("count", Value::Long(5))));
        assert_eq!(node.children.len(), 1);
        assert_eq!(node.children[0].name, "child");
        assert_eq!(node.children[0].primary_type, "nt:folder");
    }

    #[test]
    fn test_primary_type_falls_back_to_tag() {
        let node = parse(br#"<my_x0020_type vlt:nodename="n"/>"#).unwrap();
        assert_eq!(node.primary_type, "my type");
    }

    #[test]
    fn test_structural_errors() {
        assert!(matches!(
            parse(br#"<nt:unstructured title="x"/>"#),
            Err(VaultError::MissingAttribute { .. })
        ));
        assert!(parse(br#"<a vlt:nodename="a"><b vlt:nodename="b"></a>"#).is_err());
        assert!(parse(br#"<a vlt:nodename="a">"#).is_err());
        assert!(parse(br#"<a vlt:nodename="a" n="{Long}x"/>"#).is_err());
        assert!(parse(b"").is_err());
    }

    #[test]
    fn test_serialized_tree_roundtrip() {
        let mut session = MemorySession::new();
        session.add_node("/", "content", "nt:unstructured").unwrap();
        let path = "/content";
        session
            .set_property(path, Property::new("data", Value::Binary(Bytes::from_static(b"\x00\x01bin"))))
            .unwrap();
        session
            .set_property(
                path,
                Property::multi(
                    "tags",
                    PropertyType::String,
                    vec![Value::String("a,b".into()), Value::String(String::new())],
                )
                .unwrap(),
            )
            .unwrap();
        session
            .set_property(path, Property::string("odd name", "line\nbreak <tag>"))
            .unwrap();
        session
            .set_property(path, Property::new("when", Value::parse(PropertyType::Date, "2024-01-02T03:04:05.678+05:30").unwrap()))
            .unwrap();
        session.add_node(path, "1.0", "nt:unstructured").unwrap();
        session.add_mixin(path, "mix:referenceable").unwrap();

        let aggregate = AggregatorManager::from_config(&ExportConfig::default())
            .collect(&session, path)
            .unwrap()
            .remove(0);
        let mut out = Vec::new();
        DocViewSerializer::new(aggregate)
            .write_content(&session, &mut out)
            .unwrap();

        let parsed = parse(&out).unwrap();
        assert_eq!(&parsed, session.require_node(path).unwrap());
    }
}
