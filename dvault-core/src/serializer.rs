//! DocView and version history serializers
//!
//! Both write one element per node, tagged by the ISO 9075 escaped primary
//! type. Properties become attributes in codec form, `vlt:nodename` carries
//! the node name:
//!
//! ```xml
//! <nt:unstructured xmlns:jcr="..." jcr:primaryType="{Name}nt:unstructured"
//!     title="Home" vlt:nodename="page">
//!     <nt:unstructured jcr:primaryType="{Name}nt:unstructured" vlt:nodename="par"/>
//! </nt:unstructured>
//! ```
//!
//! Version sidecars wrap the history subtree in a `vlt:versions` element
//! whose `path` attribute carries the aggregate path.

use crate::aggregator::Aggregate;
use crate::artifact::{SerializationType, Serializer};
use crate::codec;
use crate::error::{Result, VaultError};
use crate::names::{self, NAMESPACES, jcr, vlt};
use crate::node::{self, ContentNode};
use crate::session::Session;
use crate::value::{Property, Value};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use std::io::Write;

type PropertyScope<'a> = &'a dyn Fn(&ContentNode, &Property, &str) -> bool;
type ChildScope<'a> = &'a dyn Fn(&ContentNode, &str) -> bool;

fn write_decl<W: Write>(writer: &mut Writer<W>) -> Result<()> {
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    Ok(())
}

fn write_node<W: Write>(
    writer: &mut Writer<W>,
    node: &ContentNode,
    path: &str,
    root_element: bool,
    include_property: PropertyScope<'_>,
    include_child: ChildScope<'_>,
) -> Result<()> {
    let tag = names::iso9075_encode(&node.primary_type);
    let mut start = BytesStart::new(tag.as_str());
    if root_element {
        for (key, value) in NAMESPACES {
            start.push_attribute((*key, *value));
        }
    }
    let primary_type = Property::new(jcr::PRIMARY_TYPE, Value::Name(node.primary_type.clone()));
    start.push_attribute((jcr::PRIMARY_TYPE, codec::format(&primary_type).as_str()));
    if !node.mixins.is_empty() {
        let mixins = Property::names(jcr::MIXIN_TYPES, &node.mixins);
        start.push_attribute((jcr::MIXIN_TYPES, codec::format(&mixins).as_str()));
    }
    for property in node
        .properties
        .iter()
        .filter(|p| include_property(node, p, path))
    {
        let key = names::iso9075_encode(property.name());
        start.push_attribute((key.as_str(), codec::format(property).as_str()));
    }
    start.push_attribute((vlt::NODENAME, node.name.as_str()));

    let children: Vec<(String, &ContentNode)> = node
        .children
        .iter()
        .map(|c| (node::join(path, &c.name), c))
        .filter(|(child_path, c)| include_child(c, child_path))
        .collect();
    if children.is_empty() {
        writer.write_event(Event::Empty(start))?;
    } else {
        writer.write_event(Event::Start(start))?;
        for (child_path, child) in children {
            write_node(writer, child, &child_path, false, include_property, include_child)?;
        }
        writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
    }
    Ok(())
}

/// Serializer for the PRIMARY artifact of an aggregate
#[derive(Debug)]
pub struct DocViewSerializer {
    aggregate: Aggregate,
}

impl DocViewSerializer {
    pub fn new(aggregate: Aggregate) -> Self {
        Self { aggregate }
    }
}

impl Serializer for DocViewSerializer {
    fn serialization_type(&self) -> SerializationType {
        SerializationType::XmlDocView
    }

    fn write_content(&self, session: &dyn Session, out: &mut dyn Write) -> Result<()> {
        let path = self.aggregate.path();
        let root = session.require_node(path)?;
        let aggregator = self.aggregate.aggregator();
        let include_property = |parent: &ContentNode, property: &Property, at: &str| {
            aggregator.includes_property(root, parent, property, at)
        };
        let include_child =
            |child: &ContentNode, at: &str| self.aggregate.includes_child(root, child, at);

        let mut writer = Writer::new_with_indent(out, b' ', 4);
        write_decl(&mut writer)?;
        write_node(&mut writer, root, path, true, &include_property, &include_child)?;
        writer.into_inner().write_all(b"\n")?;
        Ok(())
    }
}

/// Which node of an aggregate carries the version history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// The aggregate node itself
    Node,
    /// The `jcr:content` child of the aggregate node
    ContentChild,
}

impl Provenance {
    /// Artifact path relative to the aggregate node
    pub fn relative_path(&self) -> &'static str {
        match self {
            Provenance::Node => "",
            Provenance::ContentChild => jcr::CONTENT,
        }
    }

    pub fn versioned_path(&self, aggregate_path: &str) -> String {
        node::join(aggregate_path, self.relative_path())
    }
}

/// Serializer for the VERSIONS sidecar of an aggregate
#[derive(Debug)]
pub struct VersionsSerializer {
    path: String,
    provenance: Provenance,
}

impl VersionsSerializer {
    pub fn new(aggregate_path: &str, provenance: Provenance) -> Self {
        Self {
            path: aggregate_path.to_string(),
            provenance,
        }
    }
}

impl Serializer for VersionsSerializer {
    fn serialization_type(&self) -> SerializationType {
        SerializationType::XmlGeneric
    }

    fn write_content(&self, session: &dyn Session, out: &mut dyn Write) -> Result<()> {
        let versioned = self.provenance.versioned_path(&self.path);
        let history = session
            .version_history(&versioned)?
            .ok_or_else(|| VaultError::NotFound(format!("version history of {}", versioned)))?;

        let mut writer = Writer::new_with_indent(out, b' ', 4);
        write_decl(&mut writer)?;
        let mut start = BytesStart::new(vlt::VERSIONS);
        for (key, value) in NAMESPACES {
            start.push_attribute((*key, *value));
        }
        start.push_attribute((vlt::PATH, self.path.as_str()));
        writer.write_event(Event::Start(start))?;
        write_node(
            &mut writer,
            history,
            &history.name,
            false,
            &|_, _, _| true,
            &|_, _| true,
        )?;
        writer.write_event(Event::End(BytesEnd::new(vlt::VERSIONS)))?;
        writer.into_inner().write_all(b"\n")?;
        Ok(())
    }
}
