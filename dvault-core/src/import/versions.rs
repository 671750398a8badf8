use crate::codec;
use crate::docview::{Element, ElementReader, XmlEvent};
use crate::error::{Result, VaultError};
use crate::memory::new_identifier;
use crate::names::{jcr, vlt};
use crate::node::NodeBuilder;
use crate::session::{Session, version_buckets};
use crate::value::{Property, PropertyType, Value};

/// Parser state for one open element
#[derive(Debug)]
enum Frame {
    Root,
    History(Vec<String>),
    Labels,
    Version(Vec<String>),
    Frozen(Vec<String>),
    Ignored,
}

/// Rebuilds version histories from a version sidecar document
///
/// The document is read as a stream of element events and applied to a
/// staged copy of the version storage, which is committed in one step once
/// the document ends. Identifiers found in the document are kept verbatim;
/// only new history nodes get a freshly generated `jcr:uuid`.
#[derive(Debug, Default)]
pub struct VersionsImporter {
    histories: usize,
    versions: usize,
}

impl VersionsImporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a version document; returns whether the storage changed
    pub fn import(&mut self, session: &mut dyn Session, data: &[u8]) -> Result<bool> {
        let mut storage = session.version_storage()?;
        let mut reader = ElementReader::new(data);
        let mut stack: Vec<Frame> = Vec::new();
        let mut seen_root = false;

        while let Some(event) = reader.next_event()? {
            match event {
                XmlEvent::Start(element) => {
                    let frame = match stack.last() {
                        None if seen_root => {
                            return Err(VaultError::Malformed(
                                "more than one root element in version document".to_string(),
                            ));
                        }
                        None => {
                            if element.tag != vlt::VERSIONS {
                                return Err(VaultError::Malformed(format!(
                                    "expected {} root element, found {}",
                                    vlt::VERSIONS,
                                    element.tag
                                )));
                            }
                            seen_root = true;
                            Frame::Root
                        }
                        Some(parent) => self.open(&mut storage, parent, &element)?,
                    };
                    stack.push(frame);
                }
                XmlEvent::End => {
                    stack
                        .pop()
                        .ok_or_else(|| VaultError::Malformed("unbalanced end element".to_string()))?;
                }
            }
        }
        if !seen_root {
            return Err(VaultError::Malformed("empty version document".to_string()));
        }

        let rebuilt = storage.build();
        if session.node(jcr::VERSION_STORAGE_PATH)? == Some(&rebuilt) {
            tracing::debug!("version storage already up to date");
            return Ok(false);
        }
        session.commit_version_storage(NodeBuilder::from_node(&rebuilt))?;
        tracing::debug!(
            histories = self.histories,
            versions = self.versions,
            "version storage rebuilt"
        );
        Ok(true)
    }

    fn open(&mut self, storage: &mut NodeBuilder, parent: &Frame, element: &Element) -> Result<Frame> {
        let node_type = element_type(element)?;
        Ok(match parent {
            Frame::Root if node_type == jcr::NT_VERSION_HISTORY => {
                Frame::History(self.start_history(storage, element)?)
            }
            Frame::History(history) if node_type == jcr::NT_VERSION_LABELS => {
                start_labels(storage, history, element)?;
                Frame::Labels
            }
            Frame::History(history) if node_type == jcr::NT_VERSION => {
                self.versions += 1;
                Frame::Version(start_version(storage, history, element)?)
            }
            Frame::Version(version) if node_type == jcr::NT_FROZEN_NODE => {
                Frame::Frozen(start_frozen(storage, version, element, node_type)?)
            }
            Frame::Frozen(parent) => Frame::Frozen(start_frozen(storage, parent, element, node_type)?),
            _ => {
                tracing::trace!("skipping {} element in version document", element.tag);
                Frame::Ignored
            }
        })
    }

    fn start_history(&mut self, storage: &mut NodeBuilder, element: &Element) -> Result<Vec<String>> {
        let token = element.require(vlt::NODENAME)?;
        if token.is_empty() {
            return Err(VaultError::Malformed("version history without a name".to_string()));
        }
        let mut path = Vec::new();
        let mut cursor = &mut *storage;
        for bucket in version_buckets(token) {
            cursor = cursor.child(&bucket);
            if cursor.is_new() {
                cursor.set_primary_type(jcr::REP_VERSION_STORAGE);
            }
            path.push(bucket);
        }
        let history = cursor.child(token);
        if history.is_new() {
            let versionable = match element.attribute(jcr::VERSIONABLE_UUID) {
                Some(value) => plain_value(value)?,
                None => token.to_string(),
            };
            history.set_primary_type(jcr::NT_VERSION_HISTORY);
            history.set_property(Property::string(jcr::UUID, new_identifier()));
            history.set_property(Property::string(jcr::VERSIONABLE_UUID, versionable));
            self.histories += 1;
        } else {
            tracing::debug!("reusing version history {}", token);
        }
        path.push(token.to_string());
        Ok(path)
    }
}

fn start_labels(storage: &mut NodeBuilder, history: &[String], element: &Element) -> Result<()> {
    let name = element.attribute(vlt::NODENAME).unwrap_or(jcr::VERSION_LABELS);
    let mut path = history.to_vec();
    path.push(name.to_string());
    let labels = storage.descend(&path);
    labels.set_primary_type(jcr::NT_VERSION_LABELS);
    for (key, value) in &element.attributes {
        if key == vlt::NODENAME || key == jcr::PRIMARY_TYPE {
            continue;
        }
        labels.set_property(Property::new(key.as_str(), Value::Reference(plain_value(value)?)));
    }
    Ok(())
}

fn start_version(storage: &mut NodeBuilder, history: &[String], element: &Element) -> Result<Vec<String>> {
    let name = element.require(vlt::NODENAME)?;
    let id = plain_value(element.require(jcr::UUID)?)?;
    let created = plain_value(element.require(jcr::CREATED)?)?;
    let created = Value::parse(PropertyType::Date, &created)?;
    let predecessors = list_value(element.attribute(jcr::PREDECESSORS))?;
    let successors = list_value(element.attribute(jcr::SUCCESSORS))?;

    let mut path = history.to_vec();
    path.push(name.to_string());
    let version = storage.descend(&path);
    version.set_primary_type(jcr::NT_VERSION);
    version.set_property(Property::string(jcr::UUID, id));
    version.set_property(Property::new(jcr::CREATED, created));
    version.set_property(Property::references(jcr::PREDECESSORS, &predecessors));
    version.set_property(Property::references(jcr::SUCCESSORS, &successors));
    Ok(path)
}

fn start_frozen(
    storage: &mut NodeBuilder,
    parent: &[String],
    element: &Element,
    node_type: String,
) -> Result<Vec<String>> {
    let name = element.require(vlt::NODENAME)?;
    let mut path = parent.to_vec();
    path.push(name.to_string());
    let frozen = storage.descend(&path);
    frozen.set_primary_type(node_type);
    for (key, value) in &element.attributes {
        match key.as_str() {
            vlt::NODENAME | jcr::PRIMARY_TYPE => {}
            jcr::MIXIN_TYPES => frozen.set_mixins(list_value(Some(value))?),
            jcr::UUID | jcr::FROZEN_UUID => {
                frozen.set_property(Property::string(key.as_str(), plain_value(value)?))
            }
            jcr::FROZEN_PRIMARY_TYPE => {
                frozen.set_property(Property::new(key.as_str(), Value::Name(plain_value(value)?)))
            }
            jcr::FROZEN_MIXIN_TYPES => {
                frozen.set_property(Property::names(key.as_str(), &list_value(Some(value))?))
            }
            _ => frozen.set_property(codec::parse(key, value)?),
        }
    }
    Ok(path)
}

/// Primary type from `jcr:primaryType`, falling back to the element tag
fn element_type(element: &Element) -> Result<String> {
    match element.attribute(jcr::PRIMARY_TYPE) {
        Some(value) => plain_value(value),
        None => Ok(element.tag.clone()),
    }
}

/// Single value text with the type prefix stripped
fn plain_value(text: &str) -> Result<String> {
    let decoded = codec::decode(text)?;
    decoded
        .values
        .into_iter()
        .next()
        .ok_or_else(|| VaultError::Malformed(format!("empty value: {}", text)))
}

/// Ordered value list with the type prefix and brackets stripped
fn list_value(text: Option<&str>) -> Result<Vec<String>> {
    match text {
        Some(text) => Ok(codec::decode(text)?.values),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySession;
    use crate::serializer::{Provenance, VersionsSerializer};
    use crate::artifact::Serializer;
    use crate::session::version_history_path;

    const TOKEN: &str = "abcdef12-3456-7890-abcd-ef1234567890";

    fn document(histories: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<vlt:versions xmlns:jcr="http://www.jcp.org/jcr/1.0" xmlns:vlt="http://www.day.com/jcr/vault/1.0" path="/content/page">
{}
</vlt:versions>"#,
            histories
        )
    }

    fn history(token: &str) -> String {
        format!(
            r#"<nt:versionHistory jcr:primaryType="{{Name}}nt:versionHistory" jcr:uuid="hist-1" jcr:versionableUuid="{token}" vlt:nodename="{token}">
    <nt:versionLabels jcr:primaryType="{{Name}}nt:versionLabels" release="{{Reference}}v1-id" vlt:nodename="jcr:versionLabels"/>
    <nt:version jcr:primaryType="{{Name}}nt:version" jcr:uuid="root-id" jcr:created="{{Date}}2024-01-02T03:04:05.000+00:00" jcr:predecessors="{{Reference}}[]" jcr:successors="{{Reference}}[v1-id]" vlt:nodename="jcr:rootVersion">
        <nt:frozenNode jcr:primaryType="{{Name}}nt:frozenNode" jcr:uuid="f0" jcr:frozenPrimaryType="{{Name}}nt:unstructured" jcr:frozenMixinTypes="{{Name}}[mix:versionable]" jcr:frozenUuid="{token}" vlt:nodename="jcr:frozenNode"/>
    </nt:version>
    <nt:version jcr:primaryType="{{Name}}nt:version" jcr:uuid="v1-id" jcr:created="{{Date}}2024-01-03T03:04:05.000+00:00" jcr:predecessors="{{Reference}}[id1,id2]" jcr:successors="{{Reference}}[]" vlt:nodename="1.0">
        <nt:frozenNode jcr:primaryType="{{Name}}nt:frozenNode" jcr:uuid="f1" jcr:frozenPrimaryType="{{Name}}nt:unstructured" jcr:frozenMixinTypes="{{Name}}[]" jcr:frozenUuid="{token}" title="Home" count="{{Long}}3" data="{{Binary}}AAE=" vlt:nodename="jcr:frozenNode">
            <nt:unstructured jcr:primaryType="{{Name}}nt:unstructured" text="nested" vlt:nodename="par"/>
        </nt:frozenNode>
    </nt:version>
</nt:versionHistory>"#,
            token = token
        )
    }

    fn history_node(session: &MemorySession, token: &str) -> crate::node::ContentNode {
        session
            .require_node(jcr::VERSION_STORAGE_PATH)
            .unwrap()
            .descendant(&version_history_path(token).join("/"))
            .unwrap()
            .clone()
    }

    #[test]
    fn test_rebuilds_history_under_buckets() {
        let mut session = MemorySession::new();
        VersionsImporter::new()
            .import(&mut session, document(&history(TOKEN)).as_bytes())
            .unwrap();

        let storage = session.require_node(jcr::VERSION_STORAGE_PATH).unwrap();
        let bucket = storage.descendant("ab/cd/ef").unwrap();
        assert_eq!(bucket.primary_type, jcr::REP_VERSION_STORAGE);
        assert_eq!(storage.child("ab").unwrap().primary_type, jcr::REP_VERSION_STORAGE);

        let history = history_node(&session, TOKEN);
        assert_eq!(history.primary_type, jcr::NT_VERSION_HISTORY);
        assert_ne!(history.identifier(), Some("hist-1"));
        assert_eq!(
            history.property(jcr::VERSIONABLE_UUID),
            Some(&Property::string(jcr::VERSIONABLE_UUID, TOKEN))
        );

        let labels = history.child(jcr::VERSION_LABELS).unwrap();
        assert_eq!(
            labels.property("release"),
            Some(&Property::new("release", Value::Reference("v1-id".into())))
        );

        let v1 = history.child("1.0").unwrap();
        assert_eq!(v1.primary_type, jcr::NT_VERSION);
        assert_eq!(v1.identifier(), Some("v1-id"));
        let predecessors = v1.property(jcr::PREDECESSORS).unwrap();
        assert_eq!(predecessors.property_type(), PropertyType::Reference);
        assert_eq!(predecessors.value_strings(), vec!["id1", "id2"]);
        assert_eq!(v1.property(jcr::CREATED).unwrap().property_type(), PropertyType::Date);

        let frozen = v1.child(jcr::FROZEN_NODE).unwrap();
        assert_eq!(frozen.primary_type, jcr::NT_FROZEN_NODE);
        assert_eq!(frozen.identifier(), Some("f1"));
        assert_eq!(
            frozen.property(jcr::FROZEN_PRIMARY_TYPE),
            Some(&Property::new(jcr::FROZEN_PRIMARY_TYPE, Value::Name("nt:unstructured".into())))
        );
        assert_eq!(frozen.property("count"), Some(&Property::new("count", Value::Long(3))));
        assert_eq!(
            frozen.property("data"),
            Some(&Property::new("data", Value::Binary(bytes::Bytes::from_static(&[0, 1]))))
        );
        let par = frozen.child("par").unwrap();
        assert_eq!(par.property("text"), Some(&Property::string("text", "nested")));

        let root_frozen = history.child(jcr::ROOT_VERSION).unwrap().child(jcr::FROZEN_NODE).unwrap();
        assert_eq!(
            root_frozen.property(jcr::FROZEN_MIXIN_TYPES).unwrap().value_strings(),
            vec!["mix:versionable"]
        );
    }

    #[test]
    fn test_same_token_twice_reuses_history() {
        let mut session = MemorySession::new();
        let doc = document(&format!("{}\n{}", history(TOKEN), history(TOKEN)));
        assert!(VersionsImporter::new().import(&mut session, doc.as_bytes()).unwrap());
        let first = history_node(&session, TOKEN);

        let bucket = session
            .require_node(jcr::VERSION_STORAGE_PATH)
            .unwrap()
            .descendant("ab/cd/ef")
            .unwrap();
        assert_eq!(bucket.children.len(), 1);

        let changed = VersionsImporter::new()
            .import(&mut session, document(&history(TOKEN)).as_bytes())
            .unwrap();
        assert!(!changed);
        let second = history_node(&session, TOKEN);
        assert_eq!(first.identifier(), second.identifier());
    }

    #[test]
    fn test_error_leaves_storage_untouched() {
        let mut session = MemorySession::new();
        let before = session.require_node(jcr::VERSION_STORAGE_PATH).unwrap().clone();
        let broken = history(TOKEN).replace("{Long}3", "{Long}three");
        assert!(
            VersionsImporter::new()
                .import(&mut session, document(&broken).as_bytes())
                .is_err()
        );
        let truncated = document(&history(TOKEN)).replace("</vlt:versions>", "");
        assert!(VersionsImporter::new().import(&mut session, truncated.as_bytes()).is_err());
        assert_eq!(session.require_node(jcr::VERSION_STORAGE_PATH).unwrap(), &before);
    }

    #[test]
    fn test_rejects_foreign_root_and_missing_names() {
        let mut session = MemorySession::new();
        assert!(VersionsImporter::new()
            .import(&mut session, br#"<nt:unstructured vlt:nodename="x"/>"#)
            .is_err());
        let nameless = document(r#"<nt:versionHistory jcr:primaryType="{Name}nt:versionHistory"/>"#);
        assert!(matches!(
            VersionsImporter::new().import(&mut session, nameless.as_bytes()),
            Err(VaultError::MissingAttribute { .. })
        ));
    }

    #[test]
    fn test_serialized_history_rebuilds_identically() {
        let mut source = MemorySession::new();
        source.add_node("/", "page", "nt:unstructured").unwrap();
        source.set_property("/page", Property::string("title", "Home")).unwrap();
        source.add_mixin("/page", jcr::MIX_VERSIONABLE).unwrap();
        source.checkin("/page").unwrap();
        source.checkin("/page").unwrap();
        source.add_version_label("/page", "1.0", "release").unwrap();

        let mut out = Vec::new();
        VersionsSerializer::new("/page", Provenance::Node)
            .write_content(&source, &mut out)
            .unwrap();

        let mut target = MemorySession::new();
        VersionsImporter::new().import(&mut target, &out).unwrap();

        let id = source.require_node("/page").unwrap().identifier().unwrap().to_string();
        let original = source.version_history("/page").unwrap().unwrap();
        let rebuilt = history_node(&target, &id);
        // history identifiers are regenerated, everything below is kept
        assert_eq!(rebuilt.children, original.children);
    }
}
