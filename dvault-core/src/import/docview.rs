use super::ArtifactHandler;
use super::rescue::RescueTransformer;
use crate::artifact::{ArtifactSet, ImportInfo, SerializationType};
use crate::docview;
use crate::error::Result;
use crate::filter::{ImportMode, WorkspaceFilter};
use crate::node::{self, ContentNode};
use crate::session::Session;
use crate::value::Property;

/// Imports the PRIMARY DocView artifact of an aggregate
///
/// Missing nodes are created. Existing nodes are reconciled according to
/// the import mode the filter assigns to their path:
///
/// - `Replace`: the node's own state is replaced and its children are
///   rebuilt from the document, keeping existing children the document does
///   not mention. Nothing happens if the node already matches.
/// - `Merge`: only properties and children that are missing are added.
/// - `Update`: properties and node types are overwritten, missing children
///   are added.
///
/// Paths the filter does not contain are never modified. Ignored
/// properties are never part of a document, so existing nodes keep them.
#[derive(Debug, Default)]
pub struct DocViewArtifactHandler {
    ignored_properties: Vec<String>,
}

impl DocViewArtifactHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ignored_properties(mut self, names: Vec<String>) -> Self {
        self.ignored_properties = names;
        self
    }
}

struct Context<'a> {
    filter: &'a dyn WorkspaceFilter,
    ignored: &'a [String],
}

impl Context<'_> {
    fn is_ignored(&self, property: &Property) -> bool {
        self.ignored.iter().any(|name| name == property.name())
    }
}

impl ArtifactHandler for DocViewArtifactHandler {
    fn accept(
        &self,
        session: &mut dyn Session,
        filter: &dyn WorkspaceFilter,
        parent: &str,
        name: &str,
        artifacts: &ArtifactSet,
    ) -> Result<Option<ImportInfo>> {
        let Some(primary) = artifacts.primary() else {
            return Ok(None);
        };
        if primary.serialization_type() != SerializationType::XmlDocView {
            return Ok(None);
        }
        let target = node::join(&node::join(parent, name), primary.relative_path());
        let data = primary.content(&*session)?;
        let tree = docview::parse(&data)?;
        tracing::trace!("importing {} node(s) into {}", tree.subtree_size(), target);

        let cx = Context {
            filter,
            ignored: &self.ignored_properties,
        };
        let mut info = ImportInfo::new();
        import_node(session, &cx, &target, &tree, &mut info)?;
        Ok(Some(info))
    }
}

fn import_node(
    session: &mut dyn Session,
    cx: &Context<'_>,
    path: &str,
    new: &ContentNode,
    info: &mut ImportInfo,
) -> Result<()> {
    if !session.node_exists(path)? {
        if cx.filter.contains(path) {
            create_subtree(session, cx, path, new)?;
            info.on_created(path);
        }
        return Ok(());
    }
    if !cx.filter.contains(path) {
        return import_children(session, cx, path, new, info);
    }
    match cx.filter.import_mode(path) {
        ImportMode::Replace => replace_node(session, cx, path, new, info),
        ImportMode::Merge => {
            if merge_state(session, path, new)? {
                info.on_modified(path);
            }
            import_children(session, cx, path, new, info)
        }
        ImportMode::Update => {
            if update_state(session, path, new)? {
                info.on_modified(path);
            }
            import_children(session, cx, path, new, info)
        }
    }
}

fn import_children(
    session: &mut dyn Session,
    cx: &Context<'_>,
    path: &str,
    new: &ContentNode,
    info: &mut ImportInfo,
) -> Result<()> {
    for child in &new.children {
        import_node(session, cx, &node::join(path, &child.name), child, info)?;
    }
    Ok(())
}

fn create_subtree(
    session: &mut dyn Session,
    cx: &Context<'_>,
    path: &str,
    new: &ContentNode,
) -> Result<()> {
    session.add_node(node::parent_path(path), node::name_of(path), &new.primary_type)?;
    if !new.mixins.is_empty() {
        session.set_mixins(path, new.mixins.clone())?;
    }
    for property in &new.properties {
        session.set_property(path, property.clone())?;
    }
    for child in &new.children {
        let child_path = node::join(path, &child.name);
        if cx.filter.contains(&child_path) {
            create_subtree(session, cx, &child_path, child)?;
        }
    }
    Ok(())
}

/// Whether the existing node already carries the new content
fn matches(cx: &Context<'_>, existing: &ContentNode, path: &str, new: &ContentNode) -> bool {
    let compared = existing.properties.iter().filter(|p| !cx.is_ignored(p)).count();
    if existing.primary_type != new.primary_type
        || existing.mixins != new.mixins
        || compared != new.properties.len()
        || new
            .properties
            .iter()
            .any(|p| existing.property(p.name()) != Some(p))
    {
        return false;
    }
    new.children.iter().all(|child| {
        let child_path = node::join(path, &child.name);
        !cx.filter.contains(&child_path)
            || existing
                .child(&child.name)
                .is_some_and(|e| matches(cx, e, &child_path, child))
    })
}

fn replace_node(
    session: &mut dyn Session,
    cx: &Context<'_>,
    path: &str,
    new: &ContentNode,
    info: &mut ImportInfo,
) -> Result<()> {
    if matches(cx, session.require_node(path)?, path, new) {
        tracing::trace!("{} is up to date", path);
        return Ok(());
    }
    let mut transformer =
        RescueTransformer::begin(session, path)?.with_preserved_properties(cx.ignored.to_vec());
    stream_node(&mut transformer, session, cx, path, new)?;
    transformer.finish(session)?;
    info.on_replaced(path);
    Ok(())
}

fn stream_node(
    transformer: &mut RescueTransformer,
    session: &mut dyn Session,
    cx: &Context<'_>,
    path: &str,
    new: &ContentNode,
) -> Result<()> {
    transformer.start_node(session, new)?;
    for child in &new.children {
        let child_path = node::join(path, &child.name);
        if cx.filter.contains(&child_path) {
            stream_node(transformer, session, cx, &child_path, child)?;
        }
    }
    transformer.end_node()
}

/// Add missing mixins and properties; returns whether anything changed
fn merge_state(session: &mut dyn Session, path: &str, new: &ContentNode) -> Result<bool> {
    let existing = session.require_node(path)?;
    let mut mixins = existing.mixins.clone();
    let missing_mixins: Vec<String> = new
        .mixins
        .iter()
        .filter(|m| !existing.mixins.contains(m))
        .cloned()
        .collect();
    let missing_properties: Vec<_> = new
        .properties
        .iter()
        .filter(|p| existing.property(p.name()).is_none())
        .cloned()
        .collect();

    let changed = !missing_mixins.is_empty() || !missing_properties.is_empty();
    if !missing_mixins.is_empty() {
        mixins.extend(missing_mixins);
        session.set_mixins(path, mixins)?;
    }
    for property in missing_properties {
        session.set_property(path, property)?;
    }
    Ok(changed)
}

/// Overwrite node types and properties; returns whether anything changed
fn update_state(session: &mut dyn Session, path: &str, new: &ContentNode) -> Result<bool> {
    let existing = session.require_node(path)?;
    let type_changed = existing.primary_type != new.primary_type;
    let mixins_changed = existing.mixins != new.mixins;
    let changed_properties: Vec<_> = new
        .properties
        .iter()
        .filter(|p| existing.property(p.name()) != Some(*p))
        .cloned()
        .collect();

    let changed = type_changed || mixins_changed || !changed_properties.is_empty();
    if type_changed {
        session.set_primary_type(path, &new.primary_type)?;
    }
    if mixins_changed {
        session.set_mixins(path, new.mixins.clone())?;
    }
    for property in changed_properties {
        session.set_property(path, property)?;
    }
    Ok(changed)
}
