//! In-memory repository session
//!
//! Keeps a transient tree and the last saved tree. Repository files are JSON
//! snapshots of the saved tree with property values in their codec form.

use crate::error::{Result, VaultError};
use crate::names::jcr;
use crate::node::{self, ContentNode, NodeBuilder};
use crate::session::{Session, version_buckets, version_history_path};
use crate::value::{Property, Value};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const SNAPSHOT_FORMAT: u32 = 1;

#[derive(Serialize)]
struct SnapshotRef<'a> {
    format: u32,
    root: &'a ContentNode,
}

#[derive(Deserialize)]
struct Snapshot {
    format: u32,
    root: ContentNode,
}

/// Fresh stable identifier
pub fn new_identifier() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Single-writer in-memory session
#[derive(Debug, Clone)]
pub struct MemorySession {
    root: ContentNode,
    saved: ContentNode,
}

impl Default for MemorySession {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySession {
    /// Empty repository with an empty version storage
    pub fn new() -> Self {
        let root = ContentNode::new("", jcr::REP_ROOT).with_child(
            ContentNode::new(jcr::SYSTEM, jcr::REP_SYSTEM)
                .with_child(ContentNode::new(jcr::VERSION_STORAGE, jcr::REP_VERSION_STORAGE)),
        );
        Self::from_root(root)
    }

    /// Session over an existing tree, treated as saved
    pub fn from_root(root: ContentNode) -> Self {
        Self {
            saved: root.clone(),
            root,
        }
    }

    /// Load a repository snapshot file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read(path.as_ref())?;
        let snapshot: Snapshot = serde_json::from_slice(&data)?;
        if snapshot.format != SNAPSHOT_FORMAT {
            return Err(VaultError::Config(format!(
                "unsupported repository format {} in {}",
                snapshot.format,
                path.as_ref().display()
            )));
        }
        Ok(Self::from_root(snapshot.root))
    }

    /// Write the saved tree to a snapshot file
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let data = serde_json::to_vec_pretty(&SnapshotRef {
            format: SNAPSHOT_FORMAT,
            root: &self.saved,
        })?;
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, &data)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Transient root node
    pub fn root(&self) -> &ContentNode {
        &self.root
    }

    pub fn has_pending_changes(&self) -> bool {
        self.root != self.saved
    }

    fn node_mut(&mut self, path: &str) -> Result<&mut ContentNode> {
        self.root
            .descendant_mut(path)
            .ok_or_else(|| VaultError::NotFound(path.to_string()))
    }

    /// Add a mixin; referenceable and versionable mixins get a `jcr:uuid`
    ///
    /// Making a node versionable creates its version history right away,
    /// with the root version and an empty label node.
    pub fn add_mixin(&mut self, path: &str, mixin: &str) -> Result<()> {
        let node = self.node_mut(path)?;
        if !node.mixins.iter().any(|m| m == mixin) {
            node.mixins.push(mixin.to_string());
        }
        let referenceable = mixin == jcr::MIX_VERSIONABLE || mixin == jcr::MIX_REFERENCEABLE;
        if referenceable && node.identifier().is_none() {
            node.set_property(Property::string(jcr::UUID, new_identifier()));
        }
        if mixin != jcr::MIX_VERSIONABLE {
            return Ok(());
        }

        let node = node.clone();
        let id = node
            .identifier()
            .ok_or_else(|| VaultError::Repository(format!("{} has no identifier", path)))?
            .to_string();
        let mut storage = self.version_storage()?;
        if history_builder(&mut storage, &node, &id).is_new() {
            self.commit_version_storage(storage)?;
            tracing::debug!("created version history for {}", path);
        }
        Ok(())
    }

    /// Check in a versionable node and return the new version name
    ///
    /// Versions are named `1.0`, `1.1`, ... and linked through
    /// predecessor/successor references.
    pub fn checkin(&mut self, path: &str) -> Result<String> {
        let node = self.require_node(path)?.clone();
        if !node.is_node_type(jcr::MIX_VERSIONABLE) {
            return Err(VaultError::Repository(format!("{} is not versionable", path)));
        }
        let id = node
            .identifier()
            .ok_or_else(|| VaultError::Repository(format!("{} has no identifier", path)))?
            .to_string();

        let mut storage = self.version_storage()?;
        let history = history_builder(&mut storage, &node, &id);

        let versions: Vec<&NodeBuilder> = history
            .children()
            .iter()
            .filter(|c| c.primary_type() == Some(jcr::NT_VERSION))
            .collect();
        let (predecessor_name, predecessor_id) = match versions.last() {
            Some(last) => (last.name().to_string(), builder_identifier(last)?),
            None => return Err(VaultError::Repository(format!("history of {} has no root version", path))),
        };
        let name = format!("1.{}", versions.len() - 1);

        let version_id = {
            let version = history.child(&name);
            init_version(version, &[predecessor_id]);
            freeze(version.child(jcr::FROZEN_NODE), &node, true);
            builder_identifier(version)?
        };
        if let Some(predecessor) = history.get_child_mut(&predecessor_name) {
            let mut successors = predecessor
                .property(jcr::SUCCESSORS)
                .map(|p| p.value_strings())
                .unwrap_or_default();
            successors.push(version_id);
            predecessor.set_property(Property::references(jcr::SUCCESSORS, &successors));
        }

        self.commit_version_storage(storage)?;
        tracing::debug!("checked in {} as version {}", path, name);
        Ok(name)
    }

    /// Bind a label to a version of a node's history, moving it if it exists
    pub fn add_version_label(&mut self, path: &str, version: &str, label: &str) -> Result<()> {
        let node = self.require_node(path)?;
        let id = node
            .identifier()
            .ok_or_else(|| VaultError::Repository(format!("{} has no identifier", path)))?
            .to_string();
        let mut storage = self.version_storage()?;
        let history = version_history_path(&id)
            .iter()
            .try_fold(&mut storage, |n, name| n.get_child_mut(name))
            .ok_or_else(|| VaultError::NotFound(format!("version history of {}", path)))?;
        let version_id = history
            .get_child(version)
            .filter(|v| v.primary_type() == Some(jcr::NT_VERSION))
            .ok_or_else(|| VaultError::NotFound(format!("version {} of {}", version, path)))
            .and_then(builder_identifier)?;
        let labels = history.child(jcr::VERSION_LABELS);
        if labels.is_new() {
            labels.set_primary_type(jcr::NT_VERSION_LABELS);
        }
        labels.set_property(Property::new(label, Value::Reference(version_id)));
        self.commit_version_storage(storage)
    }
}

/// Get or create the version history of `node` below its bucket path
fn history_builder<'a>(storage: &'a mut NodeBuilder, node: &ContentNode, id: &str) -> &'a mut NodeBuilder {
    let mut cursor = storage;
    for bucket in version_buckets(id) {
        cursor = cursor.child(&bucket);
        if cursor.is_new() {
            cursor.set_primary_type(jcr::REP_VERSION_STORAGE);
        }
    }
    let history = cursor.child(id);
    if history.is_new() {
        history.set_primary_type(jcr::NT_VERSION_HISTORY);
        history.set_property(Property::string(jcr::UUID, new_identifier()));
        history.set_property(Property::string(jcr::VERSIONABLE_UUID, id));
        history.child(jcr::VERSION_LABELS).set_primary_type(jcr::NT_VERSION_LABELS);
        let root_version = history.child(jcr::ROOT_VERSION);
        init_version(root_version, &[]);
        freeze(root_version.child(jcr::FROZEN_NODE), node, false);
    }
    history
}

fn builder_identifier(node: &NodeBuilder) -> Result<String> {
    node.property(jcr::UUID)
        .and_then(|p| p.value())
        .map(|v| v.to_string())
        .ok_or_else(|| VaultError::Repository(format!("{} has no identifier", node.name())))
}

fn init_version(version: &mut NodeBuilder, predecessors: &[String]) {
    version.set_primary_type(jcr::NT_VERSION);
    version.set_property(Property::string(jcr::UUID, new_identifier()));
    version.set_property(Property::new(jcr::CREATED, Value::now()));
    version.set_property(Property::references(jcr::PREDECESSORS, predecessors));
    version.set_property(Property::references(jcr::SUCCESSORS, &[]));
}

fn freeze(target: &mut NodeBuilder, source: &ContentNode, with_content: bool) {
    target.set_primary_type(jcr::NT_FROZEN_NODE);
    target.set_property(Property::string(jcr::UUID, new_identifier()));
    target.set_property(Property::new(
        jcr::FROZEN_PRIMARY_TYPE,
        Value::Name(source.primary_type.clone()),
    ));
    target.set_property(Property::names(jcr::FROZEN_MIXIN_TYPES, &source.mixins));
    if let Some(id) = source.identifier() {
        target.set_property(Property::string(jcr::FROZEN_UUID, id));
    }
    if with_content {
        for property in source.properties.iter().filter(|p| p.name() != jcr::UUID) {
            target.set_property(property.clone());
        }
        for child in &source.children {
            freeze(target.child(&child.name), child, true);
        }
    }
}

impl Session for MemorySession {
    fn node(&self, path: &str) -> Result<Option<&ContentNode>> {
        Ok(self.root.descendant(path))
    }

    fn add_node(&mut self, parent: &str, name: &str, primary_type: &str) -> Result<String> {
        if name.is_empty() || name.contains('/') {
            return Err(VaultError::Repository(format!("invalid node name '{}'", name)));
        }
        let path = node::join(parent, name);
        let parent_node = self.node_mut(parent)?;
        if parent_node.has_child(name) {
            return Err(VaultError::ItemExists(path));
        }
        parent_node.children.push(ContentNode::new(name, primary_type));
        Ok(path)
    }

    fn remove_node(&mut self, path: &str) -> Result<()> {
        let name = node::name_of(path);
        if name.is_empty() {
            return Err(VaultError::Repository("cannot remove the root node".to_string()));
        }
        let parent = self.node_mut(node::parent_path(path))?;
        let index = parent
            .children
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| VaultError::NotFound(path.to_string()))?;
        parent.children.remove(index);
        Ok(())
    }

    fn move_node(&mut self, src: &str, dest: &str) -> Result<()> {
        let new_name = node::name_of(dest);
        if node::name_of(src).is_empty() || new_name.is_empty() {
            return Err(VaultError::Repository("cannot move the root node".to_string()));
        }
        if node::is_descendant_or_self(src, dest) {
            return Err(VaultError::Repository(format!("cannot move {} below itself", src)));
        }
        if self.node_exists(dest)? {
            return Err(VaultError::ItemExists(dest.to_string()));
        }
        let dest_parent = node::parent_path(dest);
        if !self.node_exists(dest_parent)? {
            return Err(VaultError::NotFound(dest_parent.to_string()));
        }
        let mut moved = self.require_node(src)?.clone();
        self.remove_node(src)?;
        moved.name = new_name.to_string();
        self.node_mut(dest_parent)?.children.push(moved);
        Ok(())
    }

    fn set_property(&mut self, path: &str, property: Property) -> Result<()> {
        let node = self.node_mut(path)?;
        match property.name() {
            jcr::PRIMARY_TYPE => {
                if let Some(value) = property.value() {
                    node.primary_type = value.to_string();
                }
            }
            jcr::MIXIN_TYPES => node.mixins = property.value_strings(),
            _ => node.set_property(property),
        }
        Ok(())
    }

    fn remove_property(&mut self, path: &str, name: &str) -> Result<()> {
        self.node_mut(path)?.remove_property(name);
        Ok(())
    }

    fn set_primary_type(&mut self, path: &str, primary_type: &str) -> Result<()> {
        self.node_mut(path)?.primary_type = primary_type.to_string();
        Ok(())
    }

    fn set_mixins(&mut self, path: &str, mixins: Vec<String>) -> Result<()> {
        self.node_mut(path)?.mixins = mixins;
        Ok(())
    }

    fn version_history(&self, path: &str) -> Result<Option<&ContentNode>> {
        let node = self.require_node(path)?;
        if !node.is_node_type(jcr::MIX_VERSIONABLE) {
            return Ok(None);
        }
        let Some(id) = node.identifier() else {
            return Ok(None);
        };
        let storage = self.root.descendant(jcr::VERSION_STORAGE_PATH);
        Ok(storage.and_then(|s| s.descendant(&version_history_path(id).join("/"))))
    }

    fn version_storage(&self) -> Result<NodeBuilder> {
        Ok(match self.root.descendant(jcr::VERSION_STORAGE_PATH) {
            Some(storage) => NodeBuilder::from_node(storage),
            None => NodeBuilder::new(jcr::VERSION_STORAGE, jcr::REP_VERSION_STORAGE),
        })
    }

    fn commit_version_storage(&mut self, storage: NodeBuilder) -> Result<()> {
        let mut storage = storage.build();
        storage.name = jcr::VERSION_STORAGE.to_string();
        if !self.root.has_child(jcr::SYSTEM) {
            self.root
                .children
                .push(ContentNode::new(jcr::SYSTEM, jcr::REP_SYSTEM));
        }
        let system = self.node_mut(&node::join("/", jcr::SYSTEM))?;
        match system.child_mut(jcr::VERSION_STORAGE) {
            Some(existing) => *existing = storage,
            None => system.children.push(storage),
        }
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        self.saved = self.root.clone();
        Ok(())
    }

    fn discard(&mut self) -> Result<()> {
        self.root = self.saved.clone();
        Ok(())
    }
}
