//! Content tree model
//!
//! `ContentNode` is the owned snapshot of a repository node handed out by a
//! [`Session`](crate::session::Session). `NodeBuilder` is a detached, staged
//! tree used to prepare version storage changes before a single commit.

use crate::names::jcr;
use crate::value::{Property, Value};
use serde::{Deserialize, Serialize};

/// A repository node with its properties and ordered children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentNode {
    /// Node name (empty for the root node)
    pub name: String,
    /// Primary node type
    pub primary_type: String,
    /// Mixin node types
    #[serde(default)]
    pub mixins: Vec<String>,
    /// Properties in repository order
    #[serde(default, with = "crate::codec::serde_properties")]
    pub properties: Vec<Property>,
    /// Children in repository order
    #[serde(default)]
    pub children: Vec<ContentNode>,
}

impl ContentNode {
    /// Create an empty node
    pub fn new(name: impl Into<String>, primary_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_type: primary_type.into(),
            mixins: Vec::new(),
            properties: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style property setter
    pub fn with_property(mut self, property: Property) -> Self {
        self.set_property(property);
        self
    }

    /// Builder-style mixin setter
    pub fn with_mixin(mut self, mixin: impl Into<String>) -> Self {
        self.mixins.push(mixin.into());
        self
    }

    /// Builder-style child setter
    pub fn with_child(mut self, child: ContentNode) -> Self {
        self.children.push(child);
        self
    }

    /// Whether the node is of the given primary or mixin type
    pub fn is_node_type(&self, node_type: &str) -> bool {
        self.primary_type == node_type || self.mixins.iter().any(|m| m == node_type)
    }

    /// Stable identifier (the `jcr:uuid` property), if referenceable
    pub fn identifier(&self) -> Option<&str> {
        self.property(jcr::UUID).and_then(|p| p.value()).and_then(Value::as_str)
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name() == name)
    }

    /// Set a property, replacing an existing one in place
    pub fn set_property(&mut self, property: Property) {
        match self.properties.iter_mut().find(|p| p.name() == property.name()) {
            Some(existing) => *existing = property,
            None => self.properties.push(property),
        }
    }

    pub fn remove_property(&mut self, name: &str) -> Option<Property> {
        let index = self.properties.iter().position(|p| p.name() == name)?;
        Some(self.properties.remove(index))
    }

    pub fn child(&self, name: &str) -> Option<&ContentNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut ContentNode> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.child(name).is_some()
    }

    /// Descendant at a relative path (`a/b/c`)
    pub fn descendant(&self, relative: &str) -> Option<&ContentNode> {
        relative
            .split('/')
            .filter(|s| !s.is_empty())
            .try_fold(self, |node, name| node.child(name))
    }

    /// Mutable descendant at a relative path
    pub fn descendant_mut(&mut self, relative: &str) -> Option<&mut ContentNode> {
        relative
            .split('/')
            .filter(|s| !s.is_empty())
            .try_fold(self, |node, name| node.child_mut(name))
    }

    /// Number of nodes in this subtree, including this node
    pub fn subtree_size(&self) -> usize {
        1 + self.children.iter().map(ContentNode::subtree_size).sum::<usize>()
    }
}

/// Join a parent path and a child name
pub fn join(parent: &str, name: &str) -> String {
    if name.is_empty() {
        parent.to_string()
    } else if parent.is_empty() || parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent.trim_end_matches('/'), name)
    }
}

/// Parent of an absolute path (`/` for top-level nodes and the root)
pub fn parent_path(path: &str) -> &str {
    match path.trim_end_matches('/').rfind('/') {
        Some(0) | None => "/",
        Some(i) => &path[..i],
    }
}

/// Last segment of a path (empty for the root)
pub fn name_of(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Whether `path` equals `ancestor` or lies below it
pub fn is_descendant_or_self(ancestor: &str, path: &str) -> bool {
    if ancestor == "/" {
        return path.starts_with('/');
    }
    path == ancestor || path.strip_prefix(ancestor).is_some_and(|rest| rest.starts_with('/'))
}

/// Staged node of a detached tree
///
/// Children are created on demand with [`NodeBuilder::child`]; nodes created
/// that way report [`NodeBuilder::is_new`] until the tree is built.
#[derive(Debug, Clone)]
pub struct NodeBuilder {
    name: String,
    primary_type: Option<String>,
    mixins: Vec<String>,
    properties: Vec<Property>,
    children: Vec<NodeBuilder>,
    new: bool,
}

impl NodeBuilder {
    /// Start a fresh tree
    pub fn new(name: impl Into<String>, primary_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_type: Some(primary_type.into()),
            mixins: Vec::new(),
            properties: Vec::new(),
            children: Vec::new(),
            new: true,
        }
    }

    /// Stage an existing subtree
    pub fn from_node(node: &ContentNode) -> Self {
        Self {
            name: node.name.clone(),
            primary_type: Some(node.primary_type.clone()),
            mixins: node.mixins.clone(),
            properties: node.properties.clone(),
            children: node.children.iter().map(NodeBuilder::from_node).collect(),
            new: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_new(&self) -> bool {
        self.new
    }

    pub fn primary_type(&self) -> Option<&str> {
        self.primary_type.as_deref()
    }

    pub fn children(&self) -> &[NodeBuilder] {
        &self.children
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.children.iter().any(|c| c.name == name)
    }

    pub fn get_child(&self, name: &str) -> Option<&NodeBuilder> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn get_child_mut(&mut self, name: &str) -> Option<&mut NodeBuilder> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    /// Get or create the named child
    pub fn child(&mut self, name: &str) -> &mut NodeBuilder {
        let index = match self.children.iter().position(|c| c.name == name) {
            Some(index) => index,
            None => {
                self.children.push(NodeBuilder {
                    name: name.to_string(),
                    primary_type: None,
                    mixins: Vec::new(),
                    properties: Vec::new(),
                    children: Vec::new(),
                    new: true,
                });
                self.children.len() - 1
            }
        };
        &mut self.children[index]
    }

    /// Get or create every node along a relative name path
    pub fn descend(&mut self, names: &[String]) -> &mut NodeBuilder {
        names.iter().fold(self, |node, name| node.child(name))
    }

    pub fn set_primary_type(&mut self, primary_type: impl Into<String>) {
        self.primary_type = Some(primary_type.into());
    }

    pub fn set_mixins(&mut self, mixins: Vec<String>) {
        self.mixins = mixins;
    }

    pub fn set_property(&mut self, property: Property) {
        match self.properties.iter_mut().find(|p| p.name() == property.name()) {
            Some(existing) => *existing = property,
            None => self.properties.push(property),
        }
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name() == name)
    }

    /// Materialize the staged tree; untyped nodes become `nt:unstructured`
    pub fn build(self) -> ContentNode {
        ContentNode {
            name: self.name,
            primary_type: self
                .primary_type
                .unwrap_or_else(|| jcr::NT_UNSTRUCTURED.to_string()),
            mixins: self.mixins,
            properties: self.properties,
            children: self.children.into_iter().map(NodeBuilder::build).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_helpers() {
        assert_eq!(join("/", "content"), "/content");
        assert_eq!(join("/content", "site"), "/content/site");
        assert_eq!(join("/content", ""), "/content");
        assert_eq!(parent_path("/content/site"), "/content");
        assert_eq!(parent_path("/content"), "/");
        assert_eq!(parent_path("/"), "/");
        assert_eq!(name_of("/content/site"), "site");
        assert_eq!(name_of("/"), "");
    }

    #[test]
    fn test_descendant_or_self() {
        assert!(is_descendant_or_self("/a", "/a"));
        assert!(is_descendant_or_self("/a", "/a/b"));
        assert!(!is_descendant_or_self("/a", "/ab"));
        assert!(is_descendant_or_self("/", "/ab"));
    }

    #[test]
    fn test_node_properties_replace_in_place() {
        let mut node = ContentNode::new("n", "nt:unstructured")
            .with_property(Property::string("a", "1"))
            .with_property(Property::string("b", "2"));
        node.set_property(Property::string("a", "3"));
        assert_eq!(node.properties[0], Property::string("a", "3"));
        assert_eq!(node.properties.len(), 2);
        assert!(node.remove_property("b").is_some());
        assert!(node.property("b").is_none());
    }

    #[test]
    fn test_builder_reuses_existing_children() {
        let existing = ContentNode::new("root", "rep:versionStorage")
            .with_child(ContentNode::new("ab", "rep:versionStorage"));
        let mut builder = NodeBuilder::from_node(&existing);
        assert!(!builder.child("ab").is_new());
        assert!(builder.child("cd").is_new());
        let names = vec!["ab".to_string(), "x".to_string()];
        builder.descend(&names).set_property(Property::string("p", "v"));

        let built = builder.build();
        assert_eq!(built.children.len(), 2);
        let x = built.descendant("ab/x").unwrap();
        assert_eq!(x.primary_type, "nt:unstructured");
        assert_eq!(x.property("p"), Some(&Property::string("p", "v")));
    }
}
