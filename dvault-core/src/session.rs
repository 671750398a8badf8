//! Repository session contract
//!
//! The pipeline reads and writes the repository only through this trait.
//! One session is one write scope: changes stay transient until
//! [`Session::save`] and are dropped by [`Session::discard`].

use crate::error::{Result, VaultError};
use crate::node::{ContentNode, NodeBuilder};
use crate::value::Property;

/// Write session over a content repository
pub trait Session {
    /// Node at an absolute path
    fn node(&self, path: &str) -> Result<Option<&ContentNode>>;

    /// Whether a node exists at an absolute path
    fn node_exists(&self, path: &str) -> Result<bool> {
        Ok(self.node(path)?.is_some())
    }

    /// Node at an absolute path, or `NotFound`
    fn require_node(&self, path: &str) -> Result<&ContentNode> {
        self.node(path)?
            .ok_or_else(|| VaultError::NotFound(path.to_string()))
    }

    /// Create a child node and return its path
    fn add_node(&mut self, parent: &str, name: &str, primary_type: &str) -> Result<String>;

    /// Remove a node and its subtree
    fn remove_node(&mut self, path: &str) -> Result<()>;

    /// Move a node to a new absolute path (the destination must not exist)
    fn move_node(&mut self, src: &str, dest: &str) -> Result<()>;

    /// Set or replace a property
    fn set_property(&mut self, path: &str, property: Property) -> Result<()>;

    /// Remove a property; removing a missing property is not an error
    fn remove_property(&mut self, path: &str, name: &str) -> Result<()>;

    fn set_primary_type(&mut self, path: &str, primary_type: &str) -> Result<()>;

    fn set_mixins(&mut self, path: &str, mixins: Vec<String>) -> Result<()>;

    /// Version history of a versionable node, if one was created
    fn version_history(&self, path: &str) -> Result<Option<&ContentNode>>;

    /// Staged copy of the version storage tree
    fn version_storage(&self) -> Result<NodeBuilder>;

    /// Replace the version storage tree with a staged one in a single step
    fn commit_version_storage(&mut self, storage: NodeBuilder) -> Result<()>;

    /// Persist all transient changes
    fn save(&mut self) -> Result<()>;

    /// Drop all transient changes
    fn discard(&mut self) -> Result<()>;
}

/// Bucket names for a version history keyed by `token`
///
/// Successive two-character slices of the token: `abcdef12-...` gives
/// `["ab", "cd", "ef"]`. Short tokens give fewer buckets.
pub fn version_buckets(token: &str) -> Vec<String> {
    let chars: Vec<char> = token.chars().collect();
    chars
        .chunks(2)
        .take(3)
        .filter(|pair| pair.len() == 2)
        .map(|pair| pair.iter().collect())
        .collect()
}

/// Path of a version history relative to the version storage root
pub fn version_history_path(token: &str) -> Vec<String> {
    let mut path = version_buckets(token);
    path.push(token.to_string());
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_buckets() {
        assert_eq!(version_buckets("abcdef12-3456"), vec!["ab", "cd", "ef"]);
        assert_eq!(version_buckets("abc"), vec!["ab"]);
        assert!(version_buckets("").is_empty());
    }

    #[test]
    fn test_version_history_path() {
        assert_eq!(
            version_history_path("abcdef12"),
            vec!["ab", "cd", "ef", "abcdef12"]
        );
    }
}
