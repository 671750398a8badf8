//! Access control handling
//!
//! Access control nodes are never removed like ordinary content; the
//! reconciler routes them through an [`AclManagement`] implementation.

use crate::error::Result;
use crate::names::jcr;
use crate::node::{self, ContentNode};
use crate::session::Session;
use serde::{Deserialize, Serialize};

/// Policy for access control content found during import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessControlHandling {
    /// Replace existing policies with the imported ones
    Overwrite,
    /// Remove existing policies
    Clear,
    /// Leave existing policies untouched
    #[default]
    Ignore,
    /// Merge imported policies into existing ones
    Merge,
}

impl AccessControlHandling {
    /// Whether existing policies are removed under this handling
    pub fn removes_existing(&self) -> bool {
        matches!(self, AccessControlHandling::Overwrite | AccessControlHandling::Clear)
    }
}

impl std::str::FromStr for AccessControlHandling {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "overwrite" => Ok(Self::Overwrite),
            "clear" => Ok(Self::Clear),
            "ignore" => Ok(Self::Ignore),
            "merge" => Ok(Self::Merge),
            other => Err(format!("unknown access control handling '{}'", other)),
        }
    }
}

/// Access control node management
pub trait AclManagement: Send + Sync {
    /// Whether the node is an access control policy node
    fn is_acl_node(&self, node: &ContentNode) -> bool;

    /// Remove every access control policy of the node at `path`
    fn clear_acl(&self, session: &mut dyn Session, path: &str) -> Result<()>;
}

/// Policy node layout used by the repository: `rep:ACL` and `rep:CugPolicy`
/// children on `rep:AccessControllable` nodes
#[derive(Debug, Default, Clone, Copy)]
pub struct RepAclManagement;

impl AclManagement for RepAclManagement {
    fn is_acl_node(&self, node: &ContentNode) -> bool {
        node.is_node_type(jcr::REP_ACL) || node.is_node_type(jcr::REP_CUG_POLICY)
    }

    fn clear_acl(&self, session: &mut dyn Session, path: &str) -> Result<()> {
        let node = session.require_node(path)?;
        let policies: Vec<String> = node
            .children
            .iter()
            .filter(|c| self.is_acl_node(c))
            .map(|c| node::join(path, &c.name))
            .collect();
        let remaining: Option<Vec<String>> = node
            .mixins
            .iter()
            .any(|m| m == jcr::REP_ACCESS_CONTROLLABLE)
            .then(|| {
                node.mixins
                    .iter()
                    .filter(|m| *m != jcr::REP_ACCESS_CONTROLLABLE)
                    .cloned()
                    .collect()
            });
        for policy in &policies {
            tracing::debug!("removing access control policy {}", policy);
            session.remove_node(policy)?;
        }
        if let Some(mixins) = remaining {
            session.set_mixins(path, mixins)?;
        }
        Ok(())
    }
}
