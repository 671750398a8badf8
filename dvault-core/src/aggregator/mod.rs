//! Aggregators
//!
//! An aggregator decides where a serialized unit (an aggregate) starts, which
//! descendants and properties belong to it and which artifacts represent it.
//! Behavior is layered by wrapping: every configured aggregator is built as
//! `VersionAggregator(TracingAggregator(GenericAggregator))`.

mod decorator;
mod generic;
mod version;

pub use decorator::TracingAggregator;
pub use generic::GenericAggregator;
pub use version::VersionAggregator;

use crate::artifact::{ArtifactSet, ImportInfo};
use crate::config::ExportConfig;
use crate::error::{Result, VaultError};
use crate::node::{self, ContentNode};
use crate::session::Session;
use crate::value::Property;
use std::fmt;
use std::sync::Arc;

/// Aggregate selection and serialization capability
pub trait Aggregator: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Whether an aggregate handled by this aggregator starts at `node`
    fn matches(&self, node: &ContentNode, path: &str) -> bool;

    /// Whether a descendant of the aggregate root belongs to the aggregate
    /// (otherwise it starts a nested aggregate)
    fn includes(&self, root: &ContentNode, node: &ContentNode, path: &str) -> bool;

    /// Whether a property of `parent` is part of the serialized content
    fn includes_property(
        &self,
        root: &ContentNode,
        parent: &ContentNode,
        property: &Property,
        path: &str,
    ) -> bool;

    /// Whether the aggregate claims its entire subtree
    fn has_full_coverage(&self) -> bool;

    /// Whether this is the fallback aggregator
    fn is_default(&self) -> bool;

    fn create_artifacts(&self, session: &dyn Session, aggregate: &Aggregate) -> Result<ArtifactSet>;

    /// Remove the aggregate at `path`; non-recursive removal only drops the
    /// content this aggregator covers
    fn remove(
        &self,
        session: &mut dyn Session,
        path: &str,
        recursive: bool,
        try_save: bool,
    ) -> Result<ImportInfo>;
}

/// A node plus the aggregator that selected it
#[derive(Debug, Clone)]
pub struct Aggregate {
    path: String,
    aggregator: Arc<dyn Aggregator>,
    include_versions: bool,
    ignored_types: Arc<[String]>,
    nested: Vec<String>,
    hints: Vec<String>,
}

impl Aggregate {
    pub fn new(path: impl Into<String>, aggregator: Arc<dyn Aggregator>) -> Self {
        Self {
            path: path.into(),
            aggregator,
            include_versions: false,
            ignored_types: Arc::from(Vec::new()),
            nested: Vec::new(),
            hints: Vec::new(),
        }
    }

    pub fn with_versions(mut self, include_versions: bool) -> Self {
        self.include_versions = include_versions;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        node::name_of(&self.path)
    }

    pub fn aggregator(&self) -> &Arc<dyn Aggregator> {
        &self.aggregator
    }

    /// Whether the pass exports version histories
    pub fn include_versions(&self) -> bool {
        self.include_versions
    }

    /// Roots of the aggregates nested below this one
    pub fn nested(&self) -> &[String] {
        &self.nested
    }

    /// Paths of ignored descendants
    pub fn hints(&self) -> &[String] {
        &self.hints
    }

    pub fn is_ignored(&self, node: &ContentNode) -> bool {
        self.ignored_types.iter().any(|t| node.is_node_type(t))
    }

    /// Whether a descendant belongs to this aggregate's content
    pub fn includes_child(&self, root: &ContentNode, node: &ContentNode, path: &str) -> bool {
        !self.is_ignored(node)
            && (self.aggregator.has_full_coverage() || self.aggregator.includes(root, node, path))
    }

    pub fn create_artifacts(&self, session: &dyn Session) -> Result<ArtifactSet> {
        self.aggregator.create_artifacts(session, self)
    }

    /// Path of a descendant relative to the parent of the aggregate node
    pub fn relative_to_parent(&self, path: &str) -> String {
        let parent = node::parent_path(&self.path);
        path.strip_prefix(parent)
            .unwrap_or(path)
            .trim_start_matches('/')
            .to_string()
    }

    /// Every node path whose content this aggregate serializes
    pub fn included_paths(&self, session: &dyn Session) -> Result<Vec<String>> {
        let root = session.require_node(&self.path)?;
        let mut paths = vec![self.path.clone()];
        self.collect_included(root, root, &self.path, &mut paths);
        Ok(paths)
    }

    fn collect_included(&self, root: &ContentNode, node: &ContentNode, path: &str, out: &mut Vec<String>) {
        for child in &node.children {
            let child_path = node::join(path, &child.name);
            if self.includes_child(root, child, &child_path) {
                out.push(child_path.clone());
                self.collect_included(root, child, &child_path, out);
            }
        }
    }
}

/// Ordered set of aggregators with one fallback
#[derive(Debug, Clone)]
pub struct AggregatorManager {
    aggregators: Vec<Arc<dyn Aggregator>>,
    ignored_types: Arc<[String]>,
    include_versions: bool,
}

impl AggregatorManager {
    pub fn new(aggregators: Vec<Arc<dyn Aggregator>>, ignored_types: Vec<String>, include_versions: bool) -> Self {
        Self {
            aggregators,
            ignored_types: Arc::from(ignored_types),
            include_versions,
        }
    }

    /// Build the configured aggregator chain
    pub fn from_config(config: &ExportConfig) -> Self {
        let aggregators = config
            .aggregators
            .iter()
            .map(|c| {
                let generic = GenericAggregator::new(c.clone());
                Arc::new(VersionAggregator::new(Box::new(TracingAggregator::new(Box::new(generic)))))
                    as Arc<dyn Aggregator>
            })
            .collect();
        Self::new(aggregators, config.ignored_types.clone(), config.include_versions)
    }

    pub fn aggregators(&self) -> &[Arc<dyn Aggregator>] {
        &self.aggregators
    }

    pub fn is_ignored(&self, node: &ContentNode) -> bool {
        self.ignored_types.iter().any(|t| node.is_node_type(t))
    }

    /// Aggregator for an aggregate starting at `node`
    ///
    /// Two non-default aggregators matching the same node is a
    /// configuration error.
    pub fn find(&self, node: &ContentNode, path: &str) -> Result<Arc<dyn Aggregator>> {
        let mut matching = self
            .aggregators
            .iter()
            .filter(|a| !a.is_default() && a.matches(node, path));
        match (matching.next(), matching.next()) {
            (Some(first), Some(second)) => Err(VaultError::AmbiguousAggregate {
                path: path.to_string(),
                first: first.name().to_string(),
                second: second.name().to_string(),
            }),
            (Some(only), None) => Ok(only.clone()),
            _ => self
                .aggregators
                .iter()
                .find(|a| a.is_default() && a.matches(node, path))
                .cloned()
                .ok_or_else(|| VaultError::Config(format!("no aggregator matches {}", path))),
        }
    }

    /// Aggregates of the subtree at `path` in pre-order
    pub fn collect(&self, session: &dyn Session, path: &str) -> Result<Vec<Aggregate>> {
        let node = session.require_node(path)?;
        let mut aggregates = Vec::new();
        self.collect_into(node, path, &mut aggregates)?;
        Ok(aggregates)
    }

    fn collect_into(&self, node: &ContentNode, path: &str, out: &mut Vec<Aggregate>) -> Result<()> {
        let aggregator = self.find(node, path)?;
        tracing::debug!("aggregate {} handled by {}", path, aggregator.name());
        let mut aggregate = Aggregate {
            path: path.to_string(),
            aggregator,
            include_versions: self.include_versions,
            ignored_types: self.ignored_types.clone(),
            nested: Vec::new(),
            hints: Vec::new(),
        };
        let mut nested = Vec::new();
        let mut hints = Vec::new();
        claim(&aggregate, node, node, path, &mut nested, &mut hints);
        aggregate.nested = nested.iter().map(|(p, _)| p.clone()).collect();
        aggregate.hints = hints;
        out.push(aggregate);
        for (child_path, child) in nested {
            self.collect_into(child, &child_path, out)?;
        }
        Ok(())
    }
}

fn claim<'a>(
    aggregate: &Aggregate,
    root: &ContentNode,
    node: &'a ContentNode,
    path: &str,
    nested: &mut Vec<(String, &'a ContentNode)>,
    hints: &mut Vec<String>,
) {
    for child in &node.children {
        let child_path = node::join(path, &child.name);
        if aggregate.is_ignored(child) {
            hints.push(child_path);
        } else if aggregate.includes_child(root, child, &child_path) {
            claim(aggregate, root, child, &child_path, nested, hints);
        } else {
            nested.push((child_path, child));
        }
    }
}
