use super::{Aggregate, Aggregator};
use crate::artifact::{Artifact, ArtifactSet, ArtifactType, DOT_VERSIONS_XML, ImportInfo};
use crate::error::Result;
use crate::names::jcr;
use crate::node::ContentNode;
use crate::serializer::{Provenance, VersionsSerializer};
use crate::session::Session;
use crate::value::Property;
use std::sync::Arc;

/// Decorator adding a VERSIONS artifact for versionable aggregates
///
/// An aggregate is versionable when the pass includes versions and either
/// its `jcr:content` child or the node itself is `mix:versionable`. The
/// content child takes precedence.
#[derive(Debug)]
pub struct VersionAggregator {
    inner: Box<dyn Aggregator>,
}

impl VersionAggregator {
    pub fn new(inner: Box<dyn Aggregator>) -> Self {
        Self { inner }
    }

    fn provenance(node: &ContentNode) -> Option<Provenance> {
        if node
            .child(jcr::CONTENT)
            .is_some_and(|c| c.is_node_type(jcr::MIX_VERSIONABLE))
        {
            Some(Provenance::ContentChild)
        } else if node.is_node_type(jcr::MIX_VERSIONABLE) {
            Some(Provenance::Node)
        } else {
            None
        }
    }
}

impl Aggregator for VersionAggregator {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn matches(&self, node: &ContentNode, path: &str) -> bool {
        self.inner.matches(node, path)
    }

    fn includes(&self, root: &ContentNode, node: &ContentNode, path: &str) -> bool {
        self.inner.includes(root, node, path)
    }

    fn includes_property(
        &self,
        root: &ContentNode,
        parent: &ContentNode,
        property: &Property,
        path: &str,
    ) -> bool {
        self.inner.includes_property(root, parent, property, path)
    }

    fn has_full_coverage(&self) -> bool {
        self.inner.has_full_coverage()
    }

    fn is_default(&self) -> bool {
        self.inner.is_default()
    }

    fn create_artifacts(&self, session: &dyn Session, aggregate: &Aggregate) -> Result<ArtifactSet> {
        let mut artifacts = self.inner.create_artifacts(session, aggregate)?;
        if !aggregate.include_versions() {
            return Ok(artifacts);
        }
        let node = session.require_node(aggregate.path())?;
        let Some(provenance) = Self::provenance(node) else {
            return Ok(artifacts);
        };
        artifacts.add(Artifact::serialized(
            provenance.relative_path(),
            DOT_VERSIONS_XML,
            ArtifactType::Versions,
            Arc::new(VersionsSerializer::new(aggregate.path(), provenance)),
        ))?;
        Ok(artifacts)
    }

    fn remove(
        &self,
        session: &mut dyn Session,
        path: &str,
        recursive: bool,
        try_save: bool,
    ) -> Result<ImportInfo> {
        self.inner.remove(session, path, recursive, try_save)
    }
}
