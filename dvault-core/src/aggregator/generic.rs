use super::{Aggregate, Aggregator};
use crate::artifact::{Artifact, ArtifactSet, ArtifactType, DOT_CONTENT_XML, ImportInfo};
use crate::config::AggregatorConfig;
use crate::error::Result;
use crate::names::jcr;
use crate::node::{self, ContentNode};
use crate::serializer::DocViewSerializer;
use crate::session::Session;
use crate::value::Property;
use std::sync::Arc;

/// Aggregator driven by an [`AggregatorConfig`]
///
/// A full-coverage aggregate serializes its whole subtree; otherwise only the
/// node itself and every child starts a nested aggregate. Artifacts are a
/// DIRECTORY, a PRIMARY DocView (left out for plain folders) and a HINT per
/// ignored descendant.
#[derive(Debug, Clone)]
pub struct GenericAggregator {
    config: AggregatorConfig,
}

impl GenericAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    /// Folders without mixins or serialized properties need no content file
    fn is_plain_folder(&self, node: &ContentNode) -> bool {
        !self.config.full_coverage
            && node.primary_type == jcr::NT_FOLDER
            && node.mixins.is_empty()
            && node
                .properties
                .iter()
                .all(|p| self.config.ignored_properties.iter().any(|i| i == p.name()))
    }
}

impl Aggregator for GenericAggregator {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn matches(&self, node: &ContentNode, _path: &str) -> bool {
        if self.config.exclude_types.iter().any(|t| node.is_node_type(t)) {
            return false;
        }
        self.config.match_types.is_empty()
            || self.config.match_types.iter().any(|t| node.is_node_type(t))
    }

    fn includes(&self, _root: &ContentNode, _node: &ContentNode, _path: &str) -> bool {
        self.config.full_coverage
    }

    fn includes_property(
        &self,
        _root: &ContentNode,
        _parent: &ContentNode,
        property: &Property,
        _path: &str,
    ) -> bool {
        !self
            .config
            .ignored_properties
            .iter()
            .any(|i| i == property.name())
    }

    fn has_full_coverage(&self) -> bool {
        self.config.full_coverage
    }

    fn is_default(&self) -> bool {
        self.config.default
    }

    fn create_artifacts(&self, session: &dyn Session, aggregate: &Aggregate) -> Result<ArtifactSet> {
        let node = session.require_node(aggregate.path())?;
        let mut artifacts = ArtifactSet::new();
        artifacts.add(Artifact::directory(aggregate.name()))?;
        if !self.is_plain_folder(node) {
            artifacts.add(Artifact::serialized(
                "",
                DOT_CONTENT_XML,
                ArtifactType::Primary,
                Arc::new(DocViewSerializer::new(aggregate.clone())),
            ))?;
        }
        for hint in aggregate.hints() {
            artifacts.add(Artifact::hint(&aggregate.relative_to_parent(hint)))?;
        }
        Ok(artifacts)
    }

    fn remove(
        &self,
        session: &mut dyn Session,
        path: &str,
        recursive: bool,
        try_save: bool,
    ) -> Result<ImportInfo> {
        let mut info = ImportInfo::new();
        if recursive {
            session.remove_node(path)?;
            info.on_deleted(path);
        } else {
            let node = session.require_node(path)?;
            let children: Vec<String> = if self.config.full_coverage {
                node.children
                    .iter()
                    .map(|c| node::join(path, &c.name))
                    .collect()
            } else {
                Vec::new()
            };
            let properties: Vec<String> = node
                .properties
                .iter()
                .filter(|p| self.includes_property(node, node, p, path))
                .filter(|p| p.name() != jcr::UUID)
                .map(|p| p.name().to_string())
                .collect();
            for child in children {
                session.remove_node(&child)?;
                info.on_deleted(child);
            }
            for name in &properties {
                session.remove_property(path, name)?;
            }
            info.on_modified(path);
        }
        if try_save {
            session.save()?;
        }
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySession;

    fn config(name: &str, full_coverage: bool) -> AggregatorConfig {
        AggregatorConfig {
            name: name.to_string(),
            match_types: vec!["nt:unstructured".to_string()],
            exclude_types: vec!["nt:file".to_string()],
            ignored_properties: vec!["secret".to_string()],
            full_coverage,
            default: false,
        }
    }

    #[test]
    fn test_matches_by_type() {
        let aggregator = GenericAggregator::new(config("content", true));
        assert!(aggregator.matches(&ContentNode::new("a", "nt:unstructured"), "/a"));
        assert!(!aggregator.matches(&ContentNode::new("a", "nt:folder"), "/a"));
        let excluded = ContentNode::new("a", "nt:file").with_mixin("nt:unstructured");
        assert!(!aggregator.matches(&excluded, "/a"));
    }

    #[test]
    fn test_ignored_properties() {
        let aggregator = GenericAggregator::new(config("content", true));
        let node = ContentNode::new("a", "nt:unstructured");
        assert!(!aggregator.includes_property(&node, &node, &Property::string("secret", "x"), "/a"));
        assert!(aggregator.includes_property(&node, &node, &Property::string("title", "x"), "/a"));
    }

    #[test]
    fn test_plain_folder_has_no_primary() {
        let mut session = MemorySession::new();
        session.add_node("/", "folder", "nt:folder").unwrap();
        let aggregator: Arc<dyn Aggregator> = Arc::new(GenericAggregator::new(AggregatorConfig {
            name: "folder".to_string(),
            default: true,
            ..Default::default()
        }));
        let aggregate = Aggregate::new("/folder", aggregator.clone());
        let artifacts = aggregator.create_artifacts(&session, &aggregate).unwrap();
        assert_eq!(artifacts.directory().map(|a| a.relative_path()), Some("folder"));
        assert!(artifacts.primary().is_none());

        session
            .set_property("/folder", Property::string("title", "Folder"))
            .unwrap();
        let artifacts = aggregator.create_artifacts(&session, &aggregate).unwrap();
        assert!(artifacts.primary().is_some());
    }

    #[test]
    fn test_remove_non_recursive_keeps_node() {
        let mut session = MemorySession::new();
        session.add_node("/", "page", "nt:unstructured").unwrap();
        session.add_node("/page", "par", "nt:unstructured").unwrap();
        session.set_property("/page", Property::string("title", "x")).unwrap();
        let aggregator = GenericAggregator::new(config("content", true));

        let info = aggregator.remove(&mut session, "/page", false, false).unwrap();
        let page = session.require_node("/page").unwrap();
        assert!(page.children.is_empty());
        assert!(page.property("title").is_none());
        assert_eq!(info.get("/page/par"), Some(crate::artifact::Modification::Deleted));

        aggregator.remove(&mut session, "/page", true, true).unwrap();
        assert!(!session.node_exists("/page").unwrap());
        assert!(!session.has_pending_changes());
    }
}
