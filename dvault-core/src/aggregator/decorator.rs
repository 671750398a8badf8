use super::{Aggregate, Aggregator};
use crate::artifact::{ArtifactSet, ImportInfo};
use crate::error::Result;
use crate::node::ContentNode;
use crate::session::Session;
use crate::value::Property;

/// Decorator reporting every aggregator call as a `tracing` event
///
/// Every call is forwarded unchanged to the wrapped aggregator; results and
/// errors are passed through as they are.
#[derive(Debug)]
pub struct TracingAggregator {
    inner: Box<dyn Aggregator>,
}

impl TracingAggregator {
    pub fn new(inner: Box<dyn Aggregator>) -> Self {
        Self { inner }
    }
}

impl Aggregator for TracingAggregator {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn matches(&self, node: &ContentNode, path: &str) -> bool {
        let matched = self.inner.matches(node, path);
        tracing::trace!(aggregator = self.name(), path, matched, "matches");
        matched
    }

    fn includes(&self, root: &ContentNode, node: &ContentNode, path: &str) -> bool {
        let included = self.inner.includes(root, node, path);
        tracing::trace!(aggregator = self.name(), path, included, "includes");
        included
    }

    fn includes_property(
        &self,
        root: &ContentNode,
        parent: &ContentNode,
        property: &Property,
        path: &str,
    ) -> bool {
        let included = self.inner.includes_property(root, parent, property, path);
        tracing::trace!(
            aggregator = self.name(),
            path,
            property = property.name(),
            included,
            "includes property"
        );
        included
    }

    fn has_full_coverage(&self) -> bool {
        self.inner.has_full_coverage()
    }

    fn is_default(&self) -> bool {
        self.inner.is_default()
    }

    fn create_artifacts(&self, session: &dyn Session, aggregate: &Aggregate) -> Result<ArtifactSet> {
        let result = self.inner.create_artifacts(session, aggregate);
        match &result {
            Ok(artifacts) => tracing::debug!(
                aggregator = self.name(),
                path = aggregate.path(),
                artifacts = artifacts.size(),
                hints = artifacts.hints().count(),
                "created artifacts"
            ),
            Err(e) => tracing::debug!(
                aggregator = self.name(),
                path = aggregate.path(),
                error = %e,
                "create artifacts failed"
            ),
        }
        result
    }

    fn remove(
        &self,
        session: &mut dyn Session,
        path: &str,
        recursive: bool,
        try_save: bool,
    ) -> Result<ImportInfo> {
        tracing::debug!(aggregator = self.name(), path, recursive, try_save, "remove");
        self.inner.remove(session, path, recursive, try_save)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::GenericAggregator;
    use crate::config::AggregatorConfig;
    use crate::memory::MemorySession;
    use std::sync::Arc;

    #[test]
    fn test_forwards_every_call() {
        let generic = GenericAggregator::new(AggregatorConfig {
            name: "content".to_string(),
            match_types: vec!["nt:unstructured".to_string()],
            ignored_properties: vec!["secret".to_string()],
            full_coverage: true,
            ..Default::default()
        });
        let traced = TracingAggregator::new(Box::new(generic.clone()));
        let node = ContentNode::new("a", "nt:unstructured");
        let secret = Property::string("secret", "x");

        assert_eq!(traced.name(), generic.name());
        assert_eq!(traced.matches(&node, "/a"), generic.matches(&node, "/a"));
        assert_eq!(traced.includes(&node, &node, "/a/b"), generic.includes(&node, &node, "/a/b"));
        assert_eq!(
            traced.includes_property(&node, &node, &secret, "/a"),
            generic.includes_property(&node, &node, &secret, "/a")
        );
        assert_eq!(traced.has_full_coverage(), generic.has_full_coverage());
        assert_eq!(traced.is_default(), generic.is_default());
    }

    #[test]
    fn test_errors_pass_through() {
        let session = MemorySession::new();
        let traced: Arc<dyn Aggregator> = Arc::new(TracingAggregator::new(Box::new(
            GenericAggregator::new(AggregatorConfig::default()),
        )));
        let aggregate = Aggregate::new("/missing", traced.clone());
        assert!(matches!(
            traced.create_artifacts(&session, &aggregate),
            Err(crate::error::VaultError::NotFound(_))
        ));
    }
}
