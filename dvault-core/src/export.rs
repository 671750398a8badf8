//! Export pass: aggregates of a subtree and their artifacts

use crate::aggregator::{Aggregate, AggregatorManager};
use crate::artifact::ArtifactSet;
use crate::config::ExportConfig;
use crate::error::Result;
use crate::listener::ProgressListener;
use crate::session::Session;

/// One aggregate with the artifacts representing it
#[derive(Debug)]
pub struct ExportedAggregate {
    pub aggregate: Aggregate,
    pub artifacts: ArtifactSet,
}

#[derive(Debug, Clone)]
pub struct Exporter {
    manager: AggregatorManager,
}

impl Exporter {
    pub fn new(manager: AggregatorManager) -> Self {
        Self { manager }
    }

    pub fn from_config(config: &ExportConfig) -> Self {
        Self::new(AggregatorManager::from_config(config))
    }

    pub fn manager(&self) -> &AggregatorManager {
        &self.manager
    }

    /// Aggregates below `root` in source traversal order
    ///
    /// Artifact content is produced lazily; it reflects the session state at
    /// the time it is first read.
    pub fn export(
        &self,
        session: &dyn Session,
        root: &str,
        listener: &mut dyn ProgressListener,
    ) -> Result<Vec<ExportedAggregate>> {
        let span = tracing::info_span!("export", root);
        let _enter = span.enter();

        let aggregates = self.manager.collect(session, root)?;
        tracing::info!("exporting {} aggregate(s)", aggregates.len());

        let mut exported = Vec::with_capacity(aggregates.len());
        for aggregate in aggregates {
            let artifacts = match aggregate.create_artifacts(session) {
                Ok(artifacts) => artifacts,
                Err(e) => {
                    listener.on_error(aggregate.path(), &e);
                    return Err(e);
                }
            };
            listener.on_message("E", aggregate.path());
            exported.push(ExportedAggregate {
                aggregate,
                artifacts,
            });
        }
        Ok(exported)
    }
}
