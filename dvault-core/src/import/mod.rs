//! Import pipeline
//!
//! Artifact sets are offered, in package order, to every handler of an
//! ordered chain. A handler returns `None` when the set is not for it; the
//! results of all accepting handlers are merged. The whole pass runs in one
//! session scope: saved on success, discarded on the first error.

mod docview;
mod folder;
mod rescue;
mod versions;

pub use docview::DocViewArtifactHandler;
pub use folder::FolderArtifactHandler;
pub use rescue::RescueTransformer;
pub use versions::VersionsImporter;

use crate::acl::RepAclManagement;
use crate::artifact::{ArtifactSet, ImportInfo};
use crate::config::ImportOptions;
use crate::error::Result;
use crate::filter::WorkspaceFilter;
use crate::listener::ProgressListener;
use crate::node;
use crate::session::Session;

/// Importer for one kind of artifact set
pub trait ArtifactHandler: Send + Sync {
    /// Import `artifacts` below `parent`; `None` if not applicable
    fn accept(
        &self,
        session: &mut dyn Session,
        filter: &dyn WorkspaceFilter,
        parent: &str,
        name: &str,
        artifacts: &ArtifactSet,
    ) -> Result<Option<ImportInfo>>;
}

/// Artifact set addressed to a parent path
pub trait ImportEntry {
    fn parent(&self) -> &str;
    fn name(&self) -> &str;
    fn artifacts(&self) -> &ArtifactSet;
}

/// Handler chain driving an import pass
pub struct Importer {
    handlers: Vec<Box<dyn ArtifactHandler>>,
}

impl Importer {
    pub fn new(handlers: Vec<Box<dyn ArtifactHandler>>) -> Self {
        Self { handlers }
    }

    /// DocView handler followed by the folder handler
    pub fn from_options(options: &ImportOptions) -> Self {
        Self::new(vec![
            Box::new(DocViewArtifactHandler::new().with_ignored_properties(options.ignored_properties.clone())),
            Box::new(FolderArtifactHandler::new(
                &options.folder_type,
                options.ac_handling,
                Box::new(RepAclManagement),
            )),
        ])
    }

    /// Offer one artifact set to every handler
    pub fn import_set(
        &self,
        session: &mut dyn Session,
        filter: &dyn WorkspaceFilter,
        parent: &str,
        name: &str,
        artifacts: &ArtifactSet,
    ) -> Result<ImportInfo> {
        let mut info = ImportInfo::new();
        let mut accepted = false;
        for handler in &self.handlers {
            if let Some(result) = handler.accept(session, filter, parent, name, artifacts)? {
                accepted = true;
                info.merge(result);
            }
        }
        if !accepted {
            tracing::warn!("no handler accepted artifacts for {}", node::join(parent, name));
        }
        Ok(info)
    }

    /// Import every entry in order and commit, or discard on error
    pub fn run<E: ImportEntry>(
        &self,
        session: &mut dyn Session,
        filter: &dyn WorkspaceFilter,
        entries: &[E],
        listener: &mut dyn ProgressListener,
    ) -> Result<ImportInfo> {
        let span = tracing::info_span!("import", entries = entries.len());
        let _enter = span.enter();
        tracing::info!("import started");

        let mut info = ImportInfo::new();
        for entry in entries {
            let path = node::join(entry.parent(), entry.name());
            match self.import_set(session, filter, entry.parent(), entry.name(), entry.artifacts()) {
                Ok(result) => {
                    listener.on_import_info(&result);
                    info.merge(result);
                }
                Err(e) => {
                    listener.on_error(&path, &e);
                    tracing::error!("import of {} failed, discarding changes: {}", path, e);
                    session.discard()?;
                    return Err(e);
                }
            }
        }
        session.save()?;
        tracing::info!(changes = info.len(), "import committed");
        Ok(info)
    }
}
