use super::ArtifactHandler;
use super::versions::VersionsImporter;
use crate::acl::{AccessControlHandling, AclManagement};
use crate::artifact::{ArtifactSet, ImportInfo, SerializationType};
use crate::error::Result;
use crate::filter::{ImportMode, WorkspaceFilter};
use crate::node;
use crate::session::Session;
use std::collections::HashSet;

/// Reconciles a folder with the artifact set describing it
///
/// Handles sets made of a DIRECTORY artifact alone or together with a
/// VERSIONS artifact (hints do not count). A missing folder is created; an
/// existing folder either gets its version history rebuilt or, for plain
/// folders, loses every child that is in scope, in REPLACE mode and neither
/// hinted nor protected by the access control handling.
pub struct FolderArtifactHandler {
    node_type: String,
    ac_handling: AccessControlHandling,
    acl: Box<dyn AclManagement>,
}

impl FolderArtifactHandler {
    pub fn new(node_type: &str, ac_handling: AccessControlHandling, acl: Box<dyn AclManagement>) -> Self {
        Self {
            node_type: node_type.to_string(),
            ac_handling,
            acl,
        }
    }

    fn sync_children(
        &self,
        session: &mut dyn Session,
        filter: &dyn WorkspaceFilter,
        parent: &str,
        path: &str,
        artifacts: &ArtifactSet,
        info: &mut ImportInfo,
    ) -> Result<()> {
        let hints: HashSet<String> = artifacts
            .hints()
            .map(|a| node::join(parent, a.relative_path()))
            .collect();

        let folder = session.require_node(path)?;
        let children: Vec<(String, bool)> = folder
            .children
            .iter()
            .map(|c| (node::join(path, &c.name), self.acl.is_acl_node(c)))
            .collect();

        for (child, is_acl) in children {
            if !filter.contains(&child) || filter.import_mode(&child) != ImportMode::Replace {
                continue;
            }
            if !hints.contains(&child) {
                if is_acl {
                    if self.ac_handling.removes_existing() {
                        info.on_deleted(child.as_str());
                        self.acl.clear_acl(session, path)?;
                    }
                } else {
                    tracing::debug!("removing {}, not present in source", child);
                    info.on_deleted(child.as_str());
                    session.remove_node(&child)?;
                }
            } else if self.ac_handling == AccessControlHandling::Clear && is_acl {
                info.on_deleted(child.as_str());
                self.acl.clear_acl(session, path)?;
            }
        }
        Ok(())
    }
}

impl ArtifactHandler for FolderArtifactHandler {
    fn accept(
        &self,
        session: &mut dyn Session,
        filter: &dyn WorkspaceFilter,
        parent: &str,
        _name: &str,
        artifacts: &ArtifactSet,
    ) -> Result<Option<ImportInfo>> {
        let Some(directory) = artifacts.directory() else {
            return Ok(None);
        };
        let versions = artifacts.versions();
        if artifacts.size() != 1 && versions.is_none() {
            return Ok(None);
        }

        let mut info = ImportInfo::new();
        let name = directory.relative_path();
        if name.is_empty() {
            // the set addresses the parent itself
            return Ok(Some(info));
        }
        let path = node::join(parent, name);
        if !session.node_exists(&path)? {
            let created = session.add_node(parent, name, &self.node_type)?;
            info.on_created(created);
        } else if let Some(versions) = versions {
            if versions.serialization_type() == SerializationType::XmlGeneric {
                let data = versions.content(&*session)?;
                if VersionsImporter::new().import(session, &data)? {
                    info.on_modified(path);
                }
            }
        } else {
            self.sync_children(session, filter, parent, &path, artifacts, &mut info)?;
        }
        Ok(Some(info))
    }
}
