//! Directory package layout
//!
//! ```text
//! <dir>/META-INF/vault/filter.json
//! <dir>/jcr_root/content/page/.content.xml
//! <dir>/jcr_root/content/page/.versions.xml
//! <dir>/jcr_root/content/page/_rep_policy.hint
//! ```
//!
//! Every aggregate gets a directory named by its platform-escaped path.
//! Reading a package yields one entry per directory, parents first and
//! siblings sorted by name. Child directories are reported as hints of their
//! parent entry so that folder reconciliation keeps them.

use crate::artifact::{
    Artifact, ArtifactSet, ArtifactType, DOT_CONTENT_XML, DOT_HINT, DOT_VERSIONS_XML,
    SerializationType,
};
use crate::config::FilterConfig;
use crate::error::{Result, VaultError};
use crate::export::ExportedAggregate;
use crate::filter::DefaultWorkspaceFilter;
use crate::import::ImportEntry;
use crate::names::{self, jcr};
use crate::node;
use crate::session::Session;
use bytes::Bytes;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const JCR_ROOT: &str = "jcr_root";
pub const FILTER_FILE: &str = "META-INF/vault/filter.json";

/// Artifact set read from one package directory
#[derive(Debug)]
pub struct PackageEntry {
    parent: String,
    name: String,
    artifacts: ArtifactSet,
}

impl PackageEntry {
    pub fn path(&self) -> String {
        node::join(&self.parent, &self.name)
    }
}

impl ImportEntry for PackageEntry {
    fn parent(&self) -> &str {
        &self.parent
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn artifacts(&self) -> &ArtifactSet {
        &self.artifacts
    }
}

#[derive(Debug)]
pub struct Package {
    entries: Vec<PackageEntry>,
    filter: FilterConfig,
}

impl Package {
    pub fn entries(&self) -> &[PackageEntry] {
        &self.entries
    }

    pub fn filter(&self) -> &FilterConfig {
        &self.filter
    }

    pub fn workspace_filter(&self) -> Result<DefaultWorkspaceFilter> {
        DefaultWorkspaceFilter::from_config(&self.filter)
    }
}

fn aggregate_dir(dir: &Path, path: &str) -> PathBuf {
    names::to_platform_path(path)
        .iter()
        .fold(dir.join(JCR_ROOT), |acc, segment| acc.join(segment))
}

/// Path of a hint relative to its aggregate node
fn hint_name<'a>(aggregate_name: &str, relative_path: &'a str) -> &'a str {
    if aggregate_name.is_empty() {
        return relative_path;
    }
    relative_path
        .strip_prefix(aggregate_name)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(relative_path)
}

/// Write exported aggregates as a directory package; returns the file count
pub fn write(
    dir: &Path,
    session: &dyn Session,
    exported: &[ExportedAggregate],
    filter: &FilterConfig,
) -> Result<usize> {
    let mut files = 0;
    for entry in exported {
        let target = aggregate_dir(dir, entry.aggregate.path());
        fs::create_dir_all(&target)?;
        for artifact in entry.artifacts.iter() {
            match artifact.artifact_type() {
                ArtifactType::Directory => {}
                ArtifactType::Primary | ArtifactType::Versions => {
                    fs::write(target.join(artifact.platform_path()), artifact.content(session)?)?;
                    files += 1;
                }
                ArtifactType::Hint => {
                    let name = hint_name(entry.aggregate.name(), artifact.relative_path());
                    let file = format!("{}{}", names::to_platform_name(name), DOT_HINT);
                    fs::write(target.join(file), b"")?;
                    files += 1;
                }
            }
        }
    }

    let filter_file = dir.join(FILTER_FILE);
    if let Some(parent) = filter_file.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&filter_file, serde_json::to_vec_pretty(filter)?)?;
    files += 1;

    tracing::info!("wrote {} file(s) for {} aggregate(s) to {}", files, exported.len(), dir.display());
    Ok(files)
}

/// Read a directory package
pub fn read(dir: &Path) -> Result<Package> {
    let filter_file = dir.join(FILTER_FILE);
    if !filter_file.is_file() {
        return Err(VaultError::Config(format!(
            "{} is not a package: {} is missing",
            dir.display(),
            FILTER_FILE
        )));
    }
    let filter = FilterConfig::load(&filter_file)?;

    let root = dir.join(JCR_ROOT);
    let mut entries = Vec::new();
    if root.is_dir() {
        read_dir(&root, "/", &mut entries)?;
    }
    tracing::debug!("read {} package entries from {}", entries.len(), dir.display());
    Ok(Package { entries, filter })
}

fn read_dir(fs_path: &Path, path: &str, out: &mut Vec<PackageEntry>) -> Result<()> {
    let mut files = Vec::new();
    let mut dirs = Vec::new();
    for dir_entry in fs::read_dir(fs_path)? {
        let dir_entry = dir_entry?;
        let file_name = dir_entry.file_name().to_string_lossy().into_owned();
        if dir_entry.file_type()?.is_dir() {
            dirs.push(file_name);
        } else {
            files.push(file_name);
        }
    }
    files.sort();
    dirs.sort();

    let name = node::name_of(path).to_string();
    let relative = |child: &str| node::join(&name, child).trim_start_matches('/').to_string();

    let mut artifacts = ArtifactSet::new();
    artifacts.add(Artifact::directory(&name))?;
    let mut hinted = BTreeSet::new();
    for file_name in &files {
        let file = fs_path.join(file_name);
        if file_name == DOT_CONTENT_XML {
            artifacts.add(Artifact::from_bytes(
                "",
                DOT_CONTENT_XML,
                ArtifactType::Primary,
                SerializationType::XmlDocView,
                Bytes::from(fs::read(&file)?),
            ))?;
        } else if let Some(stem) = file_name.strip_suffix(DOT_VERSIONS_XML) {
            let versioned = names::from_platform_name(stem);
            if !versioned.is_empty() && versioned != jcr::CONTENT {
                tracing::warn!("ignoring version sidecar {}", file.display());
                continue;
            }
            artifacts.add(Artifact::from_bytes(
                &versioned,
                DOT_VERSIONS_XML,
                ArtifactType::Versions,
                SerializationType::XmlGeneric,
                Bytes::from(fs::read(&file)?),
            ))?;
        } else if let Some(stem) = file_name.strip_suffix(DOT_HINT) {
            hinted.insert(names::from_platform_name(stem));
        } else {
            tracing::warn!("ignoring unknown package file {}", file.display());
        }
    }
    for dir_name in &dirs {
        hinted.insert(names::from_platform_name(dir_name));
    }
    for child in &hinted {
        artifacts.add(Artifact::hint(&relative(child)))?;
    }

    out.push(PackageEntry {
        parent: node::parent_path(path).to_string(),
        name,
        artifacts,
    });
    for dir_name in &dirs {
        let child = node::join(path, &names::from_platform_name(dir_name));
        read_dir(&fs_path.join(dir_name), &child, out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExportConfig;
    use crate::export::Exporter;
    use crate::listener::RecordingListener;
    use crate::memory::MemorySession;
    use crate::value::Property;
    use tempfile::TempDir;

    fn session() -> MemorySession {
        let mut s = MemorySession::new();
        s.add_node("/", "content", jcr::NT_FOLDER).unwrap();
        s.add_node("/content", "my page", jcr::NT_UNSTRUCTURED).unwrap();
        s.set_property("/content/my page", Property::string("title", "Home")).unwrap();
        s.add_node("/content/my page", "rep:policy", jcr::REP_ACL).unwrap();
        s.add_mixin("/content/my page", jcr::MIX_VERSIONABLE).unwrap();
        s.checkin("/content/my page").unwrap();
        s.add_node("/content", "docs", jcr::NT_FOLDER).unwrap();
        s
    }

    fn export_to(dir: &Path, s: &MemorySession) -> usize {
        let exported = Exporter::from_config(&ExportConfig::default())
            .export(s, "/content", &mut RecordingListener::default())
            .unwrap();
        write(dir, s, &exported, &FilterConfig::for_root("/content")).unwrap()
    }

    #[test]
    fn test_write_layout() {
        let dir = TempDir::new().unwrap();
        let s = session();
        let files = export_to(dir.path(), &s);

        let page = dir.path().join("jcr_root/content/my page");
        assert!(page.join(".content.xml").is_file());
        assert!(page.join(".versions.xml").is_file());
        assert!(page.join("_rep_policy.hint").is_file());
        assert!(dir.path().join("jcr_root/content/docs").is_dir());
        assert!(!dir.path().join("jcr_root/content/.content.xml").exists());
        assert!(dir.path().join(FILTER_FILE).is_file());
        assert_eq!(files, 4);
    }

    #[test]
    fn test_read_entries_parent_first() {
        let dir = TempDir::new().unwrap();
        let s = session();
        export_to(dir.path(), &s);

        let package = read(dir.path()).unwrap();
        let paths: Vec<String> = package.entries().iter().map(PackageEntry::path).collect();
        assert_eq!(paths, vec!["/", "/content", "/content/docs", "/content/my page"]);
        assert_eq!(package.filter(), &FilterConfig::for_root("/content"));

        let content = &package.entries()[1];
        assert_eq!(content.parent(), "/");
        assert_eq!(content.name(), "content");
        let hints: Vec<&str> = content.artifacts().hints().map(|h| h.relative_path()).collect();
        assert_eq!(hints, vec!["content/docs", "content/my page"]);
        assert_eq!(content.artifacts().size(), 1);

        let page = &package.entries()[3];
        let artifacts = page.artifacts();
        assert_eq!(artifacts.directory().map(|a| a.relative_path()), Some("my page"));
        assert_eq!(artifacts.primary().map(|a| a.relative_path()), Some(""));
        assert_eq!(artifacts.versions().map(|a| a.platform_path()), Some(".versions.xml".to_string()));
        let hints: Vec<&str> = artifacts.hints().map(|h| h.relative_path()).collect();
        assert_eq!(hints, vec!["my page/rep:policy"]);
    }

    #[test]
    fn test_read_requires_filter() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(JCR_ROOT)).unwrap();
        assert!(matches!(read(dir.path()), Err(VaultError::Config(_))));
    }

    #[test]
    fn test_hint_names_are_relative_to_aggregate() {
        assert_eq!(hint_name("page", "page/rep:policy"), "rep:policy");
        assert_eq!(hint_name("page", "page/par/rep:policy"), "par/rep:policy");
        assert_eq!(hint_name("", "rep:policy"), "rep:policy");
        let file = names::to_platform_name(hint_name("page", "page/par/rep:policy"));
        assert_eq!(names::from_platform_name(&file), "par/rep:policy");
    }
}
