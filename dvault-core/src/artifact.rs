//! Artifact model
//!
//! An aggregate is serialized as a set of artifacts. DIRECTORY and HINT
//! artifacts are addressed relative to the parent of the aggregate node
//! (`page`, `page/child`); PRIMARY and VERSIONS artifacts relative to the
//! aggregate node itself (`""`, `jcr:content`).

use crate::error::{Result, VaultError};
use crate::names;
use crate::session::Session;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::sync::{Arc, OnceLock};

/// File suffix of the primary DocView artifact
pub const DOT_CONTENT_XML: &str = ".content.xml";
/// File suffix of the version history sidecar
pub const DOT_VERSIONS_XML: &str = ".versions.xml";
/// File suffix of hint markers
pub const DOT_HINT: &str = ".hint";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactType {
    /// Serialized content of the aggregate
    Primary,
    /// Folder of the aggregate
    Directory,
    /// Version history sidecar
    Versions,
    /// Marker for a child left untouched by the pass
    Hint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializationType {
    /// DocView content tree
    XmlDocView,
    /// Generic XML (version history)
    XmlGeneric,
    /// No content
    None,
}

/// Producer of artifact content
pub trait Serializer: fmt::Debug + Send + Sync {
    fn serialization_type(&self) -> SerializationType;

    /// Write the serialized content; must not modify the repository
    fn write_content(&self, session: &dyn Session, out: &mut dyn Write) -> Result<()>;
}

#[derive(Debug, Clone)]
enum Source {
    Empty,
    Bytes(Bytes),
    Serializer(Arc<dyn Serializer>),
}

/// One named, typed output unit of an aggregate
#[derive(Debug)]
pub struct Artifact {
    relative_path: String,
    extension: String,
    artifact_type: ArtifactType,
    serialization: SerializationType,
    source: Source,
    content: OnceLock<Bytes>,
}

impl Artifact {
    fn with_source(
        relative_path: &str,
        extension: &str,
        artifact_type: ArtifactType,
        serialization: SerializationType,
        source: Source,
    ) -> Self {
        Self {
            relative_path: relative_path.to_string(),
            extension: extension.to_string(),
            artifact_type,
            serialization,
            source,
            content: OnceLock::new(),
        }
    }

    pub fn directory(relative_path: &str) -> Self {
        Self::with_source(
            relative_path,
            "",
            ArtifactType::Directory,
            SerializationType::None,
            Source::Empty,
        )
    }

    pub fn hint(relative_path: &str) -> Self {
        Self::with_source(
            relative_path,
            DOT_HINT,
            ArtifactType::Hint,
            SerializationType::None,
            Source::Empty,
        )
    }

    /// Artifact whose content is produced on first access
    pub fn serialized(
        relative_path: &str,
        extension: &str,
        artifact_type: ArtifactType,
        serializer: Arc<dyn Serializer>,
    ) -> Self {
        let serialization = serializer.serialization_type();
        Self::with_source(
            relative_path,
            extension,
            artifact_type,
            serialization,
            Source::Serializer(serializer),
        )
    }

    /// Artifact over already available content (e.g. read from a package)
    pub fn from_bytes(
        relative_path: &str,
        extension: &str,
        artifact_type: ArtifactType,
        serialization: SerializationType,
        data: Bytes,
    ) -> Self {
        Self::with_source(relative_path, extension, artifact_type, serialization, Source::Bytes(data))
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn artifact_type(&self) -> ArtifactType {
        self.artifact_type
    }

    pub fn serialization_type(&self) -> SerializationType {
        self.serialization
    }

    /// File name of the artifact in the package layout
    ///
    /// `""` + `.versions.xml` gives `.versions.xml`, `jcr:content` +
    /// `.versions.xml` gives `_jcr_content.versions.xml`.
    pub fn platform_path(&self) -> String {
        let mut path = names::to_platform_path(&self.relative_path).join("/");
        path.push_str(&self.extension);
        path
    }

    /// Artifact content, produced once and then immutable
    pub fn content(&self, session: &dyn Session) -> Result<Bytes> {
        if let Some(content) = self.content.get() {
            return Ok(content.clone());
        }
        let content = match &self.source {
            Source::Empty => Bytes::new(),
            Source::Bytes(data) => data.clone(),
            Source::Serializer(serializer) => {
                let mut out = Vec::new();
                serializer.write_content(session, &mut out)?;
                Bytes::from(out)
            }
        };
        Ok(self.content.get_or_init(|| content).clone())
    }
}

/// Artifacts produced for exactly one aggregate
///
/// Paths are unique, there is at most one DIRECTORY and at most one
/// VERSIONS artifact.
#[derive(Debug, Default)]
pub struct ArtifactSet {
    artifacts: Vec<Artifact>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an artifact, enforcing the set invariants
    pub fn add(&mut self, artifact: Artifact) -> Result<()> {
        let path = artifact.platform_path();
        if self.artifacts.iter().any(|a| a.platform_path() == path) {
            return Err(VaultError::Malformed(format!("duplicate artifact '{}'", path)));
        }
        for unique in [ArtifactType::Directory, ArtifactType::Versions] {
            if artifact.artifact_type == unique && self.first(unique).is_some() {
                return Err(VaultError::Malformed(format!(
                    "artifact set already has a {:?} artifact",
                    unique
                )));
            }
        }
        self.artifacts.push(artifact);
        Ok(())
    }

    fn first(&self, artifact_type: ArtifactType) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.artifact_type == artifact_type)
    }

    pub fn directory(&self) -> Option<&Artifact> {
        self.first(ArtifactType::Directory)
    }

    pub fn primary(&self) -> Option<&Artifact> {
        self.first(ArtifactType::Primary)
    }

    pub fn versions(&self) -> Option<&Artifact> {
        self.first(ArtifactType::Versions)
    }

    pub fn hints(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter().filter(|a| a.artifact_type == ArtifactType::Hint)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter()
    }

    /// Number of data artifacts; hints are not counted
    pub fn size(&self) -> usize {
        self.artifacts
            .iter()
            .filter(|a| a.artifact_type != ArtifactType::Hint)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

/// Kind of change applied to a path during import
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modification {
    Created,
    Modified,
    Replaced,
    Deleted,
}

/// Changes applied by an import, keyed by path
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportInfo {
    modifications: BTreeMap<String, Modification>,
}

impl ImportInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_created(&mut self, path: impl Into<String>) {
        self.modifications.insert(path.into(), Modification::Created);
    }

    pub fn on_modified(&mut self, path: impl Into<String>) {
        let path = path.into();
        // a node created in the same pass stays "created"
        if !self.modifications.contains_key(&path) {
            self.modifications.insert(path, Modification::Modified);
        }
    }

    pub fn on_replaced(&mut self, path: impl Into<String>) {
        self.modifications.insert(path.into(), Modification::Replaced);
    }

    pub fn on_deleted(&mut self, path: impl Into<String>) {
        self.modifications.insert(path.into(), Modification::Deleted);
    }

    pub fn get(&self, path: &str) -> Option<Modification> {
        self.modifications.get(path).copied()
    }

    /// Merge another result into this one; later entries win, except that
    /// a modification does not override an earlier creation
    pub fn merge(&mut self, other: ImportInfo) {
        for (path, modification) in other.modifications {
            match modification {
                Modification::Modified => self.on_modified(path),
                other => {
                    self.modifications.insert(path, other);
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.modifications.is_empty()
    }

    pub fn len(&self) -> usize {
        self.modifications.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Modification)> {
        self.modifications.iter().map(|(p, m)| (p.as_str(), *m))
    }
}
