//! DVault Core Library
//!
//! Content synchronization between a hierarchical content repository and a
//! file-system package:
//! - Typed property codec and DocView serialization
//! - Aggregator chain deciding serialized units (aggregates)
//! - Version history sidecars and their streaming rebuild
//! - Import reconciliation (folders, DocView content, replace with rescue)
//! - Directory packages and an in-memory repository session

pub mod acl;
pub mod aggregator;
pub mod artifact;
pub mod codec;
pub mod config;
pub mod docview;
pub mod error;
pub mod export;
pub mod filter;
pub mod import;
pub mod listener;
pub mod memory;
pub mod names;
pub mod node;
pub mod package;
pub mod serializer;
pub mod session;
pub mod value;

pub use acl::{AccessControlHandling, AclManagement, RepAclManagement};
pub use aggregator::{Aggregate, Aggregator, AggregatorManager};
pub use artifact::{Artifact, ArtifactSet, ArtifactType, ImportInfo, Modification, SerializationType};
pub use config::{ExportConfig, FilterConfig, ImportOptions, VaultConfig};
pub use error::{Result, VaultError};
pub use export::{ExportedAggregate, Exporter};
pub use filter::{DefaultWorkspaceFilter, ImportMode, WorkspaceFilter};
pub use import::{ArtifactHandler, ImportEntry, Importer};
pub use listener::{ProgressListener, RecordingListener, TracingListener};
pub use memory::MemorySession;
pub use node::{ContentNode, NodeBuilder};
pub use package::{Package, PackageEntry};
pub use session::Session;
pub use value::{Property, PropertyType, Value};
