//! Configuration documents
//!
//! Vault configuration (`dvault.json`) and workspace filter definitions
//! (`filter.json`). Missing fields fall back to their defaults.

use crate::acl::AccessControlHandling;
use crate::error::{Result, VaultError};
use crate::filter::ImportMode;
use crate::names::jcr;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level vault configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultConfig {
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub import: ImportOptions,
}

impl VaultConfig {
    /// Load a configuration file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)?;
        let config: VaultConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp_path = path.with_extension("tmp");
        let data = serde_json::to_string_pretty(self)?;
        fs::write(&tmp_path, &data)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Import options extended with the properties every aggregator leaves
    /// out of its exports
    pub fn import_options(&self) -> ImportOptions {
        let mut options = self.import.clone();
        for name in self.export.aggregators.iter().flat_map(|a| &a.ignored_properties) {
            if !options.ignored_properties.contains(name) {
                options.ignored_properties.push(name.clone());
            }
        }
        options
    }

    /// Reject configurations that cannot select aggregates unambiguously
    pub fn validate(&self) -> Result<()> {
        let defaults = self.export.aggregators.iter().filter(|a| a.default).count();
        if defaults != 1 {
            return Err(VaultError::Config(format!(
                "exactly one default aggregator required, found {}",
                defaults
            )));
        }
        Ok(())
    }
}

/// Export pass settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Emit version history sidecars for versionable aggregates
    #[serde(default = "default_true")]
    pub include_versions: bool,
    /// Aggregator definitions in matching order
    #[serde(default = "default_aggregators")]
    pub aggregators: Vec<AggregatorConfig>,
    /// Node types that are never exported; they are hinted instead
    #[serde(default = "default_ignored_types")]
    pub ignored_types: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_aggregators() -> Vec<AggregatorConfig> {
    vec![
        AggregatorConfig {
            name: "file".to_string(),
            match_types: vec!["nt:file".to_string()],
            full_coverage: true,
            ..Default::default()
        },
        AggregatorConfig {
            name: "content".to_string(),
            match_types: vec![jcr::NT_UNSTRUCTURED.to_string()],
            full_coverage: true,
            ..Default::default()
        },
        AggregatorConfig {
            name: "folder".to_string(),
            default: true,
            ..Default::default()
        },
    ]
}

fn default_ignored_types() -> Vec<String> {
    vec![
        jcr::REP_SYSTEM.to_string(),
        jcr::REP_ACL.to_string(),
        jcr::REP_CUG_POLICY.to_string(),
    ]
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            include_versions: true,
            aggregators: default_aggregators(),
            ignored_types: default_ignored_types(),
        }
    }
}

/// Definition of one generic aggregator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    pub name: String,
    /// Node types starting an aggregate (empty: any type)
    #[serde(default)]
    pub match_types: Vec<String>,
    /// Node types this aggregator never matches
    #[serde(default)]
    pub exclude_types: Vec<String>,
    /// Properties left out of the serialized content
    #[serde(default)]
    pub ignored_properties: Vec<String>,
    /// Whether the aggregate claims its entire subtree
    #[serde(default)]
    pub full_coverage: bool,
    /// Fallback aggregator for nodes no other aggregator matches
    #[serde(default)]
    pub default: bool,
}

/// Import pass settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportOptions {
    #[serde(default)]
    pub ac_handling: AccessControlHandling,
    /// Node type for folders created by the reconciler
    #[serde(default = "default_folder_type")]
    pub folder_type: String,
    /// Properties existing nodes keep on replace; exports never carry them
    #[serde(default)]
    pub ignored_properties: Vec<String>,
}

fn default_folder_type() -> String {
    jcr::NT_FOLDER.to_string()
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            ac_handling: AccessControlHandling::default(),
            folder_type: default_folder_type(),
            ignored_properties: Vec::new(),
        }
    }
}

/// Workspace filter definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub filters: Vec<FilterSetConfig>,
}

impl FilterConfig {
    /// Filter with one set covering `root`
    pub fn for_root(root: &str) -> Self {
        Self {
            filters: vec![FilterSetConfig {
                root: root.to_string(),
                mode: ImportMode::default(),
                rules: Vec::new(),
            }],
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSetConfig {
    pub root: String,
    #[serde(default)]
    pub mode: ImportMode,
    #[serde(default)]
    pub rules: Vec<FilterRule>,
}

/// `{"include": "<regex>"}` or `{"exclude": "<regex>"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterRule {
    Include(String),
    Exclude(String),
}
