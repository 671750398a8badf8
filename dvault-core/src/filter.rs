//! Workspace filter
//!
//! Decides which repository paths take part in a synchronization pass and
//! with which import mode.
//!
//! A filter is an ordered list of filter sets. Each set has a root path, an
//! import mode and an ordered list of include/exclude patterns:
//!
//! - no rules: everything at or below the root is contained
//! - otherwise a path starts out as the opposite of the first rule (a set
//!   starting with an include excludes by default) and the last matching
//!   rule wins
//!
//! The first set whose root covers a path decides for that path.

use crate::config::{FilterConfig, FilterRule, FilterSetConfig};
use crate::error::Result;
use crate::node::is_descendant_or_self;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Import mode of a filter set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// Content is replaced; existing items missing from the package are removed
    #[default]
    Replace,
    /// Only items missing in the repository are added
    Merge,
    /// Existing items are updated and missing ones added, nothing is removed
    Update,
}

/// Path scope and import policy of a pass
pub trait WorkspaceFilter: Send + Sync {
    /// Whether the path takes part in the pass
    fn contains(&self, path: &str) -> bool;

    /// Whether any filter root covers the path (regardless of rules)
    fn covers(&self, path: &str) -> bool;

    /// Import mode for a path
    fn import_mode(&self, path: &str) -> ImportMode;
}

#[derive(Debug, Clone)]
struct PathRule {
    include: bool,
    pattern: Regex,
}

/// One filter root with its rules
#[derive(Debug, Clone)]
pub struct PathFilterSet {
    root: String,
    mode: ImportMode,
    rules: Vec<PathRule>,
}

impl PathFilterSet {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            mode: ImportMode::default(),
            rules: Vec::new(),
        }
    }

    pub fn with_mode(mut self, mode: ImportMode) -> Self {
        self.mode = mode;
        self
    }

    /// Add an include rule; the pattern must match the whole path
    pub fn include(mut self, pattern: &str) -> Result<Self> {
        self.rules.push(PathRule {
            include: true,
            pattern: anchored(pattern)?,
        });
        Ok(self)
    }

    /// Add an exclude rule; the pattern must match the whole path
    pub fn exclude(mut self, pattern: &str) -> Result<Self> {
        self.rules.push(PathRule {
            include: false,
            pattern: anchored(pattern)?,
        });
        Ok(self)
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn mode(&self) -> ImportMode {
        self.mode
    }

    pub fn covers(&self, path: &str) -> bool {
        is_descendant_or_self(&self.root, path)
    }

    pub fn contains(&self, path: &str) -> bool {
        if !self.covers(path) {
            return false;
        }
        let Some(first) = self.rules.first() else {
            return true;
        };
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.pattern.is_match(path))
            .map(|rule| rule.include)
            .unwrap_or(!first.include)
    }

    fn from_config(config: &FilterSetConfig) -> Result<Self> {
        let mut set = PathFilterSet::new(config.root.clone()).with_mode(config.mode);
        for rule in &config.rules {
            set = match rule {
                FilterRule::Include(pattern) => set.include(pattern)?,
                FilterRule::Exclude(pattern) => set.exclude(pattern)?,
            };
        }
        Ok(set)
    }
}

fn anchored(pattern: &str) -> Result<Regex> {
    Ok(Regex::new(&format!("^(?:{})$", pattern))?)
}

/// Filter made of ordered filter sets
#[derive(Debug, Clone, Default)]
pub struct DefaultWorkspaceFilter {
    sets: Vec<PathFilterSet>,
}

impl DefaultWorkspaceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter containing everything below `root` in REPLACE mode
    pub fn for_root(root: &str) -> Self {
        Self::new().with_set(PathFilterSet::new(root))
    }

    pub fn with_set(mut self, set: PathFilterSet) -> Self {
        self.sets.push(set);
        self
    }

    pub fn from_config(config: &FilterConfig) -> Result<Self> {
        let sets = config
            .filters
            .iter()
            .map(PathFilterSet::from_config)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { sets })
    }

    pub fn sets(&self) -> &[PathFilterSet] {
        &self.sets
    }

    fn covering_set(&self, path: &str) -> Option<&PathFilterSet> {
        self.sets.iter().find(|s| s.covers(path))
    }
}

impl WorkspaceFilter for DefaultWorkspaceFilter {
    fn contains(&self, path: &str) -> bool {
        self.covering_set(path).is_some_and(|s| s.contains(path))
    }

    fn covers(&self, path: &str) -> bool {
        self.covering_set(path).is_some()
    }

    fn import_mode(&self, path: &str) -> ImportMode {
        self.covering_set(path).map(|s| s.mode()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_without_rules_contains_subtree() {
        let set = PathFilterSet::new("/content");
        assert!(set.contains("/content"));
        assert!(set.contains("/content/a/b"));
        assert!(!set.contains("/contentx"));
        assert!(!set.contains("/apps"));
    }

    #[test]
    fn test_first_rule_sets_default() {
        let set = PathFilterSet::new("/content").include("/content/a(/.*)?").unwrap();
        assert!(set.contains("/content/a/b"));
        assert!(!set.contains("/content/b"));

        let set = PathFilterSet::new("/content").exclude("/content/tmp(/.*)?").unwrap();
        assert!(set.contains("/content/b"));
        assert!(!set.contains("/content/tmp/x"));
    }

    #[test]
    fn test_last_matching_rule_wins() {
        let set = PathFilterSet::new("/content")
            .include("/content(/.*)?")
            .unwrap()
            .exclude("/content/private(/.*)?")
            .unwrap()
            .include("/content/private/shared")
            .unwrap();
        assert!(set.contains("/content/page"));
        assert!(!set.contains("/content/private/secret"));
        assert!(set.contains("/content/private/shared"));
    }

    #[test]
    fn test_first_covering_set_decides_mode() {
        let filter = DefaultWorkspaceFilter::new()
            .with_set(PathFilterSet::new("/content/keep").with_mode(ImportMode::Merge))
            .with_set(PathFilterSet::new("/content"));
        assert_eq!(filter.import_mode("/content/keep/a"), ImportMode::Merge);
        assert_eq!(filter.import_mode("/content/other"), ImportMode::Replace);
        assert!(filter.contains("/content/other"));
        assert!(!filter.covers("/apps"));
        assert!(!filter.contains("/apps"));
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let err = PathFilterSet::new("/").include("(").unwrap_err();
        assert!(matches!(err, crate::error::VaultError::Config(_)));
    }
}
