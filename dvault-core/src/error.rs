//! Error types for the synchronization pipeline
//!
//! Errors fall into three groups: structural problems with serialized
//! content, policy/configuration conflicts, and failures reported by the
//! repository store. None of them is ever downgraded to a warning.

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// Errors that can occur while exporting or importing content
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Malformed content: {0}")]
    Malformed(String),

    #[error("Missing attribute '{attribute}' on element <{element}>")]
    MissingAttribute { element: String, attribute: String },

    #[error("Invalid {type_name} value '{value}': {reason}")]
    InvalidValue {
        type_name: String,
        value: String,
        reason: String,
    },

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Ambiguous aggregate coverage at {path}: matched by both '{first}' and '{second}'")]
    AmbiguousAggregate {
        path: String,
        first: String,
        second: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Node not found: {0}")]
    NotFound(String),

    #[error("Item already exists: {0}")]
    ItemExists(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VaultError {
    pub(crate) fn invalid_value(type_name: &str, value: &str, reason: impl ToString) -> Self {
        VaultError::InvalidValue {
            type_name: type_name.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn missing_attribute(element: &str, attribute: &str) -> Self {
        VaultError::MissingAttribute {
            element: element.to_string(),
            attribute: attribute.to_string(),
        }
    }

    /// Whether this error describes broken serialized input rather than a
    /// store or configuration failure
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            VaultError::Malformed(_)
                | VaultError::MissingAttribute { .. }
                | VaultError::InvalidValue { .. }
                | VaultError::Xml(_)
        )
    }
}

impl From<quick_xml::events::attributes::AttrError> for VaultError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        VaultError::Xml(quick_xml::Error::from(e))
    }
}

impl From<regex::Error> for VaultError {
    fn from(e: regex::Error) -> Self {
        VaultError::Config(format!("invalid filter pattern: {}", e))
    }
}
