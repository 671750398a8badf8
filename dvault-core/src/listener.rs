//! Progress reporting for synchronization passes

use crate::artifact::{ImportInfo, Modification};
use crate::error::VaultError;

/// Receives per-path progress of a pass
pub trait ProgressListener: Send {
    /// `action` is a one-letter code: `A` added, `U` updated, `R` replaced,
    /// `D` deleted, `E` exported
    fn on_message(&mut self, action: &str, path: &str);

    fn on_error(&mut self, path: &str, error: &VaultError);

    /// Report every entry of an import result
    fn on_import_info(&mut self, info: &ImportInfo) {
        for (path, modification) in info.iter() {
            let action = match modification {
                Modification::Created => "A",
                Modification::Modified => "U",
                Modification::Replaced => "R",
                Modification::Deleted => "D",
            };
            self.on_message(action, path);
        }
    }
}

/// Listener emitting `tracing` events
#[derive(Debug, Default)]
pub struct TracingListener;

impl ProgressListener for TracingListener {
    fn on_message(&mut self, action: &str, path: &str) {
        tracing::info!(action, path, "progress");
    }

    fn on_error(&mut self, path: &str, error: &VaultError) {
        tracing::error!(path, %error, "failed");
    }
}

/// Listener collecting messages in memory
#[derive(Debug, Default)]
pub struct RecordingListener {
    pub messages: Vec<(String, String)>,
    pub errors: Vec<(String, String)>,
}

impl ProgressListener for RecordingListener {
    fn on_message(&mut self, action: &str, path: &str) {
        self.messages.push((action.to_string(), path.to_string()));
    }

    fn on_error(&mut self, path: &str, error: &VaultError) {
        self.errors.push((path.to_string(), error.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_info_is_reported() {
        let mut info = ImportInfo::new();
        info.on_created("/a");
        info.on_deleted("/b");
        let mut listener = RecordingListener::default();
        listener.on_import_info(&info);
        assert_eq!(
            listener.messages,
            vec![
                ("A".to_string(), "/a".to_string()),
                ("D".to_string(), "/b".to_string())
            ]
        );
    }
}
