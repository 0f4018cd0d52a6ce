//! File-backed document source and change watcher

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use codereflect_core::DocumentSource;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Document read from disk each time its text is needed
#[derive(Debug, Clone)]
pub struct FileDocument {
    path: PathBuf,
}

impl FileDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DocumentSource for FileDocument {
    fn current_text(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Some(text),
            Err(e) => {
                debug!("Cannot read {:?}: {}", self.path, e);
                None
            }
        }
    }
}

/// Emits an event whenever the watched file is written, created or removed
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    pub events: mpsc::UnboundedReceiver<()>,
}

impl FileWatcher {
    pub fn new(path: &Path) -> Result<Self> {
        let path = path
            .canonicalize()
            .with_context(|| format!("Cannot watch {:?}", path))?;
        let file_name = path.file_name().map(|n| n.to_os_string());
        // Saving by rename replaces the file, so watch its directory
        let dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => match event.kind {
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {
                        let ours = event
                            .paths
                            .iter()
                            .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                        if ours {
                            let _ = tx.send(());
                        }
                    }
                    _ => {}
                },
                Err(e) => warn!("Watch error: {:?}", e),
            }
        })
        .context("Failed to create file watcher")?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {:?}", dir))?;

        Ok(Self {
            _watcher: watcher,
            events: rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_document_reads_fresh() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("doc.rs");
        std::fs::write(&path, "fn a() {}").unwrap();

        let doc = FileDocument::new(&path);
        assert_eq!(doc.current_text().as_deref(), Some("fn a() {}"));

        std::fs::write(&path, "fn b() {}").unwrap();
        assert_eq!(doc.current_text().as_deref(), Some("fn b() {}"));
    }

    #[test]
    fn test_missing_file_has_no_text() {
        let doc = FileDocument::new("/nonexistent/doc.rs");
        assert!(doc.current_text().is_none());
    }

    #[tokio::test]
    async fn test_watcher_sees_write() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("watched.txt");
        std::fs::write(&path, "one").unwrap();

        let mut watcher = FileWatcher::new(&path).unwrap();
        std::fs::write(&path, "two").unwrap();

        let event = tokio::time::timeout(std::time::Duration::from_secs(5), watcher.events.recv()).await;
        assert!(matches!(event, Ok(Some(()))));
    }
}
