//! Collaborator interfaces
//!
//! The core never talks to an editor or a screen directly. Whatever hosts
//! it supplies the current document, draws highlight ranges and shows
//! messages through these traits.

use std::sync::{Arc, Mutex};

use crate::diff::HighlightSet;

/// Source of the locally open document
pub trait DocumentSource: Send + Sync {
    /// Full text of the current document, or `None` if no document is open
    fn current_text(&self) -> Option<String>;
}

/// Draws divergence ranges onto the reference document
pub trait DecorationSink: Send + Sync {
    fn apply_ranges(&self, ranges: &HighlightSet);

    fn clear_ranges(&self);
}

/// User-facing notifications
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);

    fn notify_error(&self, message: &str);
}

/// Decoration state shared by the controller and the receiver
///
/// Each new highlight set fully replaces the previous one.
pub struct Decorations {
    sink: Arc<dyn DecorationSink>,
    /// Ranges currently drawn
    current: Mutex<HighlightSet>,
}

impl Decorations {
    pub fn new(sink: Arc<dyn DecorationSink>) -> Self {
        Self {
            sink,
            current: Mutex::new(HighlightSet::default()),
        }
    }

    /// Clear what is drawn, then draw `ranges`
    pub fn replace(&self, ranges: HighlightSet) {
        let mut current = self.lock();
        self.sink.clear_ranges();
        self.sink.apply_ranges(&ranges);
        *current = ranges;
    }

    /// Remove all drawn ranges
    pub fn clear(&self) {
        let mut current = self.lock();
        self.sink.clear_ranges();
        *current = HighlightSet::default();
    }

    /// Ranges currently drawn
    pub fn current(&self) -> HighlightSet {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HighlightSet> {
        // Poisoning only means a sink panicked; the set is always replaced whole
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Document source holding its text in memory
#[derive(Debug, Default)]
pub struct StaticDocument {
    text: Mutex<Option<String>>,
}

impl StaticDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Mutex::new(Some(text.into())),
        }
    }

    /// A source with no open document
    pub fn closed() -> Self {
        Self::default()
    }

    /// Replace the document text
    pub fn set_text(&self, text: impl Into<String>) {
        *self.text.lock().unwrap_or_else(|e| e.into_inner()) = Some(text.into());
    }
}

impl DocumentSource for StaticDocument {
    fn current_text(&self) -> Option<String> {
        self.text.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::DivergenceRange;

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<String>>,
    }

    impl DecorationSink for RecordingSink {
        fn apply_ranges(&self, ranges: &HighlightSet) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("apply {}", ranges.len()));
        }

        fn clear_ranges(&self) {
            self.calls.lock().unwrap().push("clear".to_string());
        }
    }

    #[test]
    fn test_replace_clears_first() {
        let sink = Arc::new(RecordingSink::default());
        let decorations = Decorations::new(sink.clone());

        decorations.replace(vec![DivergenceRange::new(0, 1, 2)].into());
        decorations.replace(HighlightSet::default());

        assert_eq!(
            *sink.calls.lock().unwrap(),
            vec!["clear", "apply 1", "clear", "apply 0"]
        );
        assert!(decorations.current().is_empty());
    }

    #[test]
    fn test_clear_drops_current() {
        let sink = Arc::new(RecordingSink::default());
        let decorations = Decorations::new(sink.clone());

        decorations.replace(vec![DivergenceRange::new(3, 0, 4)].into());
        assert_eq!(decorations.current().len(), 1);

        decorations.clear();
        assert!(decorations.current().is_empty());
        assert_eq!(sink.calls.lock().unwrap().last().unwrap(), "clear");
    }

    #[test]
    fn test_static_document() {
        let doc = StaticDocument::closed();
        assert_eq!(doc.current_text(), None);

        doc.set_text("hello");
        assert_eq!(doc.current_text().as_deref(), Some("hello"));
    }
}
