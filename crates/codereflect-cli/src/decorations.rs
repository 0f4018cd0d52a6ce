//! Terminal decoration sink
//!
//! A terminal cannot un-draw what it printed, so clearing is a no-op and
//! each highlight set is printed in full.

use std::sync::Arc;

use codereflect_core::{DecorationSink, DocumentSource, HighlightSet};

use crate::document::FileDocument;
use crate::output::Output;

/// Prints highlight sets against the reference file
pub struct TerminalDecorations {
    output: Output,
    reference: Arc<FileDocument>,
}

impl TerminalDecorations {
    pub fn new(output: Output, reference: Arc<FileDocument>) -> Self {
        Self { output, reference }
    }
}

impl DecorationSink for TerminalDecorations {
    fn apply_ranges(&self, ranges: &HighlightSet) {
        let text = self.reference.current_text();
        self.output.print_highlights(text.as_deref(), ranges);
    }

    fn clear_ranges(&self) {}
}
