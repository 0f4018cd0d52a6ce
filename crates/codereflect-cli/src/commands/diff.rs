//! Diff command handler

use std::path::PathBuf;

use anyhow::{Context, Result};

use codereflect_core::diff;

use crate::output::Output;

/// Compare two files once and print where `incoming` diverges from `reference`
pub fn run(reference: PathBuf, incoming: PathBuf, output: &Output) -> Result<()> {
    let reference_text = std::fs::read_to_string(&reference)
        .with_context(|| format!("Failed to read {}", reference.display()))?;
    let incoming_text = std::fs::read_to_string(&incoming)
        .with_context(|| format!("Failed to read {}", incoming.display()))?;

    let ranges = diff::compare(&reference_text, &incoming_text);
    output.print_highlights(Some(&reference_text), &ranges);

    Ok(())
}
