//! Receive command handler

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};

use codereflect_core::{Config, DocumentSource, SessionController};

use super::with_hint;
use crate::decorations::TerminalDecorations;
use crate::document::FileDocument;
use crate::output::Output;

/// Listen for a sender and compare its snapshots against `file` until Ctrl-C
pub async fn run(
    mut config: Config,
    file: PathBuf,
    port: Option<u16>,
    bind: Option<String>,
    output: Output,
) -> Result<()> {
    if let Some(bind) = bind {
        config.bind_address = bind;
    }
    let port = port.unwrap_or(config.port);

    let document = Arc::new(FileDocument::new(&file));
    if document.current_text().is_none() {
        bail!("Cannot read reference file {}", file.display());
    }

    let sink = Arc::new(TerminalDecorations::new(output, document.clone()));
    let mut controller = SessionController::new(config, document, sink, Arc::new(output));

    let message = controller
        .start_receiver(&port.to_string())
        .await
        .map_err(with_hint)?;
    output.success(&message);
    output.message(&format!("Comparing against {} (Ctrl-C to stop)", file.display()));

    tokio::signal::ctrl_c().await?;

    output.message(&controller.stop_receiver().await);
    controller.shutdown().await;
    Ok(())
}
