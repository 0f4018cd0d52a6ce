//! Send command handler

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use codereflect_core::{Config, SessionController, SessionState};

use super::with_hint;
use crate::decorations::TerminalDecorations;
use crate::document::{FileDocument, FileWatcher};
use crate::output::Output;

/// Mirror `file` to the receiver at `address` until Ctrl-C or disconnect
pub async fn run(config: Config, address: String, file: PathBuf, output: Output) -> Result<()> {
    let document = Arc::new(FileDocument::new(&file));
    let mut watcher = FileWatcher::new(&file)?;

    let sink = Arc::new(TerminalDecorations::new(output, document.clone()));
    let mut controller = SessionController::new(config, document, sink, Arc::new(output));

    let message = controller
        .start_sender(&address)
        .await
        .map_err(with_hint)?;
    output.success(&message);
    output.message(&format!("Mirroring {} (Ctrl-C to stop)", file.display()));

    let mut state = controller
        .sender()
        .map(|s| s.subscribe_state())
        .context("Sender session missing after start")?;

    loop {
        tokio::select! {
            Some(()) = watcher.events.recv() => controller.document_changed(),
            changed = state.changed() => {
                if changed.is_err() || *state.borrow() == SessionState::Closed {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                output.message(&controller.stop_sender().await);
                break;
            }
        }
    }

    controller.shutdown().await;
    Ok(())
}
