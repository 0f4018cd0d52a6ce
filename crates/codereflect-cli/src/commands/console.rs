//! Interactive console
//!
//! Reads session commands from stdin, one per line, while forwarding
//! changes of the local file to the sender.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use codereflect_core::{Config, SessionController, SessionRole};

use super::with_hint;
use crate::decorations::TerminalDecorations;
use crate::document::{FileDocument, FileWatcher};
use crate::output::Output;

const HELP: &str = "\
Commands:
  receiver start [port]     Listen for a sender (default port from config)
  receiver stop             Stop listening
  sender start <host:port>  Mirror the file to a receiver
  sender stop               Disconnect from the receiver
  status                    Show session states
  help                      Show this help
  quit                      Stop everything and exit";

/// A parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    StartReceiver(Option<String>),
    StopReceiver,
    StartSender(String),
    StopSender,
    Status,
    Help,
    Quit,
}

/// Parse one console line; `None` for a blank line
pub fn parse_command(line: &str) -> Option<Result<ConsoleCommand, String>> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let command = match words.as_slice() {
        [] => return None,
        ["receiver", "start"] => Ok(ConsoleCommand::StartReceiver(None)),
        ["receiver", "start", port] => Ok(ConsoleCommand::StartReceiver(Some(port.to_string()))),
        ["receiver", "stop"] => Ok(ConsoleCommand::StopReceiver),
        ["sender", "start", address] => Ok(ConsoleCommand::StartSender(address.to_string())),
        ["sender", "start"] => Err("Usage: sender start <host:port>".to_string()),
        ["sender", "stop"] => Ok(ConsoleCommand::StopSender),
        ["status"] => Ok(ConsoleCommand::Status),
        ["help"] | ["?"] => Ok(ConsoleCommand::Help),
        ["quit"] | ["exit"] => Ok(ConsoleCommand::Quit),
        _ => Err(format!("Unknown command: '{}'. Type 'help'.", line.trim())),
    };
    Some(command)
}

/// Run the console until `quit`, end of input or Ctrl-C
pub async fn run(config: Config, file: PathBuf, output: Output) -> Result<()> {
    let default_port = config.port;
    let document = Arc::new(FileDocument::new(&file));
    let mut watcher = FileWatcher::new(&file)?;

    let sink = Arc::new(TerminalDecorations::new(output, document.clone()));
    let mut controller = SessionController::new(config, document, sink, Arc::new(output));

    output.message(&format!("Local document: {}", file.display()));
    output.message("Type 'help' for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let command = match parse_command(&line) {
                    None => continue,
                    Some(Ok(command)) => command,
                    Some(Err(usage)) => {
                        output.error(&usage);
                        continue;
                    }
                };
                if command == ConsoleCommand::Quit {
                    break;
                }
                execute(&mut controller, command, default_port, output).await;
            }
            Some(()) = watcher.events.recv() => controller.document_changed(),
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    controller.shutdown().await;
    Ok(())
}

async fn execute(
    controller: &mut SessionController,
    command: ConsoleCommand,
    default_port: u16,
    output: Output,
) {
    match command {
        ConsoleCommand::StartReceiver(port) => {
            let port = port.unwrap_or_else(|| default_port.to_string());
            match controller.start_receiver(&port).await {
                Ok(message) => output.success(&message),
                Err(e) => output.error(&with_hint(e).to_string()),
            }
        }
        ConsoleCommand::StopReceiver => output.message(&controller.stop_receiver().await),
        ConsoleCommand::StartSender(address) => match controller.start_sender(&address).await {
            Ok(message) => output.success(&message),
            Err(e) => output.error(&with_hint(e).to_string()),
        },
        ConsoleCommand::StopSender => output.message(&controller.stop_sender().await),
        ConsoleCommand::Status => {
            let receiver = controller.state(SessionRole::Receiver);
            let sender = controller.state(SessionRole::Sender);
            output.message(&format!("receiver: {}", receiver));
            output.message(&format!("sender:   {}", sender));
        }
        ConsoleCommand::Help => output.message(HELP),
        ConsoleCommand::Quit => {}
    }
}
