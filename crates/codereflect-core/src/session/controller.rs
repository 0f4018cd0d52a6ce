//! Session controller
//!
//! Owns at most one receiver and one sender and exposes the start/stop
//! command surface. Starting a role that is already running is rejected;
//! the caller stops it first.

use std::io;
use std::sync::Arc;

use tracing::info;

use super::receiver::ReceiverContext;
use super::sender::SenderContext;
use super::{ReceiverSession, SenderSession, SessionRole, SessionState};
use crate::collab::{DecorationSink, Decorations, DocumentSource, Notifier};
use crate::config::Config;
use crate::error::{ReflectError, ReflectResult};

/// Single entry point for starting and stopping sessions
pub struct SessionController {
    config: Config,
    document: Arc<dyn DocumentSource>,
    decorations: Arc<Decorations>,
    notifier: Arc<dyn Notifier>,
    receiver: Option<ReceiverSession>,
    sender: Option<SenderSession>,
}

impl SessionController {
    /// Create a controller; no session is started
    ///
    /// `document` is the locally open document: the reference when
    /// receiving, the mirrored text when sending.
    pub fn new(
        config: Config,
        document: Arc<dyn DocumentSource>,
        sink: Arc<dyn DecorationSink>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            document,
            decorations: Arc::new(Decorations::new(sink)),
            notifier,
            receiver: None,
            sender: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn decorations(&self) -> &Decorations {
        &self.decorations
    }

    pub fn receiver(&self) -> Option<&ReceiverSession> {
        self.receiver.as_ref()
    }

    pub fn sender(&self) -> Option<&SenderSession> {
        self.sender.as_ref()
    }

    /// Lifecycle state of the given role
    pub fn state(&mut self, role: SessionRole) -> SessionState {
        self.reap_closed();
        let state = match role {
            SessionRole::Receiver => self.receiver.as_ref().map(ReceiverSession::state),
            SessionRole::Sender => self.sender.as_ref().map(SenderSession::state),
        };
        state.unwrap_or(SessionState::Idle)
    }

    /// Start listening on `port` at the configured bind address
    pub async fn start_receiver(&mut self, port: &str) -> ReflectResult<String> {
        self.reap_closed();
        if self.receiver.is_some() {
            return Err(ReflectError::AlreadyActive(SessionRole::Receiver));
        }

        let bind_address = self.config.bind_address.clone();
        let port: u16 = port.trim().parse().map_err(|_| ReflectError::Bind {
            address: format!("{}:{}", bind_address, port.trim()),
            source: io::Error::new(io::ErrorKind::InvalidInput, "port is not a number"),
        })?;

        let ctx = ReceiverContext {
            document: self.document.clone(),
            decorations: self.decorations.clone(),
            notifier: self.notifier.clone(),
            max_snapshot_bytes: self.config.max_snapshot_bytes,
        };
        let receiver = ReceiverSession::start(&bind_address, port, ctx).await?;
        let message = format!("Receiver started on {}", receiver.info());
        self.receiver = Some(receiver);

        Ok(message)
    }

    /// Stop the receiver; a no-op when none is running
    pub async fn stop_receiver(&mut self) -> String {
        match self.receiver.take() {
            Some(receiver) => {
                receiver.stop().await;
                "Receiver stopped".to_string()
            }
            None => "No active receiver".to_string(),
        }
    }

    /// Connect to `host:port` and start mirroring the document
    pub async fn start_sender(&mut self, address: &str) -> ReflectResult<String> {
        self.reap_closed();
        if self.sender.is_some() {
            return Err(ReflectError::AlreadyActive(SessionRole::Sender));
        }

        let ctx = SenderContext {
            document: self.document.clone(),
            notifier: self.notifier.clone(),
            debounce: self.config.debounce(),
            write_error_policy: self.config.write_error_policy,
        };
        let sender = SenderSession::start(address, self.config.connect_timeout(), ctx).await?;
        let message = format!("Connected to receiver at {}", sender.remote());
        self.sender = Some(sender);

        Ok(message)
    }

    /// Stop the sender; a no-op when none is running
    pub async fn stop_sender(&mut self) -> String {
        match self.sender.take() {
            Some(sender) => {
                sender.stop().await;
                "Sender stopped".to_string()
            }
            None => "No active sender".to_string(),
        }
    }

    /// Forward a document change to the sender, if one is connected
    pub fn document_changed(&self) {
        if let Some(sender) = &self.sender {
            sender.document_changed();
        }
    }

    /// Stop both sessions and clear all decorations
    pub async fn shutdown(&mut self) {
        if self.receiver.is_some() {
            self.stop_receiver().await;
        }
        if self.sender.is_some() {
            self.stop_sender().await;
        }
        self.decorations.clear();
        info!("Session controller shut down");
    }

    /// Forget sessions whose connection has already closed
    fn reap_closed(&mut self) {
        if self
            .sender
            .as_ref()
            .is_some_and(|s| s.state() == SessionState::Closed)
        {
            self.sender = None;
        }
        if self
            .receiver
            .as_ref()
            .is_some_and(|r| r.state() == SessionState::Closed)
        {
            self.receiver = None;
        }
    }
}
