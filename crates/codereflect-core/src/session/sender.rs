//! Sender session
//!
//! Holds one connection to a receiver. The full document goes out once
//! right after connecting, and again whenever a burst of edits has been
//! followed by the quiet period. Only the state at the end of a burst is
//! sent; nothing is queued.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{Endpoint, SessionState};
use crate::collab::{DocumentSource, Notifier};
use crate::config::WriteErrorPolicy;
use crate::error::{ReflectError, ReflectResult};
use crate::framer::Snapshot;

/// What a sender needs from its host
#[derive(Clone)]
pub struct SenderContext {
    /// Document being mirrored, read when a snapshot is taken
    pub document: Arc<dyn DocumentSource>,
    pub notifier: Arc<dyn Notifier>,
    /// Quiet period after the last edit
    pub debounce: Duration,
    pub write_error_policy: WriteErrorPolicy,
}

/// A scheduled snapshot transmission
///
/// Scheduling a new one replaces (cancels) the previous. Once it fires it
/// is consumed.
#[derive(Debug)]
pub struct PendingTransmission {
    deadline: Instant,
}

impl PendingTransmission {
    /// Schedule a transmission `quiet` from now
    pub fn schedule(quiet: Duration) -> Self {
        Self {
            deadline: Instant::now() + quiet,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Whether the quiet period has elapsed at `now`
    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

#[derive(Debug)]
enum SenderCommand {
    DocumentChanged,
    Shutdown,
}

/// Handle to a running sender
pub struct SenderSession {
    remote: Endpoint,
    command_tx: mpsc::UnboundedSender<SenderCommand>,
    state_rx: watch::Receiver<SessionState>,
    task: JoinHandle<()>,
}

impl SenderSession {
    /// Connect to `host:port` and send the current document
    pub async fn start(
        address: &str,
        connect_timeout: Duration,
        ctx: SenderContext,
    ) -> ReflectResult<Self> {
        let remote = Endpoint::parse(address)?;
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);

        info!("Connecting to receiver at {}", remote);
        let connect = TcpStream::connect((remote.host.as_str(), remote.port));
        let stream = match tokio::time::timeout(connect_timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(ReflectError::Connect {
                    address: remote.to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(ReflectError::Connect {
                    address: remote.to_string(),
                    source: io::Error::new(io::ErrorKind::TimedOut, "connection timed out"),
                })
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle on sender socket: {}", e);
        }

        let (reader, mut writer) = stream.into_split();

        // The first snapshot is the document as it stands at connect time
        match ctx.document.current_text() {
            Some(text) => {
                let len = write_snapshot(&mut writer, text, &remote).await?;
                debug!("Sent {} byte snapshot to {}", len, remote);
            }
            None => debug!("No document open, nothing to send"),
        }

        info!("Connected to receiver at {}", remote);
        let _ = state_tx.send(SessionState::Connected);

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let task = SenderTask {
            remote: remote.clone(),
            reader,
            writer,
            ctx,
            pending: None,
            state_tx,
        };
        let task = tokio::spawn(task.run(command_rx));

        Ok(Self {
            remote,
            command_tx,
            state_rx,
            task,
        })
    }

    /// Receiver this session is mirroring to
    pub fn remote(&self) -> &Endpoint {
        &self.remote
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Whether the connection is still open
    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Subscribe to state changes
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Note that the document changed, restarting the quiet period
    ///
    /// Does nothing unless connected.
    pub fn document_changed(&self) {
        if !self.is_connected() {
            return;
        }
        let _ = self.command_tx.send(SenderCommand::DocumentChanged);
    }

    /// Wait until the connection is closed, by either side
    pub async fn closed(&self) {
        let mut state_rx = self.state_rx.clone();
        let _ = state_rx.wait_for(|s| *s == SessionState::Closed).await;
    }

    /// Cancel any pending transmission and close the connection
    pub async fn stop(self) {
        let _ = self.command_tx.send(SenderCommand::Shutdown);
        if let Err(e) = self.task.await {
            warn!("Sender task ended abnormally: {}", e);
        }
    }
}

/// Owns the socket for the lifetime of the connection
struct SenderTask<R, W> {
    remote: Endpoint,
    reader: R,
    writer: W,
    ctx: SenderContext,
    pending: Option<PendingTransmission>,
    state_tx: watch::Sender<SessionState>,
}

impl<R, W> SenderTask<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SenderCommand>) {
        let mut open = true;
        let mut buf = [0u8; 256];

        while open {
            let deadline = self.pending.as_ref().map(PendingTransmission::deadline);

            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(SenderCommand::DocumentChanged) => {
                        // Replaces any pending transmission
                        self.pending = Some(PendingTransmission::schedule(self.ctx.debounce));
                        debug!("Snapshot scheduled in {:?}", self.ctx.debounce);
                    }
                    Some(SenderCommand::Shutdown) | None => {
                        self.pending = None;
                        if let Err(e) = self.writer.shutdown().await {
                            debug!("Error closing connection to {}: {}", self.remote, e);
                        }
                        info!("Sender to {} stopped", self.remote);
                        break;
                    }
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.pending = None;
                    open = self.transmit().await;
                }
                read = self.reader.read(&mut buf) => match read {
                    Ok(0) => {
                        info!("Receiver {} closed the connection", self.remote);
                        self.ctx
                            .notifier
                            .notify(&format!("Receiver {} closed the connection", self.remote));
                        open = false;
                    }
                    // Receivers never reply
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Connection to {} failed: {}", self.remote, e);
                        self.ctx
                            .notifier
                            .notify_error(&format!("Connection to {} failed: {}", self.remote, e));
                        open = false;
                    }
                },
            }
        }

        let _ = self.state_tx.send(SessionState::Closed);
    }

    /// Send the current document; returns whether the connection stays open
    async fn transmit(&mut self) -> bool {
        let Some(text) = self.ctx.document.current_text() else {
            debug!("No document open, nothing to send");
            return true;
        };

        match write_snapshot(&mut self.writer, text, &self.remote).await {
            Ok(len) => {
                debug!("Sent {} byte snapshot to {}", len, self.remote);
                true
            }
            Err(err) => {
                warn!("{}", err);
                self.ctx.notifier.notify_error(&err.to_string());
                self.ctx.write_error_policy == WriteErrorPolicy::Report
            }
        }
    }
}

/// Frame `text` and write it out; returns the payload length
async fn write_snapshot<W>(writer: &mut W, text: String, remote: &Endpoint) -> ReflectResult<usize>
where
    W: AsyncWrite + Unpin,
{
    let snapshot = Snapshot::new(text);
    let result = match snapshot.encode() {
        Ok(frame) => writer.write_all(&frame).await,
        Err(e) => Err(io::Error::new(io::ErrorKind::InvalidData, e)),
    };

    result
        .map(|()| snapshot.len())
        .map_err(|source| ReflectError::Write {
            address: remote.to_string(),
            source,
        })
}
