//! Receiver session
//!
//! Listens for senders. Every connection gets its own framer; each snapshot
//! it completes is compared against the current reference document and
//! the resulting highlight set replaces whatever was drawn before.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::{reachable_addresses, EndpointInfo, SessionState};
use crate::collab::{Decorations, DocumentSource, Notifier};
use crate::diff;
use crate::error::{ReflectError, ReflectResult};
use crate::framer::{MessageFramer, Snapshot};

const READ_BUF_SIZE: usize = 8 * 1024;

/// Pause after a failed accept so a persistent error doesn't spin
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// What a receiver needs from its host
#[derive(Clone)]
pub struct ReceiverContext {
    /// Reference document, read afresh for every snapshot
    pub document: Arc<dyn DocumentSource>,
    pub decorations: Arc<Decorations>,
    pub notifier: Arc<dyn Notifier>,
    pub max_snapshot_bytes: usize,
}

/// Handle to a running receiver
pub struct ReceiverSession {
    info: EndpointInfo,
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<SessionState>,
    task: JoinHandle<()>,
}

impl ReceiverSession {
    /// Bind to `bind_address:port` and start accepting senders
    ///
    /// Port 0 picks a free port; the chosen one is in the returned info.
    pub async fn start(bind_address: &str, port: u16, ctx: ReceiverContext) -> ReflectResult<Self> {
        let address = format!("{}:{}", bind_address, port);
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);

        let listener = TcpListener::bind((bind_address, port))
            .await
            .map_err(|source| ReflectError::Bind {
                address: address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let info = EndpointInfo {
            port: local_addr.port(),
            addresses: reachable_addresses(local_addr.ip()),
        };
        info!("Receiver listening on {}", local_addr);

        let _ = state_tx.send(SessionState::Connected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(accept_loop(listener, ctx, shutdown_rx, state_tx));

        Ok(Self {
            info,
            local_addr,
            shutdown_tx,
            state_rx,
            task,
        })
    }

    /// Addresses and port the receiver can be reached on
    pub fn info(&self) -> &EndpointInfo {
        &self.info
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to state changes
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Close the listening socket and every sender connection
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!("Receiver task ended abnormally: {}", e);
        }
        info!("Receiver on {} stopped", self.local_addr);
    }
}

async fn accept_loop(
    listener: TcpListener,
    ctx: ReceiverContext,
    mut shutdown_rx: watch::Receiver<bool>,
    state_tx: watch::Sender<SessionState>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            // Explicit stop, or the handle was dropped
            _ = shutdown_rx.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    info!("Sender connected from {}", peer);
                    ctx.notifier.notify(&format!("Sender connected from {}", peer));
                    connections.spawn(handle_connection(stream, peer, ctx.clone()));
                }
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    ctx.notifier.notify_error(&format!("Failed to accept connection: {}", e));
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    connections.shutdown().await;
    drop(listener);
    let _ = state_tx.send(SessionState::Closed);
}

async fn handle_connection(mut stream: TcpStream, peer: SocketAddr, ctx: ReceiverContext) {
    let mut framer = MessageFramer::with_max_len(ctx.max_snapshot_bytes);
    let mut buf = vec![0u8; READ_BUF_SIZE];

    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) => {
                info!("Sender {} disconnected", peer);
                ctx.notifier.notify(&format!("Sender {} disconnected", peer));
                return;
            }
            Ok(n) => n,
            Err(e) => {
                report_connection_error(&ctx, peer, e);
                return;
            }
        };

        for frame in framer.feed(&buf[..n]) {
            match frame {
                Ok(snapshot) => compare_snapshot(&ctx, &snapshot, peer),
                Err(source) => {
                    let err = ReflectError::Framing {
                        peer: peer.to_string(),
                        source,
                    };
                    warn!("{}", err);
                    ctx.notifier.notify_error(&err.to_string());
                    return;
                }
            }
        }
    }
}

fn compare_snapshot(ctx: &ReceiverContext, snapshot: &Snapshot, peer: SocketAddr) {
    let Some(reference) = ctx.document.current_text() else {
        debug!("No reference document open, ignoring snapshot from {}", peer);
        return;
    };

    let ranges = diff::compare(&reference, snapshot.text());
    debug!(
        "Snapshot from {}: {} bytes, {} divergent line(s)",
        peer,
        snapshot.len(),
        ranges.len()
    );
    ctx.decorations.replace(ranges);
}

fn report_connection_error(ctx: &ReceiverContext, peer: SocketAddr, e: io::Error) {
    warn!("Connection error from {}: {}", peer, e);
    ctx.notifier
        .notify_error(&format!("Connection error from {}: {}", peer, e));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{DecorationSink, StaticDocument};
    use crate::diff::{DivergenceRange, HighlightSet};
    use std::sync::Mutex;
    use tokio::io::AsyncWriteExt;
    use tokio::time::timeout;

    #[derive(Default)]
    struct Messages {
        info: Mutex<Vec<String>>,
        errors: Mutex<Vec<String>>,
    }

    impl Notifier for Messages {
        fn notify(&self, message: &str) {
            self.info.lock().unwrap().push(message.to_string());
        }

        fn notify_error(&self, message: &str) {
            self.errors.lock().unwrap().push(message.to_string());
        }
    }

    struct NullSink;

    impl DecorationSink for NullSink {
        fn apply_ranges(&self, _ranges: &HighlightSet) {}
        fn clear_ranges(&self) {}
    }

    #[derive(Default)]
    struct CountingSink {
        applied: Mutex<usize>,
    }

    impl DecorationSink for CountingSink {
        fn apply_ranges(&self, _ranges: &HighlightSet) {
            *self.applied.lock().unwrap() += 1;
        }

        fn clear_ranges(&self) {}
    }

    fn context(reference: &str, messages: Arc<Messages>) -> ReceiverContext {
        ReceiverContext {
            document: Arc::new(StaticDocument::new(reference)),
            decorations: Arc::new(Decorations::new(Arc::new(NullSink))),
            notifier: messages,
            max_snapshot_bytes: 1024,
        }
    }

    async fn wait_until<F: Fn() -> bool>(check: F) {
        timeout(Duration::from_secs(2), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_snapshot_replaces_decorations() {
        let messages = Arc::new(Messages::default());
        let ctx = context("foo\nbar", messages.clone());
        let decorations = ctx.decorations.clone();

        let receiver = ReceiverSession::start("127.0.0.1", 0, ctx).await.unwrap();
        assert_eq!(receiver.state(), SessionState::Connected);

        let mut stream = TcpStream::connect(receiver.local_addr()).await.unwrap();
        let frame = Snapshot::new("foo\nbaz").encode().unwrap();
        // Split the frame to exercise reassembly
        stream.write_all(&frame[..5]).await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        stream.write_all(&frame[5..]).await.unwrap();

        wait_until(|| !decorations.current().is_empty()).await;
        assert_eq!(
            decorations.current().ranges(),
            &[DivergenceRange::new(1, 2, 3)]
        );

        receiver.stop().await;
    }

    #[tokio::test]
    async fn test_framing_error_drops_only_that_connection() {
        let messages = Arc::new(Messages::default());
        let ctx = context("abc", messages.clone());
        let decorations = ctx.decorations.clone();

        let receiver = ReceiverSession::start("127.0.0.1", 0, ctx).await.unwrap();

        // Oversized length prefix
        let mut bad = TcpStream::connect(receiver.local_addr()).await.unwrap();
        bad.write_all(&[0xff, 0xff, 0xff, 0xff]).await.unwrap();
        wait_until(|| !messages.errors.lock().unwrap().is_empty()).await;
        assert!(messages.errors.lock().unwrap()[0].contains("Malformed snapshot"));

        // Listener still serves new senders
        let mut good = TcpStream::connect(receiver.local_addr()).await.unwrap();
        good.write_all(&Snapshot::new("ab").encode().unwrap())
            .await
            .unwrap();
        wait_until(|| !decorations.current().is_empty()).await;
        assert_eq!(
            decorations.current().ranges(),
            &[DivergenceRange::new(0, 2, 3)]
        );

        receiver.stop().await;
    }

    #[tokio::test]
    async fn test_no_reference_document_skips_comparison() {
        let reference = Arc::new(StaticDocument::closed());
        let sink = Arc::new(CountingSink::default());
        let ctx = ReceiverContext {
            document: reference.clone(),
            decorations: Arc::new(Decorations::new(sink.clone())),
            notifier: Arc::new(Messages::default()),
            max_snapshot_bytes: 1024,
        };
        let decorations = ctx.decorations.clone();
        let receiver = ReceiverSession::start("127.0.0.1", 0, ctx).await.unwrap();

        let mut stream = TcpStream::connect(receiver.local_addr()).await.unwrap();
        stream
            .write_all(&Snapshot::new("abc").encode().unwrap())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*sink.applied.lock().unwrap(), 0);

        // Same connection carries on once a document is open
        reference.set_text("abd");
        stream
            .write_all(&Snapshot::new("abc").encode().unwrap())
            .await
            .unwrap();
        wait_until(|| *sink.applied.lock().unwrap() == 1).await;
        assert_eq!(
            decorations.current().ranges(),
            &[DivergenceRange::new(0, 2, 3)]
        );

        receiver.stop().await;
    }

    #[tokio::test]
    async fn test_disconnect_is_reported() {
        let messages = Arc::new(Messages::default());
        let receiver = ReceiverSession::start("127.0.0.1", 0, context("x", messages.clone()))
            .await
            .unwrap();

        let stream = TcpStream::connect(receiver.local_addr()).await.unwrap();
        drop(stream);

        wait_until(|| {
            messages
                .info
                .lock()
                .unwrap()
                .iter()
                .any(|m| m.contains("disconnected"))
        })
        .await;

        receiver.stop().await;
    }

    #[tokio::test]
    async fn test_stop_closes_listener() {
        let messages = Arc::new(Messages::default());
        let receiver = ReceiverSession::start("127.0.0.1", 0, context("x", messages))
            .await
            .unwrap();
        let addr = receiver.local_addr();
        let mut state = receiver.subscribe_state();

        receiver.stop().await;

        assert_eq!(*state.borrow_and_update(), SessionState::Closed);
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_bind_in_use() {
        let messages = Arc::new(Messages::default());
        let first = ReceiverSession::start("127.0.0.1", 0, context("x", messages.clone()))
            .await
            .unwrap();
        let port = first.local_addr().port();

        let second = ReceiverSession::start("127.0.0.1", port, context("x", messages)).await;
        assert!(matches!(second, Err(ReflectError::Bind { .. })));

        assert!(TcpStream::connect(first.local_addr()).await.is_ok());
        first.stop().await;
    }
}
