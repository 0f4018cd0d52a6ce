//! codereflect core library
//!
//! Mirrors a document from a sender to a receiver over TCP and marks where
//! the receiver's own copy diverges from what the sender is typing.
//!
//! # Architecture
//!
//! ```text
//! edit -> SenderSession (debounce) -> framed Snapshot -> TCP
//!      -> ReceiverSession -> MessageFramer -> diff::compare -> Decorations
//! ```
//!
//! Every snapshot carries the whole document. There is no acknowledgement,
//! retry or merge: a lost snapshot is simply superseded by the next one.
//!
//! # Modules
//!
//! - `framer`: length-prefixed snapshot framing
//! - `diff`: positional line/column divergence detection
//! - `session`: receiver and sender sessions and their controller
//! - `collab`: traits the hosting application implements
//! - `config`: application configuration
//! - `error`: error types

pub mod collab;
pub mod config;
pub mod diff;
pub mod error;
pub mod framer;
pub mod session;

pub use collab::{DecorationSink, Decorations, DocumentSource, Notifier, StaticDocument};
pub use config::{Config, WriteErrorPolicy};
pub use diff::{DivergenceRange, HighlightSet};
pub use error::{FramingError, ReflectError, ReflectResult};
pub use framer::{MessageFramer, Snapshot};
pub use session::{
    Endpoint, EndpointInfo, ReceiverSession, SenderSession, SessionController, SessionRole,
    SessionState,
};
