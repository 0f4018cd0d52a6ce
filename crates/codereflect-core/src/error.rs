//! Mirroring error handling
//!
//! Every failure is handled at the session boundary and surfaced to the
//! user; nothing here is fatal to the hosting process.

use std::io;

use thiserror::Error;

use crate::session::SessionRole;

/// Errors raised while decoding the snapshot stream
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// Length prefix announces a payload above the configured limit
    #[error("Snapshot of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    /// Payload bytes are not valid UTF-8
    #[error("Snapshot payload is not valid UTF-8 (first bad byte at offset {offset})")]
    InvalidUtf8 { offset: usize },
}

/// Errors that can occur while running a mirroring session
#[derive(Error, Debug)]
pub enum ReflectError {
    /// Receiver address is not of the form `host:port`
    #[error("Invalid receiver address '{input}': {reason}")]
    AddressFormat { input: String, reason: &'static str },

    /// Listening endpoint could not be opened
    #[error("Could not listen on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Outbound connection could not be established
    #[error("Could not connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Writing a snapshot to an established connection failed
    #[error("Failed to send snapshot to {address}: {source}")]
    Write {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Inbound stream carried a malformed frame
    #[error("Malformed snapshot from {peer}: {source}")]
    Framing {
        peer: String,
        #[source]
        source: FramingError,
    },

    /// A session of this role is already running
    #[error("A {0} session is already active. Stop it first.")]
    AlreadyActive(SessionRole),

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ReflectError {
    /// Check if the user can fix this error and retry the command
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ReflectError::AddressFormat { .. }
                | ReflectError::Bind { .. }
                | ReflectError::Connect { .. }
                | ReflectError::AlreadyActive(_)
        )
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            ReflectError::AddressFormat { .. } => {
                Some("Enter the receiver address as host:port, for example localhost:3030.")
            }
            ReflectError::Bind { source, .. } if source.kind() == io::ErrorKind::AddrInUse => {
                Some("Another program is using this port. Pick a different port or stop the other receiver.")
            }
            ReflectError::Bind { .. } => Some("Check that the port is a number between 1 and 65535."),
            ReflectError::Connect { .. } => {
                Some("Check that the receiver is running and reachable from this machine.")
            }
            ReflectError::AlreadyActive(_) => Some("Stop the running session before starting a new one."),
            _ => None,
        }
    }
}

/// Result type for mirroring operations
pub type ReflectResult<T> = Result<T, ReflectError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_error_display() {
        let err = ReflectError::AddressFormat {
            input: "localhost".to_string(),
            reason: "missing port",
        };

        let msg = err.to_string();
        assert!(msg.contains("localhost"));
        assert!(msg.contains("missing port"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_bind_in_use_suggestion() {
        let err = ReflectError::Bind {
            address: "0.0.0.0:3030".to_string(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "address in use"),
        };

        assert!(err.recovery_suggestion().unwrap().contains("different port"));
    }

    #[test]
    fn test_write_error_not_recoverable() {
        let err = ReflectError::Write {
            address: "127.0.0.1:3030".to_string(),
            source: io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"),
        };

        assert!(!err.is_recoverable());
        assert!(err.recovery_suggestion().is_none());
    }

    #[test]
    fn test_framing_error_display() {
        let err = ReflectError::Framing {
            peer: "10.0.0.2:51000".to_string(),
            source: FramingError::FrameTooLarge { len: 100, max: 10 },
        };

        let msg = err.to_string();
        assert!(msg.contains("10.0.0.2:51000"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_already_active_display() {
        let err = ReflectError::AlreadyActive(SessionRole::Receiver);
        assert_eq!(
            err.to_string(),
            "A receiver session is already active. Stop it first."
        );
    }
}
