//! Mirroring sessions
//!
//! A receiver listens for senders and compares every snapshot it gets
//! against the local reference document. A sender holds one connection and
//! pushes the full local document after each burst of edits.
//!
//! ## Lifecycle
//!
//! ```text
//! idle -> connecting -> connected -> closed
//! ```
//!
//! Sessions are driven by tasks on the caller's Tokio runtime. Only the
//! task owns the socket; the session handle talks to it over channels.

mod controller;
mod receiver;
mod sender;

use std::fmt;
use std::net::IpAddr;

use tracing::warn;

use crate::error::{ReflectError, ReflectResult};

pub use controller::SessionController;
pub use receiver::{ReceiverContext, ReceiverSession};
pub use sender::{PendingTransmission, SenderContext, SenderSession};

/// Which side of the mirror a session plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    Sender,
    Receiver,
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionRole::Sender => write!(f, "sender"),
            SessionRole::Receiver => write!(f, "receiver"),
        }
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing running
    Idle,
    /// Binding or connecting
    Connecting,
    /// Socket open and owned by the session task
    Connected,
    /// Socket released; the session cannot be restarted
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// Remote receiver address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Parse `host:port`
    ///
    /// IPv6 hosts must be bracketed: `[::1]:3030`.
    pub fn parse(input: &str) -> ReflectResult<Self> {
        let trimmed = input.trim();
        let err = |reason| ReflectError::AddressFormat {
            input: input.to_string(),
            reason,
        };

        let (host, port) = trimmed.rsplit_once(':').ok_or_else(|| err("missing port"))?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        if host.is_empty() {
            return Err(err("missing host"));
        }
        if port.is_empty() {
            return Err(err("missing port"));
        }
        if host.contains(':') && !trimmed.starts_with('[') {
            return Err(err("IPv6 hosts must be written as [addr]:port"));
        }

        let port: u16 = port.parse().map_err(|_| err("port is not a number"))?;
        if port == 0 {
            return Err(err("port must be between 1 and 65535"));
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Where a started receiver can be reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointInfo {
    pub port: u16,
    pub addresses: Vec<IpAddr>,
}

impl fmt::Display for EndpointInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addrs: Vec<String> = self.addresses.iter().map(|a| a.to_string()).collect();
        if addrs.is_empty() {
            write!(f, "port {}", self.port)
        } else {
            write!(f, "port {} ({})", self.port, addrs.join(", "))
        }
    }
}

/// Addresses a receiver bound to `bind` can be reached on
///
/// Wildcard binds list every non-loopback interface address. An IPv4
/// wildcard lists IPv4 only; an IPv6 wildcard is dual-stack and lists both
/// families. Any other bind address is reachable only on itself.
pub fn reachable_addresses(bind: IpAddr) -> Vec<IpAddr> {
    if !bind.is_unspecified() {
        return vec![bind];
    }

    let interfaces = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            warn!("Could not enumerate network interfaces: {}", e);
            return Vec::new();
        }
    };

    let mut addrs: Vec<IpAddr> = interfaces
        .iter()
        .filter(|iface| !iface.is_loopback())
        .map(|iface| iface.ip())
        .filter(|ip| bind.is_ipv6() || ip.is_ipv4())
        .collect();
    addrs.sort();
    addrs.dedup();
    addrs
}
