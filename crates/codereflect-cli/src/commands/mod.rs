//! Command handlers

pub mod config;
pub mod console;
pub mod diff;
pub mod receive;
pub mod send;

use codereflect_core::ReflectError;

/// Attach the recovery suggestion, if any, to a session error
pub fn with_hint(err: ReflectError) -> anyhow::Error {
    match err.recovery_suggestion() {
        Some(hint) => anyhow::anyhow!("{}\n  {}", err, hint),
        None => anyhow::Error::new(err),
    }
}
