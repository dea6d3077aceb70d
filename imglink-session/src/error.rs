//! Session error type.

use std::net::AddrParseError;

use imglink_core::LinkError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Link(#[from] LinkError),

    /// A configured endpoint is not a valid `ip:port`.
    #[error("invalid {field} {value:?}: {source}")]
    Address {
        field: &'static str,
        value: String,
        #[source]
        source: AddrParseError,
    },

    /// The operation is not allowed in the current phase.
    #[error("invalid session phase: {0}")]
    InvalidPhase(&'static str),

    /// The adapter has been stopped; open a new session.
    #[error("session closed")]
    Closed,
}
