//! Domain-specific error types for the imglink engine.
//!
//! Fallible public operations return `Result<T, LinkError>`.
//! Malformed traffic is described by [`WireError`] and [`BoundsError`];
//! the engine logs and drops those, it never hands them to the caller
//! as a failure.

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// ── WireError ────────────────────────────────────────────────────

/// A received unit could not be parsed as a fragment or an ACK.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// The byte count matches neither the ACK nor the fragment size.
    #[error("unrecognised packet length: {0} bytes")]
    UnknownLength(usize),

    /// A header or tail marker did not carry the expected value.
    #[error("bad {position} magic: expected {expected:#06x}, got {actual:#06x}")]
    BadMagic {
        position: MagicPosition,
        expected: u16,
        actual: u16,
    },

    /// The declared valid length does not fit in the payload block.
    #[error("valid length {valid_len} exceeds payload block of {block} bytes")]
    ValidLengthOverflow { valid_len: usize, block: usize },
}

/// Which end of a packet a magic value was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagicPosition {
    Header,
    Tail,
}

impl std::fmt::Display for MagicPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Header => write!(f, "header"),
            Self::Tail => write!(f, "tail"),
        }
    }
}

// ── BoundsError ──────────────────────────────────────────────────

/// A well-formed fragment that cannot be placed in its frame buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoundsError {
    /// The fragment index is not below the declared fragment count.
    #[error("fragment index {index} out of range (count {count})")]
    IndexOutOfRange { index: u32, count: u32 },

    /// The fragment would write past the end of the frame payload.
    #[error("fragment at offset {offset} with {len} bytes overflows payload of {capacity} bytes")]
    PayloadOverflow {
        offset: usize,
        len: usize,
        capacity: usize,
    },

    /// The declared geometry asks for more memory than allowed.
    #[error("declared frame of {size} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { size: u64, max: usize },

    /// The declared fragment count could not fit in the largest allowed frame.
    #[error("declared {count} fragments exceeds limit of {max}")]
    TooManyFragments { count: u32, max: u32 },
}

// ── LinkError ────────────────────────────────────────────────────

/// The canonical error type for adapters and the engine surface.
#[derive(Debug, Error)]
pub enum LinkError {
    // ── Traffic ──────────────────────────────────────────────────
    #[error("wire format error: {0}")]
    Wire(#[from] WireError),

    #[error("fragment rejected: {0}")]
    Bounds(#[from] BoundsError),

    // ── Transport ────────────────────────────────────────────────
    /// The socket layer reported an error.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// Binding the local endpoint failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Connecting to the remote endpoint failed.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// The adapter is not in a state that allows the operation.
    #[error("invalid adapter state: {0}")]
    InvalidState(&'static str),

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Configuration ────────────────────────────────────────────
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for LinkError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        LinkError::ChannelClosed
    }
}
