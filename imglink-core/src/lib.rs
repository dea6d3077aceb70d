//! # imglink-core
//!
//! Receive side of a fragmented image-frame link between a host and an
//! embedded camera device.
//!
//! This crate contains:
//! - **Wire format**: `DataFragment`, `WireLayout`, `PixelFormat` and the
//!   6-byte ACK control packets (`control`, `request`)
//! - **Classification**: `Packet::classify` for datagrams, `LinkCodec`
//!   for the TCP byte stream
//! - **Reassembly**: `ReassemblyManager` placing fragments by index, with
//!   a periodic reaper for stalled frames
//! - **Transports**: `UdpAdapter` and `TcpAdapter` behind the `Transport`
//!   trait, reporting through a `LinkEvent` channel
//! - **Error**: `LinkError`, `WireError`, `BoundsError` (`thiserror`)

pub mod config;
pub mod control;
pub mod error;
pub mod format;
pub mod packet;
mod reaper;
pub mod reassembly;
pub mod request;
pub mod transport;
pub mod wire;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use config::LinkConfig;
pub use control::AckCode;
pub use error::{BoundsError, LinkError, MagicPosition, WireError};
pub use format::PixelFormat;
pub use packet::Packet;
pub use reassembly::{
    CompletionStatus, Eviction, FirstFragmentPolicy, Frame, FrameIdentity, ReassemblyManager,
    frame_payload_len,
};
pub use request::Request;
pub use transport::{AdapterState, LinkCodec, LinkEvent, TcpAdapter, Transport, UdpAdapter};
pub use wire::{ACK_SIZE, DataFragment, TransportKind, WireLayout};
