//! Packet classification: raw bytes → fragment, ACK, or malformed.
//!
//! Classification is purely size-driven first (an ACK is exactly
//! [`ACK_SIZE`] bytes, a fragment is exactly the transport's fragment
//! size) and then magic-validated. Nothing here panics or allocates for
//! rejected input.

use crate::control::{self, AckCode};
use crate::error::WireError;
use crate::wire::{ACK_SIZE, DataFragment, TransportKind, WireLayout};

/// A successfully classified wire unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Fragment(DataFragment),
    Ack(AckCode),
}

impl Packet {
    /// Classify one complete wire unit. `Err` means malformed.
    pub fn classify(
        data: &[u8],
        layout: &WireLayout,
        transport: TransportKind,
    ) -> Result<Self, WireError> {
        if data.len() == ACK_SIZE {
            return control::try_decode(data).map(Packet::Ack);
        }
        if data.len() == layout.fragment_size(transport) {
            return DataFragment::decode(data, layout, transport).map(Packet::Fragment);
        }
        Err(WireError::UnknownLength(data.len()))
    }
}
