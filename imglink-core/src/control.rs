//! Control channel: the 6-byte ACK packet.
//!
//! The same three-field packet travels in both directions. The host sends
//! request codes, the device answers with acknowledgement codes. Encoding
//! and decoding are stateless; timeout and retry policy belongs to the
//! caller (see `imglink-session`).

use bytes::{Buf, BufMut};

use crate::error::{MagicPosition, WireError};
use crate::wire::{ACK_HEAD, ACK_SIZE, ACK_TAIL};

// ── AckCode ──────────────────────────────────────────────────────

/// Code carried by an ACK packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AckCode {
    /// Host → device: open a session.
    ConnectRequest,
    /// Device → host: session opened.
    ConnectAck,
    /// Host → device: close the session.
    DisconnectRequest,
    /// Device → host: session closed.
    DisconnectAck,
    /// Host → device: capture and send one frame.
    GetImageRequest,
    /// Any code outside the known set, delivered unchanged.
    Other(u16),
}

impl AckCode {
    pub const fn value(self) -> u16 {
        match self {
            AckCode::ConnectRequest => 0x0000,
            AckCode::ConnectAck => 0x0001,
            AckCode::DisconnectRequest => 0x0002,
            AckCode::DisconnectAck => 0x0003,
            AckCode::GetImageRequest => 0x0004,
            AckCode::Other(v) => v,
        }
    }
}

impl From<u16> for AckCode {
    fn from(value: u16) -> Self {
        match value {
            0x0000 => AckCode::ConnectRequest,
            0x0001 => AckCode::ConnectAck,
            0x0002 => AckCode::DisconnectRequest,
            0x0003 => AckCode::DisconnectAck,
            0x0004 => AckCode::GetImageRequest,
            other => AckCode::Other(other),
        }
    }
}

impl std::fmt::Display for AckCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}({:#06x})", self.value())
    }
}

// ── Encode / decode ──────────────────────────────────────────────

/// Build the wire bytes for `code`.
pub fn encode(code: AckCode) -> [u8; ACK_SIZE] {
    let mut buf = [0u8; ACK_SIZE];
    let mut out = &mut buf[..];
    out.put_u16_le(ACK_HEAD);
    out.put_u16_le(code.value());
    out.put_u16_le(ACK_TAIL);
    buf
}

/// Parse an ACK, reporting why the bytes were rejected.
pub fn try_decode(data: &[u8]) -> Result<AckCode, WireError> {
    if data.len() != ACK_SIZE {
        return Err(WireError::UnknownLength(data.len()));
    }

    let mut buf = data;
    let head = buf.get_u16_le();
    let code = buf.get_u16_le();
    let tail = buf.get_u16_le();

    if head != ACK_HEAD {
        return Err(WireError::BadMagic {
            position: MagicPosition::Header,
            expected: ACK_HEAD,
            actual: head,
        });
    }
    if tail != ACK_TAIL {
        return Err(WireError::BadMagic {
            position: MagicPosition::Tail,
            expected: ACK_TAIL,
            actual: tail,
        });
    }
    Ok(AckCode::from(code))
}

/// Parse an ACK; `None` unless the slice is ACK-sized with both magics.
pub fn decode(data: &[u8]) -> Option<AckCode> {
    try_decode(data).ok()
}

/// Whether `prefix` starts with a complete ACK (both magics in place).
///
/// Used by the TCP stream framer to peel ACKs off the front of its
/// accumulator before trying to read a data fragment.
pub fn starts_with_ack(prefix: &[u8]) -> bool {
    prefix.len() >= ACK_SIZE
        && prefix[0..2] == ACK_HEAD.to_le_bytes()
        && prefix[4..6] == ACK_TAIL.to_le_bytes()
}
