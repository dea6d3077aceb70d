//! Binary layouts for data fragments and ACK packets.
//!
//! ## Wire format
//!
//! **Data fragment** (little-endian, 1050 bytes on UDP, 1052 on TCP):
//! ```text
//! head:        u16  (2)    0x5AA5
//! frame_len:   u16  (2)    informational
//! index:       u32  (4)    0-based
//! count:       u32  (4)    total fragments in the frame
//! width:       u32  (4)
//! height:      u32  (4)
//! format:      u16  (2)    pixel format tag
//! valid_len:   u16  (2)    bytes of `payload` actually used
//! payload:     [u8] (1024) fixed block
//! tail:        u16  (2)    0x6BB6
//! padding:     [u8] (2)    TCP only, ignored
//! ```
//!
//! **ACK** (6 bytes):
//! ```text
//! head:        u16  (2)    0x6AA6
//! code:        u16  (2)
//! tail:        u16  (2)    0x7BB7
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{MagicPosition, WireError};
use crate::format::PixelFormat;

// ── Constants ────────────────────────────────────────────────────

pub const FRAGMENT_HEAD: u16 = 0x5AA5;
pub const FRAGMENT_TAIL: u16 = 0x6BB6;
pub const ACK_HEAD: u16 = 0x6AA6;
pub const ACK_TAIL: u16 = 0x7BB7;

/// Size of an ACK packet on either transport.
pub const ACK_SIZE: usize = 6;

/// Bytes preceding the payload block in a data fragment.
pub const FRAGMENT_HEADER_SIZE: usize = 24;

/// Bytes following the payload block (tail magic), excluding TCP padding.
pub const FRAGMENT_TRAILER_SIZE: usize = 2;

pub const DEFAULT_PAYLOAD_SIZE: usize = 1024;
pub const DEFAULT_TCP_PADDING: usize = 2;

// ── TransportKind ────────────────────────────────────────────────

/// Which transport a unit was read from. Fragment sizes differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Udp,
    Tcp,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Udp => write!(f, "UDP"),
            Self::Tcp => write!(f, "TCP"),
        }
    }
}

// ── WireLayout ───────────────────────────────────────────────────

/// Size parameters of the fragment layout.
///
/// The device firmware fixes these at 1024 / 2, but they are carried as
/// configuration so alternate builds (and tests) can use other sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WireLayout {
    /// Size of the fixed payload block in each fragment.
    pub payload_size: usize,
    /// Trailing bytes appended to every fragment on TCP.
    pub tcp_padding: usize,
}

impl Default for WireLayout {
    fn default() -> Self {
        Self {
            payload_size: DEFAULT_PAYLOAD_SIZE,
            tcp_padding: DEFAULT_TCP_PADDING,
        }
    }
}

impl WireLayout {
    /// Fragment size on the wire for the given transport.
    pub const fn fragment_size(&self, transport: TransportKind) -> usize {
        let base = FRAGMENT_HEADER_SIZE + self.payload_size + FRAGMENT_TRAILER_SIZE;
        match transport {
            TransportKind::Udp => base,
            TransportKind::Tcp => base + self.tcp_padding,
        }
    }

    /// Byte offset of fragment `index` inside the reassembled frame.
    pub const fn offset_of(&self, index: u32) -> usize {
        index as usize * self.payload_size
    }

    /// Number of fragments needed to carry `len` bytes.
    pub const fn fragments_for(&self, len: usize) -> usize {
        len.div_ceil(self.payload_size)
    }
}

// ── DataFragment ─────────────────────────────────────────────────

/// One parsed data fragment. `payload` holds only the valid bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFragment {
    pub frame_len: u16,
    pub index: u32,
    pub count: u32,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub payload: Bytes,
}

impl DataFragment {
    /// Parse a fragment of exactly `layout.fragment_size(transport)` bytes.
    pub fn decode(
        data: &[u8],
        layout: &WireLayout,
        transport: TransportKind,
    ) -> Result<Self, WireError> {
        if data.len() != layout.fragment_size(transport) {
            return Err(WireError::UnknownLength(data.len()));
        }

        let mut buf = data;
        let head = buf.get_u16_le();
        if head != FRAGMENT_HEAD {
            return Err(WireError::BadMagic {
                position: MagicPosition::Header,
                expected: FRAGMENT_HEAD,
                actual: head,
            });
        }

        let frame_len = buf.get_u16_le();
        let index = buf.get_u32_le();
        let count = buf.get_u32_le();
        let width = buf.get_u32_le();
        let height = buf.get_u32_le();
        let format = PixelFormat::from(buf.get_u16_le());
        let valid_len = buf.get_u16_le() as usize;

        let block = &buf[..layout.payload_size];
        buf.advance(layout.payload_size);

        let tail = buf.get_u16_le();
        if tail != FRAGMENT_TAIL {
            return Err(WireError::BadMagic {
                position: MagicPosition::Tail,
                expected: FRAGMENT_TAIL,
                actual: tail,
            });
        }

        if valid_len > layout.payload_size {
            return Err(WireError::ValidLengthOverflow {
                valid_len,
                block: layout.payload_size,
            });
        }

        Ok(Self {
            frame_len,
            index,
            count,
            width,
            height,
            format,
            payload: Bytes::copy_from_slice(&block[..valid_len]),
        })
    }

    /// Serialize into a full wire unit, zero-filling the unused block.
    pub fn encode(
        &self,
        layout: &WireLayout,
        transport: TransportKind,
    ) -> Result<BytesMut, WireError> {
        let valid_len = self.payload.len();
        if valid_len > layout.payload_size || valid_len > u16::MAX as usize {
            return Err(WireError::ValidLengthOverflow {
                valid_len,
                block: layout.payload_size,
            });
        }

        let mut buf = BytesMut::with_capacity(layout.fragment_size(transport));
        buf.put_u16_le(FRAGMENT_HEAD);
        buf.put_u16_le(self.frame_len);
        buf.put_u32_le(self.index);
        buf.put_u32_le(self.count);
        buf.put_u32_le(self.width);
        buf.put_u32_le(self.height);
        buf.put_u16_le(self.format.tag());
        buf.put_u16_le(valid_len as u16);
        buf.put_slice(&self.payload);
        buf.put_bytes(0, layout.payload_size - valid_len);
        buf.put_u16_le(FRAGMENT_TAIL);
        if transport == TransportKind::Tcp {
            buf.put_bytes(0, layout.tcp_padding);
        }
        Ok(buf)
    }

    /// Cut a raw frame into fragments, as the device does before sending.
    pub fn split(
        data: &[u8],
        width: u32,
        height: u32,
        format: PixelFormat,
        layout: &WireLayout,
    ) -> Vec<Self> {
        let count = layout.fragments_for(data.len()) as u32;
        let frame_len = u16::try_from(data.len()).unwrap_or(u16::MAX);
        data.chunks(layout.payload_size)
            .enumerate()
            .map(|(index, chunk)| Self {
                frame_len,
                index: index as u32,
                count,
                width,
                height,
                format,
                payload: Bytes::copy_from_slice(chunk),
            })
            .collect()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataFragment {
        DataFragment {
            frame_len: 0x1234,
            index: 3,
            count: 450,
            width: 640,
            height: 480,
            format: PixelFormat::Yuv420Sp,
            payload: Bytes::from_static(b"abcdef"),
        }
    }

    #[test]
    fn default_sizes_match_device() {
        let layout = WireLayout::default();
        assert_eq!(layout.fragment_size(TransportKind::Udp), 1050);
        assert_eq!(layout.fragment_size(TransportKind::Tcp), 1052);
        assert_eq!(layout.offset_of(2), 2048);
        assert_eq!(layout.fragments_for(640 * 480 * 3 / 2), 450);
    }

    #[test]
    fn encoded_field_offsets() {
        let layout = WireLayout::default();
        let bytes = sample().encode(&layout, TransportKind::Udp).unwrap();
        assert_eq!(bytes.len(), 1050);
        assert_eq!(&bytes[0..2], &[0xA5, 0x5A]);
        assert_eq!(&bytes[2..4], &[0x34, 0x12]);
        assert_eq!(&bytes[4..8], &3u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &450u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &640u32.to_le_bytes());
        assert_eq!(&bytes[16..20], &480u32.to_le_bytes());
        assert_eq!(&bytes[20..22], &2u16.to_le_bytes());
        assert_eq!(&bytes[22..24], &6u16.to_le_bytes());
        assert_eq!(&bytes[24..30], b"abcdef");
        assert!(bytes[30..1048].iter().all(|&b| b == 0));
        assert_eq!(&bytes[1048..1050], &[0xB6, 0x6B]);
    }

    #[test]
    fn tcp_decode_ignores_padding() {
        let layout = WireLayout::default();
        let mut bytes = sample().encode(&layout, TransportKind::Tcp).unwrap();
        assert_eq!(bytes.len(), 1052);
        bytes[1050] = 0xFF;
        bytes[1051] = 0xEE;
        let parsed = DataFragment::decode(&bytes, &layout, TransportKind::Tcp).unwrap();
        assert_eq!(parsed, sample());
    }

    #[test]
    fn wrong_length_for_transport() {
        let layout = WireLayout::default();
        let bytes = sample().encode(&layout, TransportKind::Tcp).unwrap();
        assert_eq!(
            DataFragment::decode(&bytes, &layout, TransportKind::Udp),
            Err(WireError::UnknownLength(1052))
        );
    }

    #[test]
    fn bad_header_magic() {
        let layout = WireLayout::default();
        let mut bytes = sample().encode(&layout, TransportKind::Udp).unwrap();
        bytes[0] = 0x00;
        let err = DataFragment::decode(&bytes, &layout, TransportKind::Udp).unwrap_err();
        assert!(matches!(
            err,
            WireError::BadMagic {
                position: MagicPosition::Header,
                ..
            }
        ));
    }

    #[test]
    fn bad_tail_magic() {
        let layout = WireLayout::default();
        let mut bytes = sample().encode(&layout, TransportKind::Udp).unwrap();
        bytes[1049] = 0x00;
        let err = DataFragment::decode(&bytes, &layout, TransportKind::Udp).unwrap_err();
        assert!(matches!(
            err,
            WireError::BadMagic {
                position: MagicPosition::Tail,
                ..
            }
        ));
    }

    #[test]
    fn valid_length_larger_than_block() {
        let layout = WireLayout::default();
        let mut bytes = sample().encode(&layout, TransportKind::Udp).unwrap();
        bytes[22..24].copy_from_slice(&1025u16.to_le_bytes());
        assert_eq!(
            DataFragment::decode(&bytes, &layout, TransportKind::Udp),
            Err(WireError::ValidLengthOverflow {
                valid_len: 1025,
                block: 1024
            })
        );
    }

    #[test]
    fn alternate_payload_size() {
        let layout = WireLayout {
            payload_size: 16,
            tcp_padding: 2,
        };
        assert_eq!(layout.fragment_size(TransportKind::Udp), 42);
        let bytes = sample().encode(&layout, TransportKind::Udp).unwrap();
        let parsed = DataFragment::decode(&bytes, &layout, TransportKind::Udp).unwrap();
        assert_eq!(parsed.payload, Bytes::from_static(b"abcdef"));
    }

    #[test]
    fn split_covers_frame() {
        let layout = WireLayout::default();
        let data: Vec<u8> = (0..2500u32).map(|i| i as u8).collect();
        let frags = DataFragment::split(&data, 50, 33, PixelFormat::U8C1, &layout);
        assert_eq!(frags.len(), 3);
        assert!(frags.iter().all(|f| f.count == 3));
        assert_eq!(frags[2].payload.len(), 2500 - 2048);
        assert_eq!(frags[1].payload[..], data[1024..2048]);
    }
}
