//! Stream framing for the TCP transport.
//!
//! The byte stream is a concatenation of 6-byte ACKs and fixed-size
//! fragments with no length prefix. A unit that starts with the ACK
//! magics is an ACK; anything else is taken as a fragment once enough
//! bytes are buffered. A malformed fragment still consumes its bytes and
//! is yielded as `Err(WireError)` so the stream keeps going.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::control;
use crate::error::{LinkError, WireError};
use crate::packet::Packet;
use crate::wire::{ACK_SIZE, DataFragment, TransportKind, WireLayout};

/// Decoder/encoder pair for [`FramedRead`](tokio_util::codec::FramedRead)
/// and [`FramedWrite`](tokio_util::codec::FramedWrite).
#[derive(Debug, Clone, Default)]
pub struct LinkCodec {
    layout: WireLayout,
}

impl LinkCodec {
    pub fn new(layout: WireLayout) -> Self {
        Self { layout }
    }

    fn fragment_size(&self) -> usize {
        self.layout.fragment_size(TransportKind::Tcp)
    }
}

impl Decoder for LinkCodec {
    type Item = Result<Packet, WireError>;
    type Error = LinkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < ACK_SIZE {
            return Ok(None);
        }

        if control::starts_with_ack(&src[..]) {
            let unit = src.split_to(ACK_SIZE);
            return Ok(Some(control::try_decode(&unit).map(Packet::Ack)));
        }

        let size = self.fragment_size();
        if src.len() < size {
            src.reserve(size - src.len());
            return Ok(None);
        }

        let unit = src.split_to(size);
        Ok(Some(
            DataFragment::decode(&unit, &self.layout, TransportKind::Tcp).map(Packet::Fragment),
        ))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(item) => Ok(Some(item)),
            None => {
                if !buf.is_empty() {
                    debug!("discarding {} trailing bytes at end of stream", buf.len());
                    buf.clear();
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<Bytes> for LinkCodec {
    type Error = LinkError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item);
        Ok(())
    }
}
