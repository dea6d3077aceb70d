//! Outbound requests from the host to the device.

use bytes::Bytes;

use crate::control::{self, AckCode};

/// A host request. Each one is a single ACK packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Request {
    Connect,
    Disconnect,
    GetImage,
}

impl Request {
    pub const fn code(self) -> AckCode {
        match self {
            Request::Connect => AckCode::ConnectRequest,
            Request::Disconnect => AckCode::DisconnectRequest,
            Request::GetImage => AckCode::GetImageRequest,
        }
    }

    /// Wire bytes ready for an adapter's send operation.
    pub fn encode(self) -> Bytes {
        Bytes::copy_from_slice(&control::encode(self.code()))
    }
}

pub fn connect_request() -> Bytes {
    Request::Connect.encode()
}

pub fn disconnect_request() -> Bytes {
    Request::Disconnect.encode()
}

pub fn get_image_request() -> Bytes {
    Request::GetImage.encode()
}
