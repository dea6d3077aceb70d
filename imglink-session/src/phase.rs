//! Handshake phase of a session.

use crate::error::SessionError;

/// ```text
///  Disconnected ──► Connecting ──► Connected ──► Disconnecting
///        ▲               │                             │
///        └───────────────┴──────── reset ◄─────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Disconnected,
    /// Connect request sent, waiting for the device.
    Connecting,
    /// Device acknowledged; image requests are allowed.
    Connected,
    /// Disconnect request sent, waiting for the device.
    Disconnecting,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}

impl SessionPhase {
    /// Valid from: `Disconnected`.
    pub fn begin_connect(&mut self) -> Result<(), SessionError> {
        match self {
            Self::Disconnected => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(SessionError::InvalidPhase("cannot connect: not Disconnected")),
        }
    }

    /// Valid from: `Connecting`.
    pub fn confirm_connected(&mut self) -> Result<(), SessionError> {
        match self {
            Self::Connecting => {
                *self = Self::Connected;
                Ok(())
            }
            _ => Err(SessionError::InvalidPhase(
                "unexpected connect-ack: not Connecting",
            )),
        }
    }

    /// Valid from: `Connected`.
    pub fn begin_disconnect(&mut self) -> Result<(), SessionError> {
        match self {
            Self::Connected => {
                *self = Self::Disconnecting;
                Ok(())
            }
            _ => Err(SessionError::InvalidPhase("cannot disconnect: not Connected")),
        }
    }

    /// Back to `Disconnected` from anywhere.
    pub fn reset(&mut self) {
        *self = Self::Disconnected;
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_cycle() {
        let mut p = SessionPhase::default();
        p.begin_connect().unwrap();
        p.confirm_connected().unwrap();
        assert!(p.is_connected());
        p.begin_disconnect().unwrap();
        p.reset();
        assert_eq!(p, SessionPhase::Disconnected);
    }

    #[test]
    fn rejects_out_of_order_steps() {
        let mut p = SessionPhase::Disconnected;
        assert!(p.confirm_connected().is_err());
        assert!(p.begin_disconnect().is_err());

        let mut p = SessionPhase::Connecting;
        assert!(p.begin_connect().is_err());
        assert!(p.begin_disconnect().is_err());
        assert_eq!(p.to_string(), "Connecting");
    }
}
