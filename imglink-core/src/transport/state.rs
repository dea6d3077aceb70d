//! Adapter lifecycle state machine.
//!
//! Provides an `AdapterState` enum with validated transitions that return
//! `Result` instead of panicking, published through a `watch` channel so
//! callers can observe the lifecycle without polling the adapter.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::LinkError;

// ── AdapterState ─────────────────────────────────────────────────

/// The current phase of a transport adapter.
///
/// ```text
///  Idle ──► Connecting ──► Active ──► Closing ──► Closed
///                │                       ▲
///                └───────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AdapterState {
    /// Constructed, no socket yet.
    #[default]
    Idle,

    /// Binding (UDP) or binding + connecting (TCP).
    Connecting,

    /// Socket is up; fragments and ACKs are processed.
    Active {
        /// When the adapter entered the `Active` state.
        since: Instant,
    },

    /// Stop requested or a fatal socket error occurred.
    Closing,

    /// Receive loop exited and the socket is released. Terminal.
    Closed,
}

impl std::fmt::Display for AdapterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Active { .. } => write!(f, "Active"),
            Self::Closing => write!(f, "Closing"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

impl AdapterState {
    /// Only `Active` processes traffic and accepts sends.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Valid from: `Idle`.
    pub fn begin_connect(&mut self) -> Result<(), LinkError> {
        match self {
            Self::Idle => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(LinkError::InvalidState("cannot connect: not Idle")),
        }
    }

    /// Valid from: `Connecting`.
    pub fn activate(&mut self) -> Result<(), LinkError> {
        match self {
            Self::Connecting => {
                *self = Self::Active {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(LinkError::InvalidState("cannot activate: not Connecting")),
        }
    }

    /// Valid from: `Connecting` (bind/connect failure), `Active`.
    pub fn begin_close(&mut self) -> Result<(), LinkError> {
        match self {
            Self::Connecting | Self::Active { .. } => {
                *self = Self::Closing;
                Ok(())
            }
            _ => Err(LinkError::InvalidState(
                "cannot close: not Connecting or Active",
            )),
        }
    }

    /// Valid from: `Closing`.
    pub fn finish_close(&mut self) -> Result<(), LinkError> {
        match self {
            Self::Closing => {
                *self = Self::Closed;
                Ok(())
            }
            _ => Err(LinkError::InvalidState("cannot finish close: not Closing")),
        }
    }
}

// ── StateCell ────────────────────────────────────────────────────

/// Shared, observable holder of an [`AdapterState`].
#[derive(Debug, Clone)]
pub(crate) struct StateCell(Arc<watch::Sender<AdapterState>>);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(Arc::new(watch::Sender::new(AdapterState::Idle)))
    }

    pub(crate) fn get(&self) -> AdapterState {
        self.0.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<AdapterState> {
        self.0.subscribe()
    }

    /// Apply a transition; observers are only notified when it succeeds.
    pub(crate) fn apply(
        &self,
        transition: impl FnOnce(&mut AdapterState) -> Result<(), LinkError>,
    ) -> Result<(), LinkError> {
        let mut outcome = Ok(());
        self.0.send_if_modified(|state| match transition(state) {
            Ok(()) => true,
            Err(e) => {
                outcome = Err(e);
                false
            }
        });
        outcome
    }
}
