//! Engine configuration shared by both transport adapters.

use std::time::Duration;

use crate::error::LinkError;
use crate::reassembly::FirstFragmentPolicy;
use crate::wire::{TransportKind, WireLayout};

// ── LinkConfig ───────────────────────────────────────────────────

/// Configuration for a [`UdpAdapter`](crate::transport::UdpAdapter) or
/// [`TcpAdapter`](crate::transport::TcpAdapter).
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Fragment layout (payload block size, TCP padding).
    pub layout: WireLayout,
    /// How often the reaper scans for stalled frames.
    pub sweep_interval: Duration,
    /// Idle time after which a partial frame is evicted.
    pub stale_after: Duration,
    /// Largest frame payload the engine will allocate.
    pub max_frame_bytes: usize,
    /// Capacity of the event channel handed to the caller.
    pub event_capacity: usize,
    /// Size of the datagram / stream read buffer.
    pub recv_buffer_size: usize,
    /// Overrides the transport's default first-fragment policy.
    pub first_fragment_policy: Option<FirstFragmentPolicy>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            layout: WireLayout::default(),
            sweep_interval: Duration::from_secs(1),
            stale_after: Duration::from_secs(3),
            max_frame_bytes: 64 * 1024 * 1024,
            event_capacity: 256,
            recv_buffer_size: 4096,
            first_fragment_policy: None,
        }
    }
}

impl LinkConfig {
    /// Policy in effect for `transport`.
    pub fn policy_for(&self, transport: TransportKind) -> FirstFragmentPolicy {
        self.first_fragment_policy
            .unwrap_or(FirstFragmentPolicy::for_transport(transport))
    }

    /// Reject settings the adapters cannot run with.
    pub fn validate(&self) -> Result<(), LinkError> {
        if self.layout.payload_size == 0 {
            return Err(LinkError::Config("payload_size must be non-zero".into()));
        }
        if self.layout.payload_size > u16::MAX as usize {
            return Err(LinkError::Config(format!(
                "payload_size {} does not fit the 16-bit valid-length field",
                self.layout.payload_size
            )));
        }
        if self.sweep_interval.is_zero() {
            return Err(LinkError::Config("sweep_interval must be non-zero".into()));
        }
        if self.event_capacity == 0 {
            return Err(LinkError::Config("event_capacity must be non-zero".into()));
        }
        if self.recv_buffer_size <= self.layout.fragment_size(TransportKind::Tcp) {
            return Err(LinkError::Config(format!(
                "recv_buffer_size {} must exceed the fragment size",
                self.recv_buffer_size
            )));
        }
        Ok(())
    }
}
