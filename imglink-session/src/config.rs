//! Session configuration, loaded from TOML.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use imglink_core::{LinkConfig, TransportKind, WireLayout};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Top-level configuration for a host session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Transport and endpoints.
    pub network: NetworkConfig,
    /// Handshake timing.
    pub timeouts: TimeoutConfig,
    /// Reassembly tuning.
    pub reassembly: ReassemblyConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Transport and endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// `"udp"` or `"tcp"`.
    pub mode: TransportKind,
    /// Host endpoint. UDP listens here; TCP binds here before connecting.
    pub local_address: String,
    /// Device endpoint that receives requests.
    pub device_address: String,
}

/// Handshake timing, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Wait for any ACK after a connect or disconnect request.
    pub connect_ack_ms: u64,
    /// Wait for a frame after a get-image request.
    pub image_ack_ms: u64,
    /// Pause before the connect request on UDP.
    pub udp_connect_delay_ms: u64,
    /// Pause before the connect request on TCP.
    pub tcp_connect_delay_ms: u64,
}

/// Reassembly tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReassemblyConfig {
    /// Payload block size of each fragment.
    pub payload_size: usize,
    /// Trailing padding of each TCP fragment.
    pub tcp_padding: usize,
    /// Reaper period in milliseconds.
    pub sweep_interval_ms: u64,
    /// Idle time in milliseconds before a partial frame is evicted.
    pub stale_after_ms: u64,
    /// Largest frame the engine will allocate.
    pub max_frame_bytes: usize,
    /// Depth of the adapter event queue.
    pub event_capacity: usize,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mode: TransportKind::Udp,
            local_address: "0.0.0.0:8080".into(),
            device_address: "192.168.1.100:8080".into(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ack_ms: 3000,
            image_ack_ms: 4000,
            udp_connect_delay_ms: 300,
            tcp_connect_delay_ms: 500,
        }
    }
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        let link = LinkConfig::default();
        Self {
            payload_size: link.layout.payload_size,
            tcp_padding: link.layout.tcp_padding,
            sweep_interval_ms: link.sweep_interval.as_millis() as u64,
            stale_after_ms: link.stale_after.as_millis() as u64,
            max_frame_bytes: link.max_frame_bytes,
            event_capacity: link.event_capacity,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl TimeoutConfig {
    pub fn connect_ack(&self) -> Duration {
        Duration::from_millis(self.connect_ack_ms)
    }

    pub fn image_ack(&self) -> Duration {
        Duration::from_millis(self.image_ack_ms)
    }

    /// Delay before the connect request for the given transport.
    pub fn connect_delay(&self, mode: TransportKind) -> Duration {
        match mode {
            TransportKind::Udp => Duration::from_millis(self.udp_connect_delay_ms),
            TransportKind::Tcp => Duration::from_millis(self.tcp_connect_delay_ms),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl SessionConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write default config to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Engine settings for the adapter.
    ///
    /// The TCP read buffer grows with the payload size so that a whole
    /// fragment always fits.
    pub fn to_link_config(&self) -> LinkConfig {
        let r = &self.reassembly;
        let layout = WireLayout {
            payload_size: r.payload_size,
            tcp_padding: r.tcp_padding,
        };
        let defaults = LinkConfig::default();
        LinkConfig {
            recv_buffer_size: defaults
                .recv_buffer_size
                .max(layout.fragment_size(TransportKind::Tcp) + 1),
            layout,
            sweep_interval: Duration::from_millis(r.sweep_interval_ms),
            stale_after: Duration::from_millis(r.stale_after_ms),
            max_frame_bytes: r.max_frame_bytes,
            event_capacity: r.event_capacity,
            ..defaults
        }
    }

    /// `(local, device)` socket addresses.
    pub fn parse_addresses(&self) -> Result<(SocketAddr, SocketAddr), SessionError> {
        let parse = |field: &'static str, value: &str| {
            value
                .parse::<SocketAddr>()
                .map_err(|source| SessionError::Address {
                    field,
                    value: value.to_string(),
                    source,
                })
        };
        Ok((
            parse("local_address", &self.network.local_address)?,
            parse("device_address", &self.network.device_address)?,
        ))
    }
}

// ── Tests ────────────────────────────────────────────────────────
