//! # imglink-session: host-side request/ACK driver
//!
//! Opens a UDP or TCP adapter from [`imglink_core`], performs the
//! connect / get-image / disconnect exchanges with the device and turns
//! missing ACKs into timeout events.

pub mod config;
pub mod error;
pub mod phase;
pub mod session;

pub use config::SessionConfig;
pub use error::SessionError;
pub use phase::SessionPhase;
pub use session::{Session, SessionEvent};

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber. `RUST_LOG` wins over `level` when set.
///
/// Safe to call more than once; later calls leave the first subscriber
/// in place.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
