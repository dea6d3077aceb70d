//! Transport adapters.
//!
//! An adapter owns one socket, a receive task and a reaper task. Both
//! tasks share the reassembly map behind a [`parking_lot::Mutex`] that is
//! held for the placement of one fragment or one sweep pass, never
//! across an `.await`. Everything the caller needs to know arrives on
//! the [`LinkEvent`] channel returned by the adapter constructor.

mod codec;
mod state;
mod tcp;
mod udp;

pub use codec::LinkCodec;
pub use state::AdapterState;
pub use tcp::TcpAdapter;
pub use udp::UdpAdapter;

pub(crate) use state::StateCell;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::control::AckCode;
use crate::error::{LinkError, WireError};
use crate::packet::Packet;
use crate::reassembly::{CompletionStatus, Eviction, Frame, FrameIdentity, ReassemblyManager};
use crate::request::Request;
use crate::wire::{TransportKind, WireLayout};

/// Reassembly map shared between an adapter's tasks.
pub type SharedManager = Arc<Mutex<ReassemblyManager>>;

// ── LinkEvent ────────────────────────────────────────────────────

/// Notification delivered to the adapter's owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Every fragment of a frame arrived.
    FrameComplete(Frame),
    /// A well-formed ACK packet arrived.
    AckArrived(AckCode),
    /// A partial frame went stale and was dropped.
    FrameEvicted(Eviction),
    /// The socket failed; the adapter is now closing.
    TransportError(String),
}

// ── Transport ────────────────────────────────────────────────────

/// Operations common to [`UdpAdapter`] and [`TcpAdapter`].
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    fn state(&self) -> AdapterState;

    /// Transmit raw bytes to the remote endpoint.
    async fn send(&self, bytes: Bytes) -> Result<(), LinkError>;

    /// Encode and transmit a host request.
    async fn send_request(&self, request: Request) -> Result<(), LinkError> {
        self.send(request.encode()).await
    }

    /// Cancel the tasks, release the socket and clear in-flight frames.
    ///
    /// Calling it again on a closed adapter is a no-op.
    async fn stop(&mut self) -> Result<(), LinkError>;
}

// ── Shared ───────────────────────────────────────────────────────

/// State handed to every task of one adapter.
#[derive(Debug, Clone)]
pub(crate) struct Shared {
    pub(crate) manager: SharedManager,
    pub(crate) events: mpsc::Sender<LinkEvent>,
    pub(crate) state: StateCell,
    pub(crate) cancel: CancellationToken,
    pub(crate) layout: WireLayout,
    pub(crate) kind: TransportKind,
}

impl Shared {
    pub(crate) fn new(
        manager: ReassemblyManager,
        events: mpsc::Sender<LinkEvent>,
        layout: WireLayout,
        kind: TransportKind,
    ) -> Self {
        Self {
            manager: Arc::new(Mutex::new(manager)),
            events,
            state: StateCell::new(),
            cancel: CancellationToken::new(),
            layout,
            kind,
        }
    }

    /// Deliver an event. `false` once the adapter is cancelled or the
    /// receiver is gone.
    pub(crate) async fn emit(&self, event: LinkEvent) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            sent = self.events.send(event) => {
                if sent.is_err() {
                    debug!("{} event receiver dropped; shutting down", self.kind);
                    self.cancel.cancel();
                }
                sent.is_ok()
            }
        }
    }

    /// Classify and dispatch one datagram.
    pub(crate) async fn on_datagram(&self, data: &[u8]) -> bool {
        self.dispatch(Packet::classify(data, &self.layout, self.kind))
            .await
    }

    /// Route one decoded unit: ACKs straight to the caller, fragments
    /// through reassembly. Malformed and rejected input is logged and
    /// dropped.
    pub(crate) async fn dispatch(&self, packet: Result<Packet, WireError>) -> bool {
        match packet {
            Err(e) => {
                warn!("{} dropping malformed packet: {e}", self.kind);
                true
            }
            Ok(Packet::Ack(code)) => {
                info!("{} ACK received: {code}", self.kind);
                self.emit(LinkEvent::AckArrived(code)).await
            }
            Ok(Packet::Fragment(fragment)) => {
                let identity = FrameIdentity::of(&fragment);
                let (index, count) = (fragment.index, fragment.count);
                let status = self.manager.lock().submit(fragment, Instant::now());
                match status {
                    CompletionStatus::InProgress => {
                        debug!("frame {identity}: fragment {index}/{count} placed");
                        true
                    }
                    CompletionStatus::Duplicate => {
                        debug!("frame {identity}: duplicate fragment {index} ignored");
                        true
                    }
                    CompletionStatus::Rejected(e) => {
                        warn!("frame {identity}: fragment {index} rejected: {e}");
                        true
                    }
                    CompletionStatus::Complete(frame) => {
                        info!(
                            "frame {identity} complete: {}x{} {}, {} bytes",
                            frame.width,
                            frame.height,
                            frame.format,
                            frame.data.len()
                        );
                        self.emit(LinkEvent::FrameComplete(frame)).await
                    }
                }
            }
        }
    }

    /// Fatal error from a background task: report it, then wind down.
    pub(crate) async fn fail(&self, message: String) {
        error!("{} adapter failed: {message}", self.kind);
        let _ = self.state.apply(AdapterState::begin_close);
        self.emit(LinkEvent::TransportError(message)).await;
        self.cancel.cancel();
    }

    /// Fatal error on the caller's path. Never waits for channel room.
    pub(crate) fn fail_now(&self, message: String) {
        error!("{} adapter failed: {message}", self.kind);
        let _ = self.state.apply(AdapterState::begin_close);
        if self
            .events
            .try_send(LinkEvent::TransportError(message))
            .is_err()
        {
            debug!("{} error event not delivered", self.kind);
        }
        self.cancel.cancel();
    }

    pub(crate) fn ensure_active(&self) -> Result<(), LinkError> {
        if self.state.get().is_active() {
            Ok(())
        } else {
            Err(LinkError::InvalidState("adapter is not active"))
        }
    }

    /// Cancel every task of the adapter and wait for them to finish.
    /// The supervisor among `tasks` performs the final transition.
    pub(crate) async fn shutdown(&self, tasks: Vec<JoinHandle<()>>) {
        if self.state.apply(AdapterState::begin_close).is_ok() {
            info!("{} adapter stopping", self.kind);
        }
        self.cancel.cancel();
        join_all(self.kind, tasks).await;
    }
}

async fn join_all(kind: TransportKind, tasks: Vec<JoinHandle<()>>) {
    for task in tasks {
        if let Err(e) = task.await {
            if e.is_panic() {
                error!("{kind} adapter task panicked: {e}");
            }
        }
    }
}

/// Spawn the task that finishes an adapter once it is cancelled.
///
/// It waits for the socket-owning `io_tasks` to exit, discards any
/// partial frames and moves the state to `Closed`. Cancellation comes
/// either from `stop()` or from a fatal socket error.
pub(crate) fn spawn_supervisor(shared: Shared, io_tasks: Vec<JoinHandle<()>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        shared.cancel.cancelled().await;
        join_all(shared.kind, io_tasks).await;

        let dropped = {
            let mut manager = shared.manager.lock();
            let n = manager.len();
            manager.clear();
            n
        };
        if dropped > 0 {
            debug!("{} adapter discarded {dropped} partial frame(s)", shared.kind);
        }

        let _ = shared.state.apply(AdapterState::begin_close);
        if shared.state.apply(AdapterState::finish_close).is_ok() {
            info!("{} adapter closed", shared.kind);
        }
    })
}

/// Sweep results as events; `false` when the receiver is gone.
pub(crate) async fn report_evictions(shared: &Shared, evicted: Vec<Eviction>) -> bool {
    for eviction in evicted {
        warn!("{} {eviction}", shared.kind);
        if !shared.emit(LinkEvent::FrameEvicted(eviction)).await {
            return false;
        }
    }
    true
}
