//! UDP adapter: one datagram is one wire unit.

use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::reaper;
use crate::reassembly::ReassemblyManager;
use crate::wire::TransportKind;

use super::{AdapterState, LinkEvent, Shared, Transport, spawn_supervisor};

/// Receives fragments and ACKs from one device over UDP.
///
/// The receive task holds the only strong reference to the socket, so
/// the socket is released as soon as that task exits.
pub struct UdpAdapter {
    socket: Weak<UdpSocket>,
    local_addr: SocketAddr,
    peer: SocketAddr,
    shared: Shared,
    tasks: Vec<JoinHandle<()>>,
}

impl UdpAdapter {
    /// Bind `local`, start the receive and reaper tasks, and return the
    /// adapter together with its event stream.
    pub async fn bind(
        local: SocketAddr,
        peer: SocketAddr,
        config: LinkConfig,
    ) -> Result<(Self, mpsc::Receiver<LinkEvent>), LinkError> {
        config.validate()?;

        let (events_tx, events_rx) = mpsc::channel(config.event_capacity);
        let manager = ReassemblyManager::new(
            config.layout,
            config.policy_for(TransportKind::Udp),
            config.max_frame_bytes,
        );
        let shared = Shared::new(manager, events_tx, config.layout, TransportKind::Udp);
        shared.state.apply(AdapterState::begin_connect)?;

        let socket = match UdpSocket::bind(local).await {
            Ok(socket) => Arc::new(socket),
            Err(source) => {
                error!("UDP bind to {local} failed: {source}");
                let _ = shared.state.apply(AdapterState::begin_close);
                let _ = shared.state.apply(AdapterState::finish_close);
                return Err(LinkError::Bind { addr: local, source });
            }
        };
        let local_addr = socket.local_addr()?;
        shared.state.apply(AdapterState::activate)?;
        info!("UDP adapter listening on {local_addr}, device at {peer}");

        let weak = Arc::downgrade(&socket);
        let receiver = tokio::spawn(receive_loop(
            socket,
            shared.clone(),
            config.recv_buffer_size,
        ));
        let reaper = reaper::spawn(shared.clone(), config.sweep_interval, config.stale_after);
        let supervisor = spawn_supervisor(shared.clone(), vec![receiver]);

        Ok((
            Self {
                socket: weak,
                local_addr,
                peer,
                shared,
                tasks: vec![supervisor, reaper],
            },
            events_rx,
        ))
    }

    /// Address the socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Device address used by [`Transport::send`].
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Observe lifecycle changes.
    pub fn state_changes(&self) -> watch::Receiver<AdapterState> {
        self.shared.state.subscribe()
    }

    /// Frames currently under reassembly.
    pub fn in_flight(&self) -> usize {
        self.shared.manager.lock().len()
    }

    /// Send `bytes` to an arbitrary address from the bound socket.
    pub async fn send_to(&self, addr: SocketAddr, bytes: &[u8]) -> Result<(), LinkError> {
        self.shared.ensure_active()?;
        let socket = self
            .socket
            .upgrade()
            .ok_or(LinkError::InvalidState("socket released"))?;

        match socket.send_to(bytes, addr).await {
            Ok(n) => {
                trace!("UDP sent {n} bytes to {addr}");
                Ok(())
            }
            Err(e) => {
                self.shared.fail_now(format!("send to {addr} failed: {e}"));
                Err(LinkError::Io(e))
            }
        }
    }
}

#[async_trait]
impl Transport for UdpAdapter {
    fn kind(&self) -> TransportKind {
        TransportKind::Udp
    }

    fn state(&self) -> AdapterState {
        self.shared.state.get()
    }

    async fn send(&self, bytes: Bytes) -> Result<(), LinkError> {
        self.send_to(self.peer, &bytes).await
    }

    async fn stop(&mut self) -> Result<(), LinkError> {
        let tasks = std::mem::take(&mut self.tasks);
        self.shared.shutdown(tasks).await;
        Ok(())
    }
}

impl Drop for UdpAdapter {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

async fn receive_loop(socket: Arc<UdpSocket>, shared: Shared, buffer_size: usize) {
    let mut buf = vec![0u8; buffer_size];
    loop {
        let received = tokio::select! {
            _ = shared.cancel.cancelled() => break,
            r = socket.recv_from(&mut buf) => r,
        };
        match received {
            Ok((len, from)) => {
                trace!("UDP received {len} bytes from {from}");
                if !shared.on_datagram(&buf[..len]).await {
                    break;
                }
            }
            Err(e) => {
                shared.fail(format!("receive failed: {e}")).await;
                break;
            }
        }
    }
    debug!("UDP receive loop exited");
}
