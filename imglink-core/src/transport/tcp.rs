//! TCP adapter: a byte stream of ACKs and padded fragments.

use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};

use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::reaper;
use crate::reassembly::ReassemblyManager;
use crate::wire::TransportKind;

use super::{AdapterState, LinkCodec, LinkEvent, Shared, Transport, spawn_supervisor};

/// Depth of the queue between `send` and the writer task.
const OUTBOUND_CAPACITY: usize = 32;

/// Connects to a device over TCP and reassembles the frames it streams.
///
/// The read half lives in the receive task and the write half in the
/// writer task; the adapter itself only keeps the writer queue.
pub struct TcpAdapter {
    outbound: mpsc::Sender<Bytes>,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    shared: Shared,
    tasks: Vec<JoinHandle<()>>,
}

impl TcpAdapter {
    /// Bind `local` with `SO_REUSEADDR`, connect to `remote`, and start
    /// the receive, writer and reaper tasks.
    pub async fn connect(
        local: SocketAddr,
        remote: SocketAddr,
        config: LinkConfig,
    ) -> Result<(Self, mpsc::Receiver<LinkEvent>), LinkError> {
        config.validate()?;

        let (events_tx, events_rx) = mpsc::channel(config.event_capacity);
        let manager = ReassemblyManager::new(
            config.layout,
            config.policy_for(TransportKind::Tcp),
            config.max_frame_bytes,
        );
        let shared = Shared::new(manager, events_tx, config.layout, TransportKind::Tcp);
        shared.state.apply(AdapterState::begin_connect)?;

        let stream = match open(local, remote).await {
            Ok(stream) => stream,
            Err(e) => {
                error!("TCP connect {local} -> {remote} failed: {e}");
                let _ = shared.state.apply(AdapterState::begin_close);
                let _ = shared.state.apply(AdapterState::finish_close);
                return Err(e);
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            warn!("failed to set TCP_NODELAY: {e}");
        }
        let local_addr = stream.local_addr()?;
        let peer_addr = stream.peer_addr()?;
        shared.state.apply(AdapterState::activate)?;
        info!("TCP adapter connected {local_addr} -> {peer_addr}");

        let (read_half, write_half) = stream.into_split();
        let reader = FramedRead::with_capacity(
            read_half,
            LinkCodec::new(config.layout),
            config.recv_buffer_size,
        );
        let writer = FramedWrite::new(write_half, LinkCodec::new(config.layout));
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);

        let receiver = tokio::spawn(receive_loop(reader, shared.clone()));
        let writer = tokio::spawn(write_loop(writer, outbound_rx, shared.clone()));
        let reaper = reaper::spawn(shared.clone(), config.sweep_interval, config.stale_after);
        let supervisor = spawn_supervisor(shared.clone(), vec![receiver, writer]);

        Ok((
            Self {
                outbound,
                local_addr,
                peer_addr,
                shared,
                tasks: vec![supervisor, reaper],
            },
            events_rx,
        ))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Observe lifecycle changes.
    pub fn state_changes(&self) -> watch::Receiver<AdapterState> {
        self.shared.state.subscribe()
    }

    /// Frames currently under reassembly.
    pub fn in_flight(&self) -> usize {
        self.shared.manager.lock().len()
    }
}

#[async_trait]
impl Transport for TcpAdapter {
    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }

    fn state(&self) -> AdapterState {
        self.shared.state.get()
    }

    async fn send(&self, bytes: Bytes) -> Result<(), LinkError> {
        self.shared.ensure_active()?;
        self.outbound.send(bytes).await?;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), LinkError> {
        let tasks = std::mem::take(&mut self.tasks);
        self.shared.shutdown(tasks).await;
        Ok(())
    }
}

impl Drop for TcpAdapter {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

async fn open(local: SocketAddr, remote: SocketAddr) -> Result<TcpStream, LinkError> {
    let bind_err = |source: std::io::Error| LinkError::Bind { addr: local, source };

    let socket = if local.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(bind_err)?;
    socket.set_reuseaddr(true).map_err(bind_err)?;
    socket.bind(local).map_err(bind_err)?;

    socket
        .connect(remote)
        .await
        .map_err(|source| LinkError::Connect { addr: remote, source })
}

async fn receive_loop(mut reader: FramedRead<OwnedReadHalf, LinkCodec>, shared: Shared) {
    loop {
        let next = tokio::select! {
            _ = shared.cancel.cancelled() => break,
            next = reader.next() => next,
        };
        match next {
            Some(Ok(unit)) => {
                if !shared.dispatch(unit).await {
                    break;
                }
            }
            Some(Err(e)) => {
                shared.fail(format!("receive failed: {e}")).await;
                break;
            }
            None => {
                shared.fail("connection closed by peer".to_string()).await;
                break;
            }
        }
    }
    debug!("TCP receive loop exited");
}

async fn write_loop(
    mut writer: FramedWrite<OwnedWriteHalf, LinkCodec>,
    mut outbound: mpsc::Receiver<Bytes>,
    shared: Shared,
) {
    loop {
        let bytes = tokio::select! {
            _ = shared.cancel.cancelled() => break,
            next = outbound.recv() => match next {
                Some(bytes) => bytes,
                None => break,
            },
        };
        let written = tokio::select! {
            _ = shared.cancel.cancelled() => break,
            written = writer.send(bytes) => written,
        };
        if let Err(e) = written {
            shared.fail(format!("write failed: {e}")).await;
            break;
        }
    }
    debug!("TCP writer exited");
}
