//! Request/ACK driver over one transport adapter.
//!
//! A [`Session`] sends the host requests, keeps the two single-shot
//! deadlines (connect-ack and image) and turns adapter events into
//! [`SessionEvent`]s. Arming a deadline replaces any pending one of the
//! same kind.

use imglink_core::{
    AckCode, AdapterState, Eviction, Frame, LinkEvent, Request, TcpAdapter, Transport,
    TransportKind, UdpAdapter,
};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, info, warn};

use crate::config::{SessionConfig, TimeoutConfig};
use crate::error::SessionError;
use crate::phase::SessionPhase;

// ── SessionEvent ─────────────────────────────────────────────────

/// What the session reports to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The device acknowledged the connect request.
    Connected,
    /// The device acknowledged the disconnect request; the adapter is stopped.
    Disconnected,
    Frame(Frame),
    Evicted(Eviction),
    /// Any ACK without a dedicated event.
    Ack(AckCode),
    /// No ACK arrived in time; a disconnect request was sent and the
    /// adapter stopped.
    ConnectTimeout,
    /// No frame arrived in time after an image request.
    ImageTimeout,
    /// The adapter failed and has been stopped.
    TransportError(String),
    /// Final event; `next_event` returns `None` afterwards.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseState {
    Open,
    Pending,
    Reported,
}

enum Wake {
    Link(Option<LinkEvent>),
    ConnectDeadline,
    ImageDeadline,
}

// ── Session ──────────────────────────────────────────────────────

pub struct Session {
    link: Box<dyn Transport>,
    events: mpsc::Receiver<LinkEvent>,
    timeouts: TimeoutConfig,
    phase: SessionPhase,
    connect_deadline: Option<Instant>,
    image_deadline: Option<Instant>,
    close: CloseState,
}

impl Session {
    /// Start the adapter named by `config.network.mode`.
    pub async fn open(config: SessionConfig) -> Result<Self, SessionError> {
        let (local, device) = config.parse_addresses()?;
        let link_config = config.to_link_config();
        let mode = config.network.mode;
        info!("opening {mode} session: local {local}, device {device}");

        let (link, events) = match mode {
            TransportKind::Udp => {
                let (adapter, events) = UdpAdapter::bind(local, device, link_config).await?;
                (Box::new(adapter) as Box<dyn Transport>, events)
            }
            TransportKind::Tcp => {
                let (adapter, events) = TcpAdapter::connect(local, device, link_config).await?;
                (Box::new(adapter) as Box<dyn Transport>, events)
            }
        };
        Ok(Self::from_transport(link, events, config.timeouts))
    }

    /// Drive an already started transport.
    pub fn from_transport(
        link: Box<dyn Transport>,
        events: mpsc::Receiver<LinkEvent>,
        timeouts: TimeoutConfig,
    ) -> Self {
        Self {
            link,
            events,
            timeouts,
            phase: SessionPhase::Disconnected,
            connect_deadline: None,
            image_deadline: None,
            close: CloseState::Open,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn transport_state(&self) -> AdapterState {
        self.link.state()
    }

    pub fn is_closed(&self) -> bool {
        self.close != CloseState::Open
    }

    // ── Requests ─────────────────────────────────────────────────

    /// Wait the transport's connect delay, send a connect request and
    /// arm the connect-ack deadline.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.phase.begin_connect()?;

        sleep(self.timeouts.connect_delay(self.link.kind())).await;
        if let Err(e) = self.link.send_request(Request::Connect).await {
            self.phase.reset();
            return Err(e.into());
        }
        self.arm_connect_deadline();
        info!("connect request sent");
        Ok(())
    }

    /// Send a disconnect request and arm the connect-ack deadline.
    pub async fn disconnect(&mut self) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.phase.begin_disconnect()?;

        if let Err(e) = self.link.send_request(Request::Disconnect).await {
            self.phase = SessionPhase::Connected;
            return Err(e.into());
        }
        self.arm_connect_deadline();
        info!("disconnect request sent");
        Ok(())
    }

    /// Ask the device for one frame and arm the image deadline.
    pub async fn request_image(&mut self) -> Result<(), SessionError> {
        self.ensure_open()?;
        if !self.phase.is_connected() {
            return Err(SessionError::InvalidPhase(
                "image requests need a connected device",
            ));
        }
        self.link.send_request(Request::GetImage).await?;
        self.image_deadline = Some(Instant::now() + self.timeouts.image_ack());
        debug!("image request sent");
        Ok(())
    }

    /// Stop the adapter without a handshake.
    pub async fn close(&mut self) {
        if self.close == CloseState::Open {
            self.shut_down().await;
        }
    }

    // ── Events ───────────────────────────────────────────────────

    /// Wait for the next event. Returns `None` after `Closed`.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            match self.close {
                CloseState::Reported => return None,
                CloseState::Pending => {
                    self.close = CloseState::Reported;
                    return Some(SessionEvent::Closed);
                }
                CloseState::Open => {}
            }

            let wake = tokio::select! {
                event = self.events.recv() => Wake::Link(event),
                _ = wait_until(self.connect_deadline) => Wake::ConnectDeadline,
                _ = wait_until(self.image_deadline) => Wake::ImageDeadline,
            };

            match wake {
                Wake::Link(Some(event)) => return Some(self.on_link_event(event).await),
                Wake::Link(None) => self.shut_down().await,
                Wake::ConnectDeadline => return Some(self.on_connect_timeout().await),
                Wake::ImageDeadline => {
                    self.image_deadline = None;
                    warn!("no frame within {:?} of the image request", self.timeouts.image_ack());
                    return Some(SessionEvent::ImageTimeout);
                }
            }
        }
    }

    async fn on_link_event(&mut self, event: LinkEvent) -> SessionEvent {
        match event {
            LinkEvent::AckArrived(code) => self.on_ack(code).await,
            LinkEvent::FrameComplete(frame) => {
                self.image_deadline = None;
                SessionEvent::Frame(frame)
            }
            LinkEvent::FrameEvicted(eviction) => SessionEvent::Evicted(eviction),
            LinkEvent::TransportError(message) => {
                self.shut_down().await;
                SessionEvent::TransportError(message)
            }
        }
    }

    async fn on_ack(&mut self, code: AckCode) -> SessionEvent {
        self.connect_deadline = None;
        match code {
            AckCode::ConnectAck => match self.phase.confirm_connected() {
                Ok(()) => {
                    info!("device connected");
                    SessionEvent::Connected
                }
                Err(e) => {
                    warn!("{e} (phase {})", self.phase);
                    SessionEvent::Ack(code)
                }
            },
            AckCode::DisconnectAck => {
                info!("device disconnected");
                self.shut_down().await;
                SessionEvent::Disconnected
            }
            other => {
                debug!("ACK {other} passed through");
                SessionEvent::Ack(other)
            }
        }
    }

    async fn on_connect_timeout(&mut self) -> SessionEvent {
        self.connect_deadline = None;
        warn!(
            "device did not answer within {:?}; giving up",
            self.timeouts.connect_ack()
        );
        if let Err(e) = self.link.send_request(Request::Disconnect).await {
            debug!("disconnect request after timeout not sent: {e}");
        }
        self.shut_down().await;
        SessionEvent::ConnectTimeout
    }

    // ── Helpers ──────────────────────────────────────────────────

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.close == CloseState::Open {
            Ok(())
        } else {
            Err(SessionError::Closed)
        }
    }

    fn arm_connect_deadline(&mut self) {
        self.connect_deadline = Some(Instant::now() + self.timeouts.connect_ack());
    }

    async fn shut_down(&mut self) {
        self.connect_deadline = None;
        self.image_deadline = None;
        self.phase.reset();
        if let Err(e) = self.link.stop().await {
            warn!("stopping {} adapter failed: {e}", self.link.kind());
        }
        if self.close == CloseState::Open {
            self.close = CloseState::Pending;
        }
        info!("session closed");
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use imglink_core::{LinkError, PixelFormat, control};

    /// Transport double that records the ACK codes it is asked to send.
    struct FakeLink {
        sent: mpsc::UnboundedSender<AckCode>,
        state: Mutex<AdapterState>,
    }

    #[async_trait]
    impl Transport for FakeLink {
        fn kind(&self) -> TransportKind {
            TransportKind::Udp
        }

        fn state(&self) -> AdapterState {
            self.state.lock().unwrap().clone()
        }

        async fn send(&self, bytes: Bytes) -> Result<(), LinkError> {
            if !self.state().is_active() {
                return Err(LinkError::InvalidState("adapter is not active"));
            }
            self.sent.send(control::decode(&bytes).unwrap()).unwrap();
            Ok(())
        }

        async fn stop(&mut self) -> Result<(), LinkError> {
            *self.state.lock().unwrap() = AdapterState::Closed;
            Ok(())
        }
    }

    struct Harness {
        session: Session,
        device: mpsc::Sender<LinkEvent>,
        sent: mpsc::UnboundedReceiver<AckCode>,
    }

    fn harness() -> Harness {
        let (sent_tx, sent) = mpsc::unbounded_channel();
        let (device, events) = mpsc::channel(16);
        let link = FakeLink {
            sent: sent_tx,
            state: Mutex::new(AdapterState::Active {
                since: Instant::now(),
            }),
        };
        Harness {
            session: Session::from_transport(Box::new(link), events, TimeoutConfig::default()),
            device,
            sent,
        }
    }

    async fn connected() -> Harness {
        let mut h = harness();
        h.session.connect().await.unwrap();
        h.device
            .send(LinkEvent::AckArrived(AckCode::ConnectAck))
            .await
            .unwrap();
        assert_eq!(h.session.next_event().await, Some(SessionEvent::Connected));
        assert_eq!(h.sent.recv().await, Some(AckCode::ConnectRequest));
        h
    }

    fn frame() -> Frame {
        Frame {
            data: Bytes::from_static(&[0; 6]),
            width: 2,
            height: 2,
            format: PixelFormat::Yuv420Sp,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn connect_waits_before_sending() {
        let mut h = harness();
        let start = Instant::now();
        h.session.connect().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert_eq!(h.sent.recv().await, Some(AckCode::ConnectRequest));
        assert_eq!(h.session.phase(), SessionPhase::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_ack_clears_deadline() {
        let mut h = connected().await;
        assert_eq!(h.session.phase(), SessionPhase::Connected);
        let waited = tokio::time::timeout(Duration::from_secs(30), h.session.next_event()).await;
        assert!(waited.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeout_disconnects_and_closes() {
        let mut h = harness();
        h.session.connect().await.unwrap();
        let armed = Instant::now();

        assert_eq!(h.session.next_event().await, Some(SessionEvent::ConnectTimeout));
        assert!(armed.elapsed() >= Duration::from_secs(3));
        assert_eq!(h.sent.recv().await, Some(AckCode::ConnectRequest));
        assert_eq!(h.sent.recv().await, Some(AckCode::DisconnectRequest));
        assert_eq!(h.session.phase(), SessionPhase::Disconnected);
        assert!(h.session.transport_state().is_closed());

        assert_eq!(h.session.next_event().await, Some(SessionEvent::Closed));
        assert_eq!(h.session.next_event().await, None);
        assert!(matches!(h.session.connect().await, Err(SessionError::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn any_ack_stops_connect_deadline() {
        let mut h = harness();
        h.session.connect().await.unwrap();
        h.device
            .send(LinkEvent::AckArrived(AckCode::Other(0x0010)))
            .await
            .unwrap();
        assert_eq!(
            h.session.next_event().await,
            Some(SessionEvent::Ack(AckCode::Other(0x0010)))
        );
        let waited = tokio::time::timeout(Duration::from_secs(30), h.session.next_event()).await;
        assert!(waited.is_err());
        assert_eq!(h.session.phase(), SessionPhase::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn image_deadline_fires_without_frame() {
        let mut h = connected().await;
        h.session.request_image().await.unwrap();
        assert_eq!(h.sent.recv().await, Some(AckCode::GetImageRequest));

        let asked = Instant::now();
        assert_eq!(h.session.next_event().await, Some(SessionEvent::ImageTimeout));
        assert!(asked.elapsed() >= Duration::from_secs(4));
        assert!(h.session.phase().is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn frame_cancels_image_deadline() {
        let mut h = connected().await;
        h.session.request_image().await.unwrap();
        h.device
            .send(LinkEvent::FrameComplete(frame()))
            .await
            .unwrap();
        assert_eq!(h.session.next_event().await, Some(SessionEvent::Frame(frame())));

        let waited = tokio::time::timeout(Duration::from_secs(30), h.session.next_event()).await;
        assert!(waited.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_supersedes_pending_deadline() {
        let mut h = connected().await;
        h.session.request_image().await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        h.session.request_image().await.unwrap();

        let rearmed = Instant::now();
        assert_eq!(h.session.next_event().await, Some(SessionEvent::ImageTimeout));
        assert!(rearmed.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_ack_stops_adapter() {
        let mut h = connected().await;
        h.session.disconnect().await.unwrap();
        assert_eq!(h.sent.recv().await, Some(AckCode::DisconnectRequest));
        assert_eq!(h.session.phase(), SessionPhase::Disconnecting);

        h.device
            .send(LinkEvent::AckArrived(AckCode::DisconnectAck))
            .await
            .unwrap();
        assert_eq!(h.session.next_event().await, Some(SessionEvent::Disconnected));
        assert!(h.session.transport_state().is_closed());
        assert_eq!(h.session.next_event().await, Some(SessionEvent::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn image_request_needs_connection() {
        let mut h = harness();
        assert!(matches!(
            h.session.request_image().await,
            Err(SessionError::InvalidPhase(_))
        ));
        assert!(matches!(
            h.session.disconnect().await,
            Err(SessionError::InvalidPhase(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_closes_session() {
        let mut h = connected().await;
        h.device
            .send(LinkEvent::TransportError("connection closed by peer".into()))
            .await
            .unwrap();
        assert_eq!(
            h.session.next_event().await,
            Some(SessionEvent::TransportError("connection closed by peer".into()))
        );
        assert_eq!(h.session.next_event().await, Some(SessionEvent::Closed));
        assert!(h.session.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn evictions_pass_through() {
        let mut h = connected().await;
        let eviction = Eviction {
            identity: imglink_core::FrameIdentity::new(64, 6),
            width: 64,
            height: 64,
            received: 2,
            expected: 6,
            missing: vec![2, 3, 4, 5],
        };
        h.device
            .send(LinkEvent::FrameEvicted(eviction.clone()))
            .await
            .unwrap();
        assert_eq!(h.session.next_event().await, Some(SessionEvent::Evicted(eviction)));
    }
}
