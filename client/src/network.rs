//! Client network layer: one UDP connection to a server, serviced by a background worker thread

use log::{debug, error, info, trace, warn};
use rand::Rng;
use shared::{
    Delivery, DisconnectReason, Frame, Peer, PeerConfig, PeerEvent, PeerState, TransportError,
    DEFAULT_PORT, MAX_DATAGRAM_SIZE, MAX_PAYLOAD_SIZE,
};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket as StdUdpSocket};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};

/// How often the worker drives resends, keepalives and timeouts
const SERVICE_INTERVAL: Duration = Duration::from_millis(10);

/// Callbacks invoked from [`Client::consume_events`] on the caller's thread.
pub trait ClientEventHandler {
    /// The server accepted the handshake.
    fn on_connected(&mut self);
    /// The connection ended. Called at most once per connection.
    fn on_disconnected(&mut self);
    /// One payload from the server.
    fn on_data_received(&mut self, data: &[u8]);
}

/// Where to connect and how patient to be about it.
#[derive(Debug, Clone)]
pub struct ClientConnectParams {
    server_host_name: String,
    server_port: u16,
    peer: PeerConfig,
}

impl Default for ClientConnectParams {
    fn default() -> Self {
        Self {
            server_host_name: "127.0.0.1".to_string(),
            server_port: DEFAULT_PORT,
            peer: PeerConfig::default(),
        }
    }
}

impl ClientConnectParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Must match the server's channel count or the handshake is rejected.
    pub fn set_channel_count(mut self, channel_count: u8) -> Self {
        self.peer.channel_count = channel_count;
        self
    }

    /// Host names are resolved in [`Client::connect`], preferring IPv4.
    pub fn set_server_host_name_and_port(mut self, host_name: &str, port: u16) -> Self {
        self.server_host_name = host_name.to_string();
        self.server_port = port;
        self
    }

    /// Upper bound for the handshake.
    pub fn set_timeout(mut self, timeout: Duration) -> Self {
        self.peer.connect_timeout = timeout;
        self
    }

    /// Replaces every reliability timing at once. The channel count and
    /// handshake timeout come from `peer` as well.
    pub fn set_peer_config(mut self, peer: PeerConfig) -> Self {
        self.peer = peer;
        self
    }

    pub fn server_host_name(&self) -> &str {
        &self.server_host_name
    }

    pub fn server_port(&self) -> u16 {
        self.server_port
    }

    pub fn channel_count(&self) -> u8 {
        self.peer.channel_count
    }

    pub fn timeout(&self) -> Duration {
        self.peer.connect_timeout
    }

    pub fn peer_config(&self) -> &PeerConfig {
        &self.peer
    }
}

/// Messages sent from the worker to the owning thread
#[derive(Debug)]
pub enum ClientEvent {
    /// Handshake finished.
    Connected,
    /// The connection is gone and the worker is about to exit.
    Disconnected(DisconnectReason),
    /// One application payload, in delivery order for reliable data.
    Data { channel: u8, payload: Vec<u8> },
}

/// Messages sent from the owning thread to the worker
#[derive(Debug)]
struct OutgoingPacket {
    channel: u8,
    payload: Vec<u8>,
    delivery: Delivery,
}

/// Where the client is in its connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    /// No worker running.
    Idle,
    /// Worker started, handshake not finished.
    Connecting,
    Connected,
    /// The last connection attempt or connection ended abnormally.
    Error,
}

/// Connection quality as last measured by the worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStatistics {
    /// Smoothed round-trip time to the server.
    pub round_trip_time: Duration,
    /// Mean deviation of the round-trip samples.
    pub round_trip_time_variance: Duration,
}

#[derive(Debug, Default)]
struct SharedStatistics {
    rtt_micros: AtomicU64,
    rtt_var_micros: AtomicU64,
}

impl SharedStatistics {
    fn store(&self, peer: &Peer) {
        self.rtt_micros
            .store(peer.round_trip_time().as_micros() as u64, Ordering::Relaxed);
        self.rtt_var_micros.store(
            peer.round_trip_time_variance().as_micros() as u64,
            Ordering::Relaxed,
        );
    }

    fn load(&self) -> ClientStatistics {
        ClientStatistics {
            round_trip_time: Duration::from_micros(self.rtt_micros.load(Ordering::Relaxed)),
            round_trip_time_variance: Duration::from_micros(
                self.rtt_var_micros.load(Ordering::Relaxed),
            ),
        }
    }

    fn reset(&self) {
        self.rtt_micros.store(0, Ordering::Relaxed);
        self.rtt_var_micros.store(0, Ordering::Relaxed);
    }
}

/// Handles owned by the main thread while a worker runs
struct WorkerHandle {
    thread: JoinHandle<()>,
    outbound_tx: mpsc::UnboundedSender<OutgoingPacket>,
    events_rx: mpsc::UnboundedReceiver<ClientEvent>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handshake_rx: Option<oneshot::Receiver<Result<(), TransportError>>>,
}

/// Client half of the transport.
///
/// All methods are called from one thread (normally the game loop). The
/// socket lives on a background thread; the two sides talk through queues
/// so nothing here ever waits on the network except
/// [`wait_for_connection`](Self::wait_for_connection) and
/// [`disconnect`](Self::disconnect).
pub struct Client {
    worker: Option<WorkerHandle>,
    status: ClientStatus,
    channel_count: u8,
    server_addr: Option<SocketAddr>,
    statistics: Arc<SharedStatistics>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    pub fn new() -> Self {
        Self {
            worker: None,
            status: ClientStatus::Idle,
            channel_count: 0,
            server_addr: None,
            statistics: Arc::new(SharedStatistics::default()),
        }
    }

    /// Resolves the server and binds a local socket, then starts the worker.
    ///
    /// Returns as soon as the worker is running; the handshake continues in
    /// the background. Use [`wait_for_connection`](Self::wait_for_connection)
    /// to block until it finishes.
    pub fn connect(&mut self, params: &ClientConnectParams) -> Result<(), TransportError> {
        if self.worker.is_some() {
            return Err(TransportError::AlreadyRunning);
        }

        let server_addr = resolve(params.server_host_name(), params.server_port())?;
        let local_addr: SocketAddr = if server_addr.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = StdUdpSocket::bind(local_addr)?;
        socket.set_nonblocking(true)?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (handshake_tx, handshake_rx) = oneshot::channel();

        let nonce: u64 = rand::thread_rng().gen();
        let peer = Peer::connecting(server_addr, params.peer_config().clone(), nonce, Instant::now());
        self.statistics.reset();

        let worker = ClientWorker {
            server_addr,
            peer,
            events_tx,
            handshake_tx: Some(handshake_tx),
            backlog: Vec::new(),
            statistics: Arc::clone(&self.statistics),
        };

        let thread = std::thread::Builder::new()
            .name("netsync::client".to_string())
            .spawn(move || worker.run_in_thread(socket, outbound_rx, shutdown_rx))?;

        info!("Connecting to {}", server_addr);
        self.worker = Some(WorkerHandle {
            thread,
            outbound_tx,
            events_rx,
            shutdown_tx: Some(shutdown_tx),
            handshake_rx: Some(handshake_rx),
        });
        self.status = ClientStatus::Connecting;
        self.channel_count = params.channel_count();
        self.server_addr = Some(server_addr);
        Ok(())
    }

    /// Blocks until the handshake started by [`connect`](Self::connect)
    /// succeeds, is rejected, or times out. On failure the worker has been
    /// shut down and the client can connect again.
    pub fn wait_for_connection(&mut self) -> Result<(), TransportError> {
        let handshake_rx = match self.worker.as_mut() {
            Some(worker) => worker.handshake_rx.take(),
            None => return Err(TransportError::NotConnected),
        };
        let Some(handshake_rx) = handshake_rx else {
            // Already waited once
            return match self.status {
                ClientStatus::Connected => Ok(()),
                _ => Err(TransportError::NotConnected),
            };
        };

        let outcome = handshake_rx
            .blocking_recv()
            .unwrap_or(Err(TransportError::WorkerStopped));

        match outcome {
            Ok(()) => {
                self.status = ClientStatus::Connected;
                Ok(())
            }
            Err(e) => {
                warn!("Connection attempt failed: {}", e);
                self.stop_worker();
                self.status = ClientStatus::Error;
                Err(e)
            }
        }
    }

    /// Queues `data` for the server.
    pub fn send_packet(
        &self,
        channel: u8,
        data: &[u8],
        delivery: Delivery,
    ) -> Result<(), TransportError> {
        let worker = self.worker.as_ref().ok_or(TransportError::NotConnected)?;
        if channel >= self.channel_count {
            return Err(TransportError::InvalidChannel {
                channel,
                channel_count: self.channel_count,
            });
        }
        if data.len() > MAX_PAYLOAD_SIZE {
            return Err(TransportError::PayloadTooLarge {
                len: data.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        worker
            .outbound_tx
            .send(OutgoingPacket {
                channel,
                payload: data.to_vec(),
                delivery,
            })
            .map_err(|_| TransportError::WorkerStopped)
    }

    /// Dispatches everything the worker queued since the last call.
    ///
    /// After a disconnect the worker thread is joined, so
    /// [`is_connecting_or_connected`](Self::is_connecting_or_connected)
    /// is false once this returns.
    pub fn consume_events(&mut self, handler: &mut impl ClientEventHandler) {
        let Some(worker) = self.worker.as_mut() else {
            return;
        };

        let mut batch = Vec::new();
        let mut worker_gone = false;
        loop {
            match worker.events_rx.try_recv() {
                Ok(event) => batch.push(event),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    worker_gone = true;
                    break;
                }
            }
        }

        let mut disconnected = false;
        for event in batch {
            match event {
                ClientEvent::Connected => {
                    self.status = ClientStatus::Connected;
                    handler.on_connected();
                }
                ClientEvent::Disconnected(reason) => {
                    info!("Disconnected from server: {:?}", reason);
                    self.status = match reason {
                        DisconnectReason::Local | DisconnectReason::Remote => ClientStatus::Idle,
                        _ => ClientStatus::Error,
                    };
                    disconnected = true;
                    handler.on_disconnected();
                }
                ClientEvent::Data { payload, .. } => handler.on_data_received(&payload),
            }
        }

        if worker_gone && !disconnected {
            error!("Client worker stopped without reporting a disconnect");
            self.status = ClientStatus::Error;
            disconnected = true;
            handler.on_disconnected();
        }

        if disconnected {
            self.stop_worker();
        }
    }

    /// Leaves the server gracefully and joins the worker. Queued packets and
    /// undelivered events are dropped. Safe to call when not connected.
    pub fn disconnect(&mut self) {
        if self.worker.is_some() {
            self.stop_worker();
            self.status = ClientStatus::Idle;
        }
    }

    /// True while a worker thread is running, whatever its handshake state.
    pub fn is_connecting_or_connected(&self) -> bool {
        self.worker.is_some()
    }

    /// Lifecycle state as of the last call on this thread.
    pub fn status(&self) -> ClientStatus {
        self.status
    }

    /// The resolved server address of the current or last connection.
    pub fn server_addr(&self) -> Option<SocketAddr> {
        self.server_addr
    }

    /// Latest round-trip figures published by the worker.
    pub fn statistics(&self) -> ClientStatistics {
        self.statistics.load()
    }

    fn stop_worker(&mut self) {
        let Some(mut worker) = self.worker.take() else {
            return;
        };

        if let Some(shutdown_tx) = worker.shutdown_tx.take() {
            // Fails only if the worker already exited
            let _ = shutdown_tx.send(());
        }
        if worker.thread.join().is_err() {
            error!("Client worker thread panicked");
        }

        let dropped = std::iter::from_fn(|| worker.events_rx.try_recv().ok()).count();
        if dropped > 0 {
            debug!("Dropped {} undelivered client events", dropped);
        }
        self.server_addr = None;
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Resolves `host:port`, preferring IPv4 addresses.
fn resolve(host: &str, port: u16) -> Result<SocketAddr, TransportError> {
    let failed = || TransportError::AddressResolution(format!("{}:{}", host, port));
    let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs().map_err(|_| failed())?.collect();

    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(failed)
}

/// State owned by the worker thread
struct ClientWorker {
    server_addr: SocketAddr,
    peer: Peer,
    events_tx: mpsc::UnboundedSender<ClientEvent>,
    handshake_tx: Option<oneshot::Sender<Result<(), TransportError>>>,
    /// Packets queued before the handshake finished
    backlog: Vec<OutgoingPacket>,
    statistics: Arc<SharedStatistics>,
}

impl ClientWorker {
    fn run_in_thread(
        mut self,
        socket: StdUdpSocket,
        outbound_rx: mpsc::UnboundedReceiver<OutgoingPacket>,
        shutdown_rx: oneshot::Receiver<()>,
    ) {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                error!("Failed to start client runtime: {}", e);
                self.dispatch(PeerEvent::Disconnected(DisconnectReason::Reset));
                return;
            }
        };

        runtime.block_on(async move {
            match UdpSocket::from_std(socket) {
                Ok(socket) => self.run(socket, outbound_rx, shutdown_rx).await,
                Err(e) => {
                    error!("Failed to register client socket: {}", e);
                    self.dispatch(PeerEvent::Disconnected(DisconnectReason::Reset));
                }
            }
        });
    }

    async fn run(
        &mut self,
        socket: UdpSocket,
        mut outbound_rx: mpsc::UnboundedReceiver<OutgoingPacket>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        let mut service = interval(SERVICE_INTERVAL);
        service.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut buffer = [0u8; 2048];
        let mut exiting = false;

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown_rx, if !exiting => {
                    exiting = true;
                    info!("Disconnecting from {}", self.server_addr);
                    if let Some(event) = self.peer.disconnect(Instant::now()) {
                        self.dispatch(event);
                    }
                },

                Some(packet) = outbound_rx.recv(), if !exiting => {
                    self.queue_outbound(packet);
                },

                result = socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, from)) => self.handle_datagram(&buffer[..len], from),
                        // ICMP port unreachable and friends surface here; the
                        // peer timeouts deal with a server that is really gone
                        Err(e) => debug!("Error receiving datagram: {}", e),
                    }
                },

                _ = service.tick() => {
                    if let Some(event) = self.peer.update(Instant::now()) {
                        self.dispatch(event);
                    }
                    self.statistics.store(&self.peer);
                },
            }

            self.flush(&socket).await;

            if self.peer.state() == PeerState::Disconnected {
                break;
            }
        }

        debug!("Client worker for {} exiting", self.server_addr);
    }

    fn queue_outbound(&mut self, packet: OutgoingPacket) {
        match self.peer.state() {
            PeerState::Connecting => self.backlog.push(packet),
            PeerState::Connected => self.send_to_peer(packet),
            _ => trace!("Dropping outbound packet while disconnecting"),
        }
    }

    fn send_to_peer(&mut self, packet: OutgoingPacket) {
        if let Err(e) =
            self.peer
                .send(packet.channel, packet.payload, packet.delivery, Instant::now())
        {
            warn!("Failed to send packet to {}: {}", self.server_addr, e);
        }
    }

    fn handle_datagram(&mut self, bytes: &[u8], from: SocketAddr) {
        if from != self.server_addr {
            trace!("Ignoring datagram from unexpected address {}", from);
            return;
        }
        let Some(frame) = Frame::decode(bytes) else {
            debug!("Dropping malformed datagram from {}", from);
            return;
        };

        trace!("Received {} frame from {}", frame.name(), from);
        for event in self.peer.handle_frame(frame, Instant::now()) {
            self.dispatch(event);
        }
    }

    fn dispatch(&mut self, event: PeerEvent) {
        let event = match event {
            PeerEvent::Connected => {
                info!("Connected to {}", self.server_addr);
                if let Some(handshake_tx) = self.handshake_tx.take() {
                    let _ = handshake_tx.send(Ok(()));
                }
                for packet in std::mem::take(&mut self.backlog) {
                    self.send_to_peer(packet);
                }
                ClientEvent::Connected
            }
            PeerEvent::Received { channel, payload } => ClientEvent::Data { channel, payload },
            PeerEvent::Disconnected(reason) => {
                if let Some(handshake_tx) = self.handshake_tx.take() {
                    let error = match &reason {
                        DisconnectReason::ConnectTimeout => TransportError::ConnectTimeout,
                        DisconnectReason::Rejected(why) => TransportError::Rejected(why.clone()),
                        _ => TransportError::WorkerStopped,
                    };
                    let _ = handshake_tx.send(Err(error));
                }
                self.backlog.clear();
                ClientEvent::Disconnected(reason)
            }
        };

        if self.events_tx.send(event).is_err() {
            debug!("Client event queue closed");
        }
    }

    async fn flush(&mut self, socket: &UdpSocket) {
        for frame in self.peer.take_outgoing() {
            let bytes = match frame.encode() {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!("Failed to encode {} frame: {}", frame.name(), e);
                    continue;
                }
            };
            debug_assert!(bytes.len() <= MAX_DATAGRAM_SIZE);
            if let Err(e) = socket.send_to(&bytes, self.server_addr).await {
                warn!("Failed to send {} frame to {}: {}", frame.name(), self.server_addr, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::PROTOCOL_VERSION;
    use tokio_test::{assert_err, assert_ok};

    /// A bare socket standing in for a server, driven by hand.
    struct FakeServer {
        socket: StdUdpSocket,
    }

    impl FakeServer {
        fn bind() -> Self {
            let socket = StdUdpSocket::bind("127.0.0.1:0").unwrap();
            socket
                .set_read_timeout(Some(Duration::from_secs(2)))
                .unwrap();
            Self { socket }
        }

        fn port(&self) -> u16 {
            self.socket.local_addr().unwrap().port()
        }

        fn recv(&self) -> (Frame, SocketAddr) {
            let mut buffer = [0u8; 2048];
            loop {
                let (len, from) = self.socket.recv_from(&mut buffer).unwrap();
                if let Some(frame) = Frame::decode(&buffer[..len]) {
                    return (frame, from);
                }
            }
        }

        fn send(&self, frame: Frame, to: SocketAddr) {
            self.socket.send_to(&frame.encode().unwrap(), to).unwrap();
        }

        /// Answers the first `Connect` and returns the client's address.
        fn accept(&self) -> SocketAddr {
            loop {
                if let (Frame::Connect { nonce, .. }, from) = self.recv() {
                    self.send(Frame::Accept { nonce }, from);
                    return from;
                }
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        connected: u32,
        disconnected: u32,
        data: Vec<Vec<u8>>,
    }

    impl ClientEventHandler for Recorder {
        fn on_connected(&mut self) {
            self.connected += 1;
        }

        fn on_disconnected(&mut self) {
            self.disconnected += 1;
        }

        fn on_data_received(&mut self, data: &[u8]) {
            self.data.push(data.to_vec());
        }
    }

    fn params(port: u16) -> ClientConnectParams {
        ClientConnectParams::new()
            .set_server_host_name_and_port("127.0.0.1", port)
            .set_timeout(Duration::from_millis(500))
    }

    #[test]
    fn test_params_builder() {
        let params = ClientConnectParams::new()
            .set_channel_count(2)
            .set_server_host_name_and_port("localhost", 9000)
            .set_timeout(Duration::from_millis(250));

        assert_eq!(params.channel_count(), 2);
        assert_eq!(params.server_host_name(), "localhost");
        assert_eq!(params.server_port(), 9000);
        assert_eq!(params.timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_params_defaults() {
        let params = ClientConnectParams::default();
        assert_eq!(params.server_port(), DEFAULT_PORT);
        assert_eq!(params.channel_count(), 1);
    }

    #[test]
    fn test_idle_client() {
        let mut client = Client::new();
        assert!(!client.is_connecting_or_connected());
        assert_eq!(client.status(), ClientStatus::Idle);
        assert!(matches!(
            client.send_packet(0, b"hi", Delivery::Reliable),
            Err(TransportError::NotConnected)
        ));
        assert_err!(client.wait_for_connection());

        let mut recorder = Recorder::default();
        client.consume_events(&mut recorder);
        client.disconnect();
        client.disconnect();
        assert_eq!(recorder.disconnected, 0);
    }

    #[test]
    fn test_connect_timeout_against_silent_server() {
        let server = FakeServer::bind();
        let mut client = Client::new();

        let started = Instant::now();
        assert_ok!(client.connect(&params(server.port())));
        assert!(client.is_connecting_or_connected());

        let result = client.wait_for_connection();
        assert!(matches!(result, Err(TransportError::ConnectTimeout)));
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert!(!client.is_connecting_or_connected());
        assert_eq!(client.status(), ClientStatus::Error);
    }

    #[test]
    fn test_connect_rejected() {
        let server = FakeServer::bind();
        let mut client = Client::new();
        assert_ok!(client.connect(&params(server.port())));

        let (frame, from) = server.recv();
        assert!(matches!(
            frame,
            Frame::Connect {
                protocol_version: PROTOCOL_VERSION,
                ..
            }
        ));
        server.send(
            Frame::Reject {
                reason: "server full".to_string(),
            },
            from,
        );

        match client.wait_for_connection() {
            Err(TransportError::Rejected(reason)) => assert_eq!(reason, "server full"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(!client.is_connecting_or_connected());
    }

    #[test]
    fn test_handshake_then_send_and_receive() {
        let server = FakeServer::bind();
        let mut client = Client::new();
        assert_ok!(client.connect(&params(server.port())));

        let client_addr = server.accept();
        assert_ok!(client.wait_for_connection());
        assert_eq!(client.status(), ClientStatus::Connected);

        assert_ok!(client.send_packet(0, b"hello", Delivery::Reliable));
        loop {
            if let (Frame::Reliable { payload, .. }, _) = server.recv() {
                assert_eq!(payload, b"hello".to_vec());
                break;
            }
        }

        server.send(
            Frame::Unreliable {
                channel: 0,
                payload: b"world".to_vec(),
            },
            client_addr,
        );

        let mut recorder = Recorder::default();
        let deadline = Instant::now() + Duration::from_secs(2);
        while recorder.data.is_empty() && Instant::now() < deadline {
            client.consume_events(&mut recorder);
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(recorder.connected, 1);
        assert_eq!(recorder.data, vec![b"world".to_vec()]);
    }

    #[test]
    fn test_server_disconnect_is_reported() {
        let server = FakeServer::bind();
        let mut client = Client::new();
        assert_ok!(client.connect(&params(server.port())));
        let client_addr = server.accept();
        assert_ok!(client.wait_for_connection());

        server.send(Frame::Disconnect, client_addr);

        let mut recorder = Recorder::default();
        let deadline = Instant::now() + Duration::from_secs(2);
        while client.is_connecting_or_connected() && Instant::now() < deadline {
            client.consume_events(&mut recorder);
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(recorder.disconnected, 1);
        assert!(!client.is_connecting_or_connected());
        assert_eq!(client.status(), ClientStatus::Idle);
    }

    #[test]
    fn test_connect_twice_is_rejected() {
        let server = FakeServer::bind();
        let mut client = Client::new();
        assert_ok!(client.connect(&params(server.port())));
        assert!(matches!(
            client.connect(&params(server.port())),
            Err(TransportError::AlreadyRunning)
        ));
        client.disconnect();
        assert!(!client.is_connecting_or_connected());
    }

    #[test]
    fn test_send_validation() {
        let server = FakeServer::bind();
        let mut client = Client::new();
        assert_ok!(client.connect(&params(server.port())));

        assert!(matches!(
            client.send_packet(1, b"x", Delivery::Reliable),
            Err(TransportError::InvalidChannel { channel: 1, .. })
        ));
        assert!(matches!(
            client.send_packet(0, &[0; MAX_PAYLOAD_SIZE + 1], Delivery::Unreliable),
            Err(TransportError::PayloadTooLarge { .. })
        ));
        // Queued until the handshake finishes
        assert_ok!(client.send_packet(0, b"early", Delivery::Reliable));
        client.disconnect();
    }
}
