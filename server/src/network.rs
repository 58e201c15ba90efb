//! Server network layer: accepts client connections on a UDP port, serviced by a background worker thread

use crate::client_manager::ClientManager;
use log::{debug, error, info, trace, warn};
use shared::{
    ConnectionId, Delivery, DisconnectReason, Frame, Peer, PeerConfig, PeerEvent, TransportError,
    DEFAULT_PORT, MAX_CLIENTS, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION,
};
use std::net::{IpAddr, SocketAddr, UdpSocket as StdUdpSocket};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};

/// How often the worker drives resends, keepalives and timeouts
const SERVICE_INTERVAL: Duration = Duration::from_millis(10);

/// Reject reason when `max_clients` connections are already open.
pub const REJECT_SERVER_FULL: &str = "server full";
/// Reject reason when the client speaks another `PROTOCOL_VERSION`.
pub const REJECT_PROTOCOL_MISMATCH: &str = "protocol mismatch";
/// Reject reason when the client asks for a different number of channels.
pub const REJECT_CHANNEL_MISMATCH: &str = "channel count mismatch";

/// A record describing one connected client, created on the worker thread
/// when the connection is accepted.
pub trait ConnectedClient: Send + 'static {
    /// The connection id the worker assigned.
    fn id(&self) -> ConnectionId;
}

/// The plain record used when the caller has nothing to add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteClient {
    pub id: ConnectionId,
    /// Source address of the handshake.
    pub ip: IpAddr,
}

impl RemoteClient {
    pub fn new(id: ConnectionId, ip: IpAddr) -> Self {
        Self { id, ip }
    }
}

impl ConnectedClient for RemoteClient {
    fn id(&self) -> ConnectionId {
        self.id
    }
}

/// Callbacks invoked from [`Server::consume_events`] on the caller's thread.
pub trait ServerEventHandler<C> {
    /// The record is already in [`Server::connected_clients`].
    fn on_client_connected(&mut self, client: &C);
    /// The record has already been removed, so only the id is left.
    fn on_client_disconnected(&mut self, client_id: ConnectionId);
    /// One payload from a connected client.
    fn on_data_received(&mut self, client: &C, data: &[u8]);
}

type InitializeClient<C> = Box<dyn Fn(ConnectionId, IpAddr) -> C + Send>;

/// Where to listen, how many to admit and how to describe each arrival.
pub struct ServerListenParams<C> {
    listen_port: u16,
    max_clients: usize,
    peer: PeerConfig,
    initialize_client: InitializeClient<C>,
}

impl Default for ServerListenParams<RemoteClient> {
    fn default() -> Self {
        Self::new(RemoteClient::new)
    }
}

impl<C: ConnectedClient> ServerListenParams<C> {
    /// Defaults to [`DEFAULT_PORT`] and [`MAX_CLIENTS`].
    pub fn new<F>(initialize_client: F) -> Self
    where
        F: Fn(ConnectionId, IpAddr) -> C + Send + 'static,
    {
        Self {
            listen_port: DEFAULT_PORT,
            max_clients: MAX_CLIENTS,
            peer: PeerConfig::default(),
            initialize_client: Box::new(initialize_client),
        }
    }

    /// Port 0 picks an ephemeral port; see [`Server::local_addr`].
    pub fn set_listen_port(mut self, port: u16) -> Self {
        self.listen_port = port;
        self
    }

    /// Connections beyond this are rejected with [`REJECT_SERVER_FULL`].
    pub fn set_max_client_count(mut self, max_clients: usize) -> Self {
        self.max_clients = max_clients;
        self
    }

    /// Clients must ask for exactly this many channels.
    pub fn set_channel_count(mut self, channel_count: u8) -> Self {
        self.peer.channel_count = channel_count;
        self
    }

    /// Silence after which a client is dropped.
    pub fn set_peer_timeout(mut self, timeout: Duration) -> Self {
        self.peer.peer_timeout = timeout;
        self
    }

    /// Replaces every reliability timing, including the channel count.
    pub fn set_peer_config(mut self, peer: PeerConfig) -> Self {
        self.peer = peer;
        self
    }

    /// Runs on the worker thread, once per accepted connection.
    pub fn set_initialize_client_function<F>(mut self, initialize_client: F) -> Self
    where
        F: Fn(ConnectionId, IpAddr) -> C + Send + 'static,
    {
        self.initialize_client = Box::new(initialize_client);
        self
    }

    pub fn listen_port(&self) -> u16 {
        self.listen_port
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    pub fn channel_count(&self) -> u8 {
        self.peer.channel_count
    }

    pub fn peer_config(&self) -> &PeerConfig {
        &self.peer
    }
}

/// Messages sent from the worker to the owning thread
#[derive(Debug)]
pub enum ServerEvent<C> {
    /// A handshake finished; carries the record built by the initializer.
    Connected(C),
    /// The connection is gone and its id will not be reused.
    Disconnected {
        client_id: ConnectionId,
        reason: DisconnectReason,
    },
    /// One application payload from a connected client.
    Data {
        client_id: ConnectionId,
        channel: u8,
        payload: Vec<u8>,
    },
}

/// Messages sent from the owning thread to the worker
#[derive(Debug)]
struct OutgoingPacket {
    client_id: ConnectionId,
    channel: u8,
    payload: Vec<u8>,
    delivery: Delivery,
}

/// Handles owned by the main thread while a worker runs
struct WorkerHandle<C> {
    thread: JoinHandle<()>,
    outbound_tx: mpsc::UnboundedSender<OutgoingPacket>,
    events_rx: mpsc::UnboundedReceiver<ServerEvent<C>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

/// Server half of the transport.
///
/// Like the client, every method runs on the owning thread and the socket
/// lives on the `netsync::server` worker. The owning thread keeps its own
/// list of connected records, updated only from
/// [`consume_events`](Self::consume_events), so predicates and lookups
/// never race the worker.
pub struct Server<C: ConnectedClient> {
    worker: Option<WorkerHandle<C>>,
    connected_clients: Vec<C>,
    channel_count: u8,
    local_addr: Option<SocketAddr>,
}

impl<C: ConnectedClient> Default for Server<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ConnectedClient> Server<C> {
    pub fn new() -> Self {
        Self {
            worker: None,
            connected_clients: Vec::new(),
            channel_count: 0,
            local_addr: None,
        }
    }

    /// Binds `0.0.0.0:port` and starts the worker.
    pub fn start_listening(&mut self, params: ServerListenParams<C>) -> Result<(), TransportError> {
        if self.worker.is_some() {
            return Err(TransportError::AlreadyRunning);
        }

        let socket = StdUdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], params.listen_port)))?;
        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr()?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let channel_count = params.channel_count();
        let worker = ServerWorker {
            clients: ClientManager::new(params.max_clients),
            config: params.peer,
            initialize_client: params.initialize_client,
            events_tx,
            stray: Vec::new(),
        };

        let thread = std::thread::Builder::new()
            .name("netsync::server".to_string())
            .spawn(move || worker.run_in_thread(socket, outbound_rx, shutdown_rx))?;

        info!(
            "Server listening on {} (max {} clients)",
            local_addr, params.max_clients
        );
        self.worker = Some(WorkerHandle {
            thread,
            outbound_tx,
            events_rx,
            shutdown_tx: Some(shutdown_tx),
        });
        self.channel_count = channel_count;
        self.local_addr = Some(local_addr);
        Ok(())
    }

    /// Queues `data` for one connected client.
    pub fn send_packet_to(
        &self,
        client_id: ConnectionId,
        channel: u8,
        data: &[u8],
        delivery: Delivery,
    ) -> Result<(), TransportError> {
        let worker = self.checked_worker(channel, data)?;
        if self.get_client(client_id).is_none() {
            return Err(TransportError::UnknownConnection(client_id));
        }
        Self::queue(worker, client_id, channel, data, delivery)
    }

    /// Queues `data` for every connected client matching `predicate`.
    pub fn send_packet_to_all_if<P>(
        &self,
        channel: u8,
        data: &[u8],
        delivery: Delivery,
        predicate: P,
    ) -> Result<(), TransportError>
    where
        P: Fn(&C) -> bool,
    {
        let worker = self.checked_worker(channel, data)?;
        for client in self.connected_clients.iter().filter(|c| predicate(c)) {
            Self::queue(worker, client.id(), channel, data, delivery)?;
        }
        Ok(())
    }

    /// Dispatches everything the worker queued since the last call.
    pub fn consume_events(&mut self, handler: &mut impl ServerEventHandler<C>) {
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

        for event in batch {
            match event {
                ServerEvent::Connected(client) => {
                    self.connected_clients.push(client);
                    if let Some(client) = self.connected_clients.last() {
                        handler.on_client_connected(client);
                    }
                }
                ServerEvent::Disconnected { client_id, reason } => {
                    debug!("Client {} gone: {:?}", client_id, reason);
                    self.connected_clients.retain(|c| c.id() != client_id);
                    handler.on_client_disconnected(client_id);
                }
                ServerEvent::Data {
                    client_id, payload, ..
                } => match self.get_client(client_id) {
                    Some(client) => handler.on_data_received(client, &payload),
                    None => trace!("Dropping data from departed client {}", client_id),
                },
            }
        }

        if worker_gone {
            error!("Server worker stopped unexpectedly");
            for client in std::mem::take(&mut self.connected_clients) {
                handler.on_client_disconnected(client.id());
            }
            self.stop_worker();
        }
    }

    /// Disconnects everybody, stops the worker and forgets all clients.
    /// Safe to call when not listening.
    pub fn stop_listening(&mut self) {
        if self.worker.is_some() {
            info!("Server shutting down");
            self.stop_worker();
        }
    }

    /// True while the worker thread is running.
    pub fn is_listening(&self) -> bool {
        self.worker.is_some()
    }

    /// Records of every client whose connect event has been consumed, in
    /// arrival order.
    pub fn connected_clients(&self) -> &[C] {
        &self.connected_clients
    }

    /// Looks up a connected record by id.
    pub fn get_client(&self, client_id: ConnectionId) -> Option<&C> {
        self.connected_clients.iter().find(|c| c.id() == client_id)
    }

    /// The bound address while listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn checked_worker(&self, channel: u8, data: &[u8]) -> Result<&WorkerHandle<C>, TransportError> {
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
        Ok(worker)
    }

    fn queue(
        worker: &WorkerHandle<C>,
        client_id: ConnectionId,
        channel: u8,
        data: &[u8],
        delivery: Delivery,
    ) -> Result<(), TransportError> {
        worker
            .outbound_tx
            .send(OutgoingPacket {
                client_id,
                channel,
                payload: data.to_vec(),
                delivery,
            })
            .map_err(|_| TransportError::WorkerStopped)
    }

    fn stop_worker(&mut self) {
        let Some(mut worker) = self.worker.take() else {
            return;
        };

        if let Some(shutdown_tx) = worker.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if worker.thread.join().is_err() {
            error!("Server worker thread panicked");
        }

        let dropped = std::iter::from_fn(|| worker.events_rx.try_recv().ok()).count();
        if dropped > 0 {
            debug!("Dropped {} undelivered server events", dropped);
        }
        self.connected_clients.clear();
        self.local_addr = None;
    }
}

impl<C: ConnectedClient> Drop for Server<C> {
    fn drop(&mut self) {
        self.stop_listening();
    }
}

/// State owned by the worker thread
struct ServerWorker<C> {
    clients: ClientManager,
    config: PeerConfig,
    initialize_client: InitializeClient<C>,
    events_tx: mpsc::UnboundedSender<ServerEvent<C>>,
    /// Replies to addresses that have no connection, such as rejections
    stray: Vec<(SocketAddr, Frame)>,
}

impl<C: ConnectedClient> ServerWorker<C> {
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
                error!("Failed to start server runtime: {}", e);
                return;
            }
        };

        runtime.block_on(async move {
            match UdpSocket::from_std(socket) {
                Ok(socket) => self.run(socket, outbound_rx, shutdown_rx).await,
                Err(e) => error!("Failed to register server socket: {}", e),
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

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown_rx => {
                    // Packets queued before the stop go out ahead of the Disconnect
                    while let Ok(packet) = outbound_rx.try_recv() {
                        self.send_to_client(packet);
                    }
                    self.clients.disconnect_all(Instant::now());
                    self.flush(&socket).await;
                    break;
                },

                Some(packet) = outbound_rx.recv() => {
                    self.send_to_client(packet);
                },

                result = socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, from)) => self.handle_datagram(&buffer[..len], from),
                        Err(e) => debug!("Error receiving datagram: {}", e),
                    }
                },

                _ = service.tick() => {
                    for (client_id, event) in self.clients.update_all(Instant::now()) {
                        self.dispatch(client_id, event);
                    }
                },
            }

            self.flush(&socket).await;
            self.clients.remove_disconnected();
        }

        debug!("Server worker exiting");
    }

    fn send_to_client(&mut self, packet: OutgoingPacket) {
        let Some(peer) = self.clients.get_mut(&packet.client_id) else {
            trace!("Dropping packet for departed client {}", packet.client_id);
            return;
        };
        if let Err(e) = peer.send(packet.channel, packet.payload, packet.delivery, Instant::now()) {
            warn!("Failed to send packet to client {}: {}", packet.client_id, e);
        }
    }

    fn handle_datagram(&mut self, bytes: &[u8], from: SocketAddr) {
        let Some(frame) = Frame::decode(bytes) else {
            debug!("Dropping malformed datagram from {}", from);
            return;
        };
        trace!("Received {} frame from {}", frame.name(), from);

        let now = Instant::now();
        let known = self.clients.find_client_by_addr(from);

        match (known, frame) {
            (
                existing,
                Frame::Connect {
                    protocol_version,
                    channel_count,
                    nonce,
                },
            ) => {
                if let Some(client_id) = existing {
                    let same_attempt = self
                        .clients
                        .get_mut(&client_id)
                        .map_or(false, |peer| peer.nonce() == nonce);
                    if same_attempt {
                        let retry = Frame::Connect {
                            protocol_version,
                            channel_count,
                            nonce,
                        };
                        self.forward_frame(client_id, retry, now);
                        return;
                    }
                    // Same address, new handshake: the old connection is dead
                    info!("Client {} reconnecting from {}", client_id, from);
                    self.clients.remove_client(&client_id);
                    self.dispatch(client_id, PeerEvent::Disconnected(DisconnectReason::Reset));
                }
                self.accept(from, protocol_version, channel_count, nonce, now);
            }
            (Some(client_id), frame) => self.forward_frame(client_id, frame, now),
            (None, Frame::Disconnect) => {
                // Our ack for an earlier disconnect got lost
                self.stray.push((from, Frame::DisconnectAck));
            }
            (None, frame) => trace!("Ignoring {} frame from unknown {}", frame.name(), from),
        }
    }

    fn accept(
        &mut self,
        from: SocketAddr,
        protocol_version: u32,
        channel_count: u8,
        nonce: u64,
        now: Instant,
    ) {
        let rejection = if protocol_version != PROTOCOL_VERSION {
            Some(REJECT_PROTOCOL_MISMATCH)
        } else if channel_count != self.config.channel_count {
            Some(REJECT_CHANNEL_MISMATCH)
        } else if self.clients.is_full() {
            Some(REJECT_SERVER_FULL)
        } else {
            None
        };

        if let Some(reason) = rejection {
            warn!("Rejecting connection from {}: {}", from, reason);
            self.stray.push((
                from,
                Frame::Reject {
                    reason: reason.to_string(),
                },
            ));
            return;
        }

        let peer = Peer::accepted(from, self.config.clone(), nonce, now);
        let Some(client_id) = self.clients.add_client(peer) else {
            return;
        };

        let client = (self.initialize_client)(client_id, from.ip());
        if self.events_tx.send(ServerEvent::Connected(client)).is_err() {
            debug!("Server event queue closed");
        }
    }

    fn forward_frame(&mut self, client_id: ConnectionId, frame: Frame, now: Instant) {
        let events = match self.clients.get_mut(&client_id) {
            Some(peer) => peer.handle_frame(frame, now),
            None => return,
        };
        for event in events {
            self.dispatch(client_id, event);
        }
    }

    fn dispatch(&mut self, client_id: ConnectionId, event: PeerEvent) {
        let event = match event {
            // Server-side peers start out connected
            PeerEvent::Connected => return,
            PeerEvent::Received { channel, payload } => ServerEvent::Data {
                client_id,
                channel,
                payload,
            },
            PeerEvent::Disconnected(reason) => {
                info!("Client {} disconnected: {:?}", client_id, reason);
                ServerEvent::Disconnected { client_id, reason }
            }
        };

        if self.events_tx.send(event).is_err() {
            debug!("Server event queue closed");
        }
    }

    async fn flush(&mut self, socket: &UdpSocket) {
        let mut frames = self.clients.take_outgoing();
        frames.append(&mut self.stray);

        for (addr, frame) in frames {
            let bytes = match frame.encode() {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!("Failed to encode {} frame: {}", frame.name(), e);
                    continue;
                }
            };
            if let Err(e) = socket.send_to(&bytes, addr).await {
                warn!("Failed to send {} frame to {}: {}", frame.name(), addr, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    /// A bare socket standing in for a client, driven by hand.
    struct FakeClient {
        socket: StdUdpSocket,
        server: SocketAddr,
        nonce: u64,
    }

    impl FakeClient {
        fn bind(server: &Server<RemoteClient>, nonce: u64) -> Self {
            let socket = StdUdpSocket::bind("127.0.0.1:0").unwrap();
            socket
                .set_read_timeout(Some(Duration::from_secs(2)))
                .unwrap();
            let port = server.local_addr().unwrap().port();
            Self {
                socket,
                server: SocketAddr::from(([127, 0, 0, 1], port)),
                nonce,
            }
        }

        fn send(&self, frame: Frame) {
            self.socket
                .send_to(&frame.encode().unwrap(), self.server)
                .unwrap();
        }

        fn connect_with_version(&self, protocol_version: u32) {
            self.send(Frame::Connect {
                protocol_version,
                channel_count: 1,
                nonce: self.nonce,
            });
        }

        /// Next frame that is not a keepalive.
        fn recv(&self) -> Frame {
            let mut buffer = [0u8; 2048];
            loop {
                let (len, _) = self.socket.recv_from(&mut buffer).unwrap();
                match Frame::decode(&buffer[..len]) {
                    Some(Frame::Ping) | None => continue,
                    Some(frame) => return frame,
                }
            }
        }

        fn handshake(&self) {
            self.connect_with_version(PROTOCOL_VERSION);
            assert_eq!(self.recv(), Frame::Accept { nonce: self.nonce });
        }
    }

    #[derive(Default)]
    struct Recorder {
        connected: Vec<RemoteClient>,
        disconnected: Vec<ConnectionId>,
        data: Vec<(ConnectionId, Vec<u8>)>,
    }

    impl ServerEventHandler<RemoteClient> for Recorder {
        fn on_client_connected(&mut self, client: &RemoteClient) {
            self.connected.push(client.clone());
        }

        fn on_client_disconnected(&mut self, client_id: ConnectionId) {
            self.disconnected.push(client_id);
        }

        fn on_data_received(&mut self, client: &RemoteClient, data: &[u8]) {
            self.data.push((client.id, data.to_vec()));
        }
    }

    fn listening_server(max_clients: usize) -> Server<RemoteClient> {
        let mut server = Server::new();
        let params = ServerListenParams::default()
            .set_listen_port(0)
            .set_max_client_count(max_clients);
        assert_ok!(server.start_listening(params));
        server
    }

    /// Consumes events until `done` says so or two seconds pass.
    fn pump_until(
        server: &mut Server<RemoteClient>,
        recorder: &mut Recorder,
        done: impl Fn(&Recorder) -> bool,
    ) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !done(recorder) && Instant::now() < deadline {
            server.consume_events(recorder);
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_params_builder() {
        let params = ServerListenParams::default()
            .set_listen_port(9000)
            .set_max_client_count(8)
            .set_channel_count(2)
            .set_peer_timeout(Duration::from_secs(1));

        assert_eq!(params.listen_port(), 9000);
        assert_eq!(params.max_clients(), 8);
        assert_eq!(params.channel_count(), 2);
        assert_eq!(params.peer_config().peer_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_start_and_stop_listening() {
        let mut server = listening_server(4);
        assert!(server.is_listening());
        assert_ne!(server.local_addr().unwrap().port(), 0);

        assert!(matches!(
            server.start_listening(ServerListenParams::default().set_listen_port(0)),
            Err(TransportError::AlreadyRunning)
        ));

        server.stop_listening();
        server.stop_listening();
        assert!(!server.is_listening());
        assert!(server.local_addr().is_none());
    }

    #[test]
    fn test_accepts_client_and_runs_initializer() {
        let mut server = listening_server(4);
        let client = FakeClient::bind(&server, 11);
        client.handshake();

        let mut recorder = Recorder::default();
        pump_until(&mut server, &mut recorder, |r| !r.connected.is_empty());

        assert_eq!(
            recorder.connected,
            vec![RemoteClient::new(1, "127.0.0.1".parse().unwrap())]
        );
        assert_eq!(server.connected_clients().len(), 1);
        assert!(server.get_client(1).is_some());
    }

    #[test]
    fn test_receives_and_sends_data() {
        let mut server = listening_server(4);
        let client = FakeClient::bind(&server, 12);
        client.handshake();

        client.send(Frame::Reliable {
            channel: 0,
            sequence: 0,
            payload: b"hello".to_vec(),
        });
        assert_eq!(
            client.recv(),
            Frame::Ack {
                channel: 0,
                sequence: 0
            }
        );

        let mut recorder = Recorder::default();
        pump_until(&mut server, &mut recorder, |r| !r.data.is_empty());
        assert_eq!(recorder.data, vec![(1, b"hello".to_vec())]);

        assert_ok!(server.send_packet_to(1, 0, b"welcome", Delivery::Unreliable));
        assert_eq!(
            client.recv(),
            Frame::Unreliable {
                channel: 0,
                payload: b"welcome".to_vec()
            }
        );
    }

    #[test]
    fn test_rejects_when_full() {
        let mut server = listening_server(1);
        let first = FakeClient::bind(&server, 1);
        first.handshake();

        let second = FakeClient::bind(&server, 2);
        second.connect_with_version(PROTOCOL_VERSION);
        assert_eq!(
            second.recv(),
            Frame::Reject {
                reason: REJECT_SERVER_FULL.to_string()
            }
        );

        let mut recorder = Recorder::default();
        pump_until(&mut server, &mut recorder, |r| !r.connected.is_empty());
        assert_eq!(server.connected_clients().len(), 1);
    }

    #[test]
    fn test_rejects_protocol_mismatch() {
        let server = listening_server(4);
        let client = FakeClient::bind(&server, 3);
        client.connect_with_version(PROTOCOL_VERSION + 1);
        assert_eq!(
            client.recv(),
            Frame::Reject {
                reason: REJECT_PROTOCOL_MISMATCH.to_string()
            }
        );
    }

    #[test]
    fn test_send_validation() {
        let server = listening_server(4);
        assert!(matches!(
            server.send_packet_to(7, 0, b"x", Delivery::Reliable),
            Err(TransportError::UnknownConnection(7))
        ));
        assert!(matches!(
            server.send_packet_to(7, 4, b"x", Delivery::Reliable),
            Err(TransportError::InvalidChannel { .. })
        ));

        let idle: Server<RemoteClient> = Server::new();
        assert!(matches!(
            idle.send_packet_to_all_if(0, b"x", Delivery::Reliable, |_| true),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn test_client_disconnect_removes_record() {
        let mut server = listening_server(4);
        let client = FakeClient::bind(&server, 4);
        client.handshake();

        let mut recorder = Recorder::default();
        pump_until(&mut server, &mut recorder, |r| !r.connected.is_empty());

        client.send(Frame::Disconnect);
        assert_eq!(client.recv(), Frame::DisconnectAck);

        pump_until(&mut server, &mut recorder, |r| !r.disconnected.is_empty());
        assert_eq!(recorder.disconnected, vec![1]);
        assert!(server.connected_clients().is_empty());
        assert!(matches!(
            server.send_packet_to(1, 0, b"x", Delivery::Reliable),
            Err(TransportError::UnknownConnection(1))
        ));
    }

    #[test]
    fn test_broadcast_skips_filtered_clients() {
        let mut server = listening_server(4);
        let first = FakeClient::bind(&server, 5);
        first.handshake();
        let second = FakeClient::bind(&server, 6);
        second.handshake();

        let mut recorder = Recorder::default();
        pump_until(&mut server, &mut recorder, |r| r.connected.len() == 2);

        assert_ok!(server.send_packet_to_all_if(0, b"all", Delivery::Unreliable, |c| c.id != 1));
        assert_eq!(
            second.recv(),
            Frame::Unreliable {
                channel: 0,
                payload: b"all".to_vec()
            }
        );

        first
            .socket
            .set_read_timeout(Some(Duration::from_millis(200)))
            .unwrap();
        let mut buffer = [0u8; 2048];
        while let Ok((len, _)) = first.socket.recv_from(&mut buffer) {
            assert!(!matches!(
                Frame::decode(&buffer[..len]),
                Some(Frame::Unreliable { .. })
            ));
        }
    }

    #[test]
    fn test_stop_listening_disconnects_clients() {
        let mut server = listening_server(4);
        let client = FakeClient::bind(&server, 8);
        client.handshake();

        let mut recorder = Recorder::default();
        pump_until(&mut server, &mut recorder, |r| !r.connected.is_empty());

        server.stop_listening();
        assert_eq!(client.recv(), Frame::Disconnect);
        assert!(server.connected_clients().is_empty());
    }

    #[test]
    fn test_stop_listening_flushes_queued_packets_first() {
        let mut server = listening_server(4);
        let client = FakeClient::bind(&server, 9);
        client.handshake();

        let mut recorder = Recorder::default();
        pump_until(&mut server, &mut recorder, |r| !r.connected.is_empty());

        assert_ok!(server.send_packet_to(1, 0, b"goodbye", Delivery::Unreliable));
        server.stop_listening();

        assert_eq!(
            client.recv(),
            Frame::Unreliable {
                channel: 0,
                payload: b"goodbye".to_vec()
            }
        );
        assert_eq!(client.recv(), Frame::Disconnect);
    }
}
