//! One end of a transport connection, without a socket.
//!
//! The workers own the sockets: they hand every received frame to
//! [`Peer::handle_frame`], call [`Peer::update`] on a short interval and
//! send whatever [`Peer::take_outgoing`] returns. Keeping the state machine
//! free of I/O lets the reliability rules be tested frame by frame.

use log::trace;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::frame::{sequence_greater_than, Delivery, Frame};
use crate::{TransportError, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION};

/// Timings and limits of the reliability layer.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Independent reliable sequences; both sides must agree.
    pub channel_count: u8,
    /// How long a client keeps retrying the handshake.
    pub connect_timeout: Duration,
    /// Silence after which a connected peer is considered gone.
    pub peer_timeout: Duration,
    /// How long a graceful disconnect may wait for its acknowledgement.
    pub disconnect_timeout: Duration,
    /// Idle time before a keepalive `Ping` goes out.
    pub ping_interval: Duration,
    /// Lower bound on the wait before resending an unacknowledged frame.
    pub resend_interval: Duration,
    /// Resends of a single reliable frame before giving up on the peer.
    pub max_resends: u32,
    /// Out-of-order reliable frames buffered per channel.
    pub receive_window: u32,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            channel_count: 1,
            connect_timeout: Duration::from_secs(5),
            peer_timeout: Duration::from_secs(5),
            disconnect_timeout: Duration::from_secs(3),
            ping_interval: Duration::from_millis(500),
            resend_interval: Duration::from_millis(100),
            max_resends: 50,
            receive_window: 256,
        }
    }
}

/// Lifecycle of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// We asked to leave and the other side acknowledged.
    Local,
    /// The other side asked to leave.
    Remote,
    /// Nothing heard from the other side for too long.
    Timeout,
    /// The handshake never completed.
    ConnectTimeout,
    /// The server refused the handshake, with its reason.
    Rejected(String),
    /// A graceful disconnect was not acknowledged in time.
    Reset,
}

/// What a frame or a timer tick meant for the owner of a [`Peer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    Connected,
    Received { channel: u8, payload: Vec<u8> },
    Disconnected(DisconnectReason),
}

#[derive(Debug)]
struct InFlight {
    channel: u8,
    sequence: u32,
    payload: Vec<u8>,
    first_sent: Instant,
    last_sent: Instant,
    resends: u32,
}

#[derive(Debug, Default)]
struct ReceiveChannel {
    next_expected: u32,
    pending: HashMap<u32, Vec<u8>>,
}

#[derive(Debug)]
struct RttEstimate {
    srtt_ms: f32,
    rtt_var_ms: f32,
}

impl Default for RttEstimate {
    fn default() -> Self {
        Self {
            srtt_ms: 100.0,
            rtt_var_ms: 50.0,
        }
    }
}

impl RttEstimate {
    fn update(&mut self, rtt_ms: f32) {
        const ALPHA: f32 = 0.125;
        const BETA: f32 = 0.25;

        let diff = (rtt_ms - self.srtt_ms).abs();
        self.rtt_var_ms = (1.0 - BETA) * self.rtt_var_ms + BETA * diff;
        self.srtt_ms = (1.0 - ALPHA) * self.srtt_ms + ALPHA * rtt_ms;
    }
}

/// Connection state for one remote address.
#[derive(Debug)]
pub struct Peer {
    addr: SocketAddr,
    config: PeerConfig,
    state: PeerState,
    nonce: u64,
    state_since: Instant,
    last_received: Instant,
    last_sent: Instant,
    next_sequence: Vec<u32>,
    receive: Vec<ReceiveChannel>,
    in_flight: VecDeque<InFlight>,
    outgoing: Vec<Frame>,
    rtt: RttEstimate,
}

impl Peer {
    fn new(addr: SocketAddr, config: PeerConfig, nonce: u64, state: PeerState, now: Instant) -> Self {
        let channels = usize::from(config.channel_count);
        Self {
            addr,
            state,
            nonce,
            state_since: now,
            last_received: now,
            last_sent: now,
            next_sequence: vec![0; channels],
            receive: (0..channels).map(|_| ReceiveChannel::default()).collect(),
            in_flight: VecDeque::new(),
            outgoing: Vec::new(),
            rtt: RttEstimate::default(),
            config,
        }
    }

    /// Client side: starts the handshake with the server at `addr`.
    pub fn connecting(addr: SocketAddr, config: PeerConfig, nonce: u64, now: Instant) -> Self {
        let mut peer = Self::new(addr, config, nonce, PeerState::Connecting, now);
        peer.queue_connect(now);
        peer
    }

    /// Server side: a `Connect` from `addr` was accepted.
    pub fn accepted(addr: SocketAddr, config: PeerConfig, nonce: u64, now: Instant) -> Self {
        let mut peer = Self::new(addr, config, nonce, PeerState::Connected, now);
        peer.queue(Frame::Accept { nonce }, now);
        peer
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn is_connected(&self) -> bool {
        self.state == PeerState::Connected
    }

    pub fn round_trip_time(&self) -> Duration {
        Duration::from_secs_f32(self.rtt.srtt_ms.max(0.0) / 1000.0)
    }

    pub fn round_trip_time_variance(&self) -> Duration {
        Duration::from_secs_f32(self.rtt.rtt_var_ms.max(0.0) / 1000.0)
    }

    /// Reliable frames sent but not yet acknowledged.
    pub fn unacked_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Frames waiting to be written to the socket.
    pub fn take_outgoing(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn send(
        &mut self,
        channel: u8,
        payload: Vec<u8>,
        delivery: Delivery,
        now: Instant,
    ) -> Result<(), TransportError> {
        if self.state != PeerState::Connected {
            return Err(TransportError::NotConnected);
        }
        if channel >= self.config.channel_count {
            return Err(TransportError::InvalidChannel {
                channel,
                channel_count: self.config.channel_count,
            });
        }
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(TransportError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        match delivery {
            Delivery::Reliable => {
                let slot = &mut self.next_sequence[usize::from(channel)];
                let sequence = *slot;
                *slot = sequence.wrapping_add(1);

                self.queue(
                    Frame::Reliable {
                        channel,
                        sequence,
                        payload: payload.clone(),
                    },
                    now,
                );
                self.in_flight.push_back(InFlight {
                    channel,
                    sequence,
                    payload,
                    first_sent: now,
                    last_sent: now,
                    resends: 0,
                });
            }
            Delivery::Unreliable => {
                self.queue(Frame::Unreliable { channel, payload }, now);
            }
        }
        Ok(())
    }

    /// Applies one frame received from this peer's address.
    pub fn handle_frame(&mut self, frame: Frame, now: Instant) -> Vec<PeerEvent> {
        let mut events = Vec::new();
        if self.state == PeerState::Disconnected {
            return events;
        }
        self.last_received = now;

        match frame {
            Frame::Connect { nonce, .. } => {
                // Our Accept got lost; the client is still knocking
                if self.state == PeerState::Connected && nonce == self.nonce {
                    self.queue(Frame::Accept { nonce }, now);
                }
            }
            Frame::Accept { nonce } => {
                if self.state == PeerState::Connecting && nonce == self.nonce {
                    self.enter(PeerState::Connected, now);
                    events.push(PeerEvent::Connected);
                } else {
                    trace!("{}: ignoring stale accept", self.addr);
                }
            }
            Frame::Reject { reason } => {
                if self.state == PeerState::Connecting {
                    self.enter(PeerState::Disconnected, now);
                    events.push(PeerEvent::Disconnected(DisconnectReason::Rejected(reason)));
                }
            }
            Frame::Disconnect => {
                self.queue(Frame::DisconnectAck, now);
                let reason = if self.state == PeerState::Disconnecting {
                    DisconnectReason::Local
                } else {
                    DisconnectReason::Remote
                };
                self.enter(PeerState::Disconnected, now);
                events.push(PeerEvent::Disconnected(reason));
            }
            Frame::DisconnectAck => {
                if self.state == PeerState::Disconnecting {
                    self.enter(PeerState::Disconnected, now);
                    events.push(PeerEvent::Disconnected(DisconnectReason::Local));
                }
            }
            Frame::Ping => {}
            Frame::Reliable {
                channel,
                sequence,
                payload,
            } => {
                if self.state == PeerState::Connected && channel < self.config.channel_count {
                    self.receive_reliable(channel, sequence, payload, now, &mut events);
                }
            }
            Frame::Ack { channel, sequence } => self.handle_ack(channel, sequence, now),
            Frame::Unreliable { channel, payload } => {
                if self.state == PeerState::Connected && channel < self.config.channel_count {
                    events.push(PeerEvent::Received { channel, payload });
                }
            }
        }
        events
    }

    /// Drives timers: handshake retries, resends, keepalives and timeouts.
    pub fn update(&mut self, now: Instant) -> Option<PeerEvent> {
        match self.state {
            PeerState::Connecting => {
                if now.duration_since(self.state_since) > self.config.connect_timeout {
                    self.enter(PeerState::Disconnected, now);
                    return Some(PeerEvent::Disconnected(DisconnectReason::ConnectTimeout));
                }
                if now.duration_since(self.last_sent) >= self.config.resend_interval {
                    self.queue_connect(now);
                }
                None
            }
            PeerState::Connected => {
                if now.duration_since(self.last_received) > self.config.peer_timeout {
                    self.enter(PeerState::Disconnected, now);
                    return Some(PeerEvent::Disconnected(DisconnectReason::Timeout));
                }
                if self.resend_unacked(now) {
                    self.enter(PeerState::Disconnected, now);
                    return Some(PeerEvent::Disconnected(DisconnectReason::Timeout));
                }
                if now.duration_since(self.last_sent) >= self.config.ping_interval {
                    self.queue(Frame::Ping, now);
                }
                None
            }
            PeerState::Disconnecting => {
                if now.duration_since(self.state_since) > self.config.disconnect_timeout {
                    self.enter(PeerState::Disconnected, now);
                    return Some(PeerEvent::Disconnected(DisconnectReason::Reset));
                }
                if now.duration_since(self.last_sent) >= self.config.resend_interval {
                    self.queue(Frame::Disconnect, now);
                }
                None
            }
            PeerState::Disconnected => None,
        }
    }

    /// Starts a graceful disconnect. Unacknowledged reliable frames are
    /// dropped. A peer that never finished its handshake is disconnected
    /// immediately and the event is returned.
    pub fn disconnect(&mut self, now: Instant) -> Option<PeerEvent> {
        self.in_flight.clear();
        match self.state {
            PeerState::Connected => {
                self.enter(PeerState::Disconnecting, now);
                self.queue(Frame::Disconnect, now);
                None
            }
            PeerState::Connecting => {
                self.queue(Frame::Disconnect, now);
                self.enter(PeerState::Disconnected, now);
                Some(PeerEvent::Disconnected(DisconnectReason::Local))
            }
            PeerState::Disconnecting | PeerState::Disconnected => None,
        }
    }

    /// Tells the other side we are gone without waiting for an answer.
    pub fn disconnect_now(&mut self, now: Instant) {
        self.in_flight.clear();
        if self.state != PeerState::Disconnected {
            self.queue(Frame::Disconnect, now);
            self.enter(PeerState::Disconnected, now);
        }
    }

    fn enter(&mut self, state: PeerState, now: Instant) {
        trace!("{}: {:?} -> {:?}", self.addr, self.state, state);
        self.state = state;
        self.state_since = now;
    }

    fn queue(&mut self, frame: Frame, now: Instant) {
        self.outgoing.push(frame);
        self.last_sent = now;
    }

    fn queue_connect(&mut self, now: Instant) {
        self.queue(
            Frame::Connect {
                protocol_version: PROTOCOL_VERSION,
                channel_count: self.config.channel_count,
                nonce: self.nonce,
            },
            now,
        );
    }

    fn receive_reliable(
        &mut self,
        channel: u8,
        sequence: u32,
        payload: Vec<u8>,
        now: Instant,
        events: &mut Vec<PeerEvent>,
    ) {
        let window = self.config.receive_window;
        let receiver = &mut self.receive[usize::from(channel)];

        if sequence == receiver.next_expected {
            events.push(PeerEvent::Received { channel, payload });
            receiver.next_expected = receiver.next_expected.wrapping_add(1);
            while let Some(buffered) = receiver.pending.remove(&receiver.next_expected) {
                events.push(PeerEvent::Received {
                    channel,
                    payload: buffered,
                });
                receiver.next_expected = receiver.next_expected.wrapping_add(1);
            }
        } else if sequence_greater_than(sequence, receiver.next_expected) {
            if sequence.wrapping_sub(receiver.next_expected) >= window {
                // Outside the window; the sender will try again
                return;
            }
            receiver.pending.entry(sequence).or_insert(payload);
        }
        // Older sequences are duplicates; ack them again so the sender stops

        self.queue(Frame::Ack { channel, sequence }, now);
    }

    fn handle_ack(&mut self, channel: u8, sequence: u32, now: Instant) {
        let position = self
            .in_flight
            .iter()
            .position(|f| f.channel == channel && f.sequence == sequence);

        if let Some(index) = position {
            if let Some(acked) = self.in_flight.remove(index) {
                // Only first transmissions give an unambiguous sample
                if acked.resends == 0 {
                    let rtt = now.duration_since(acked.first_sent).as_secs_f32() * 1000.0;
                    self.rtt.update(rtt);
                }
            }
        }
    }

    /// Returns true when some frame ran out of resends.
    fn resend_unacked(&mut self, now: Instant) -> bool {
        let timeout = self.resend_timeout();
        let mut resent = Vec::new();

        for pending in self.in_flight.iter_mut() {
            if now.duration_since(pending.last_sent) < timeout {
                continue;
            }
            if pending.resends >= self.config.max_resends {
                return true;
            }
            pending.resends += 1;
            pending.last_sent = now;
            resent.push(Frame::Reliable {
                channel: pending.channel,
                sequence: pending.sequence,
                payload: pending.payload.clone(),
            });
        }

        for frame in resent {
            self.queue(frame, now);
        }
        false
    }

    fn resend_timeout(&self) -> Duration {
        let estimate_ms = self.rtt.srtt_ms + 4.0 * self.rtt.rtt_var_ms;
        let estimate = Duration::from_secs_f32(estimate_ms.max(0.0) / 1000.0);
        self.config.resend_interval.max(estimate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    const NONCE: u64 = 0x1234_5678;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn config() -> PeerConfig {
        PeerConfig {
            resend_interval: Duration::from_millis(100),
            ..PeerConfig::default()
        }
    }

    /// Moves every queued frame from `from` into `to`.
    fn pump(from: &mut Peer, to: &mut Peer, now: Instant) -> Vec<PeerEvent> {
        from.take_outgoing()
            .into_iter()
            .flat_map(|frame| to.handle_frame(frame, now))
            .collect()
    }

    fn connected_pair(now: Instant) -> (Peer, Peer) {
        let mut client = Peer::connecting(addr(7777), config(), NONCE, now);
        let connect = client.take_outgoing();
        assert!(matches!(connect[0], Frame::Connect { nonce: NONCE, .. }));

        let mut server = Peer::accepted(addr(5000), config(), NONCE, now);
        let events = pump(&mut server, &mut client, now);
        assert_eq!(events, vec![PeerEvent::Connected]);
        (client, server)
    }

    fn payloads(events: Vec<PeerEvent>) -> Vec<Vec<u8>> {
        events
            .into_iter()
            .filter_map(|e| match e {
                PeerEvent::Received { payload, .. } => Some(payload),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_handshake() {
        let now = Instant::now();
        let (client, server) = connected_pair(now);
        assert!(client.is_connected());
        assert!(server.is_connected());
    }

    #[test]
    fn test_accept_with_wrong_nonce_is_ignored() {
        let now = Instant::now();
        let mut client = Peer::connecting(addr(7777), config(), NONCE, now);
        let events = client.handle_frame(Frame::Accept { nonce: NONCE + 1 }, now);
        assert!(events.is_empty());
        assert_eq!(client.state(), PeerState::Connecting);
    }

    #[test]
    fn test_reject_ends_handshake() {
        let now = Instant::now();
        let mut client = Peer::connecting(addr(7777), config(), NONCE, now);
        let events = client.handle_frame(
            Frame::Reject {
                reason: "server full".to_string(),
            },
            now,
        );
        assert_eq!(
            events,
            vec![PeerEvent::Disconnected(DisconnectReason::Rejected(
                "server full".to_string()
            ))]
        );
        assert_eq!(client.state(), PeerState::Disconnected);
    }

    #[test]
    fn test_connect_is_retried_then_times_out() {
        let start = Instant::now();
        let mut client = Peer::connecting(addr(7777), config(), NONCE, start);
        client.take_outgoing();

        assert_eq!(client.update(start + Duration::from_millis(150)), None);
        let retry = client.take_outgoing();
        assert!(matches!(retry.as_slice(), [Frame::Connect { .. }]));

        let late = start + config().connect_timeout + Duration::from_millis(1);
        assert_eq!(
            client.update(late),
            Some(PeerEvent::Disconnected(DisconnectReason::ConnectTimeout))
        );
    }

    #[test]
    fn test_reliable_delivery_in_order_despite_reordering() {
        let now = Instant::now();
        let (mut client, mut server) = connected_pair(now);

        for payload in [b"a", b"b", b"c"] {
            assert_ok!(server.send(0, payload.to_vec(), Delivery::Reliable, now));
        }
        let mut frames = server.take_outgoing();
        frames.swap(0, 2);

        let mut events = Vec::new();
        for frame in frames {
            events.extend(client.handle_frame(frame, now));
        }

        assert_eq!(payloads(events), vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_duplicate_reliable_frame_is_dropped_but_acked() {
        let now = Instant::now();
        let (mut client, mut server) = connected_pair(now);

        assert_ok!(server.send(0, vec![7], Delivery::Reliable, now));
        let frame = server.take_outgoing().remove(0);

        assert_eq!(payloads(client.handle_frame(frame.clone(), now)), vec![vec![7]]);
        assert!(payloads(client.handle_frame(frame, now)).is_empty());

        let acks = client.take_outgoing();
        assert_eq!(acks.len(), 2);
        assert!(acks.iter().all(|f| matches!(f, Frame::Ack { sequence: 0, .. })));
    }

    #[test]
    fn test_reliable_frame_resent_until_acked() {
        let now = Instant::now();
        let (mut client, mut server) = connected_pair(now);

        assert_ok!(server.send(0, vec![1, 2], Delivery::Reliable, now));
        server.take_outgoing();
        assert_eq!(server.unacked_count(), 1);

        // Resend timeout is at least srtt + 4 * rttvar = 300ms before any sample
        let later = now + Duration::from_millis(400);
        assert_eq!(server.update(later), None);
        let resent = server.take_outgoing();
        assert!(resent
            .iter()
            .any(|f| matches!(f, Frame::Reliable { sequence: 0, .. })));

        for frame in resent {
            client.handle_frame(frame, later);
        }
        pump(&mut client, &mut server, later);
        assert_eq!(server.unacked_count(), 0);
    }

    #[test]
    fn test_ack_updates_round_trip_estimate() {
        let now = Instant::now();
        let (mut client, mut server) = connected_pair(now);
        let before = server.round_trip_time();

        assert_ok!(server.send(0, vec![1], Delivery::Reliable, now));
        pump(&mut server, &mut client, now);
        pump(&mut client, &mut server, now + Duration::from_millis(20));

        assert!(server.round_trip_time() < before);
    }

    #[test]
    fn test_too_many_resends_times_out() {
        let mut now = Instant::now();
        let mut cfg = config();
        cfg.max_resends = 2;
        cfg.peer_timeout = Duration::from_secs(60);
        let mut server = Peer::accepted(addr(5000), cfg, NONCE, now);

        assert_ok!(server.send(0, vec![1], Delivery::Reliable, now));
        let mut last = None;
        for _ in 0..4 {
            now += Duration::from_secs(1);
            last = server.update(now);
            if last.is_some() {
                break;
            }
        }
        assert_eq!(last, Some(PeerEvent::Disconnected(DisconnectReason::Timeout)));
    }

    #[test]
    fn test_unreliable_delivered_immediately() {
        let now = Instant::now();
        let (mut client, mut server) = connected_pair(now);

        assert_ok!(server.send(0, vec![9], Delivery::Unreliable, now));
        let events = pump(&mut server, &mut client, now);
        assert_eq!(payloads(events), vec![vec![9]]);
        assert_eq!(server.unacked_count(), 0);
    }

    #[test]
    fn test_send_errors() {
        let now = Instant::now();
        let mut connecting = Peer::connecting(addr(7777), config(), NONCE, now);
        assert!(matches!(
            connecting.send(0, vec![], Delivery::Reliable, now),
            Err(TransportError::NotConnected)
        ));

        let (_, mut server) = connected_pair(now);
        assert!(matches!(
            server.send(3, vec![], Delivery::Reliable, now),
            Err(TransportError::InvalidChannel { channel: 3, .. })
        ));
        assert_err!(server.send(0, vec![0; MAX_PAYLOAD_SIZE + 1], Delivery::Unreliable, now));
    }

    #[test]
    fn test_graceful_disconnect() {
        let now = Instant::now();
        let (mut client, mut server) = connected_pair(now);

        assert_eq!(client.disconnect(now), None);
        assert_eq!(client.state(), PeerState::Disconnecting);

        let events = pump(&mut client, &mut server, now);
        assert_eq!(events, vec![PeerEvent::Disconnected(DisconnectReason::Remote)]);

        let events = pump(&mut server, &mut client, now);
        assert_eq!(events, vec![PeerEvent::Disconnected(DisconnectReason::Local)]);
        assert_eq!(client.state(), PeerState::Disconnected);
    }

    #[test]
    fn test_unanswered_disconnect_resets() {
        let now = Instant::now();
        let (mut client, _server) = connected_pair(now);

        client.disconnect(now);
        let late = now + config().disconnect_timeout + Duration::from_millis(1);
        assert_eq!(
            client.update(late),
            Some(PeerEvent::Disconnected(DisconnectReason::Reset))
        );
    }

    #[test]
    fn test_disconnect_while_connecting() {
        let now = Instant::now();
        let mut client = Peer::connecting(addr(7777), config(), NONCE, now);
        assert_eq!(
            client.disconnect(now),
            Some(PeerEvent::Disconnected(DisconnectReason::Local))
        );
        assert_eq!(client.state(), PeerState::Disconnected);
    }

    #[test]
    fn test_silent_peer_times_out() {
        let now = Instant::now();
        let (_, mut server) = connected_pair(now);

        let late = now + config().peer_timeout + Duration::from_millis(1);
        assert_eq!(
            server.update(late),
            Some(PeerEvent::Disconnected(DisconnectReason::Timeout))
        );
    }

    #[test]
    fn test_keepalive_ping() {
        let now = Instant::now();
        let (mut client, _) = connected_pair(now);
        client.take_outgoing();

        client.update(now + Duration::from_millis(600));
        assert_eq!(client.take_outgoing(), vec![Frame::Ping]);
    }

    #[test]
    fn test_lost_accept_is_repeated() {
        let now = Instant::now();
        let mut server = Peer::accepted(addr(5000), config(), NONCE, now);
        server.take_outgoing();

        server.handle_frame(
            Frame::Connect {
                protocol_version: PROTOCOL_VERSION,
                channel_count: 1,
                nonce: NONCE,
            },
            now,
        );
        assert_eq!(server.take_outgoing(), vec![Frame::Accept { nonce: NONCE }]);
    }
}
