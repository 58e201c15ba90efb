//! Connection bookkeeping for the server worker thread
//!
//! This module owns every accepted connection while the server is listening:
//! - Connection id assignment from a monotonically increasing counter
//! - Capacity enforcement
//! - Address lookup for incoming datagrams
//! - Driving each connection's reliability state machine
//!
//! Nothing here is visible to the game thread. It only ever sees the
//! records produced by the server's initialize function.

use log::info;
use shared::{ConnectionId, Frame, Peer, PeerEvent, PeerState};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

/// Manages all accepted connections and their reliability state
///
/// Connection ids are handed out once per accepted connection, starting at
/// 1, and are never reused while the manager lives.
pub struct ClientManager {
    /// Connected peers indexed by their connection id
    clients: HashMap<ConnectionId, Peer>,
    /// Next id for a new connection
    next_client_id: ConnectionId,
    /// Maximum number of concurrent connections allowed
    max_clients: usize,
}

impl ClientManager {
    /// Creates an empty manager with the given capacity.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Registers an accepted peer.
    ///
    /// Returns `None` when the server is at capacity; the peer is dropped.
    pub fn add_client(&mut self, peer: Peer) -> Option<ConnectionId> {
        if self.is_full() {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id = self.next_client_id.wrapping_add(1).max(1);

        info!("Client {} connected from {}", client_id, peer.addr());
        self.clients.insert(client_id, peer);

        Some(client_id)
    }

    /// Forgets a connection, returning its peer if it was known.
    pub fn remove_client(&mut self, client_id: &ConnectionId) -> Option<Peer> {
        let removed = self.clients.remove(client_id);
        if removed.is_some() {
            info!("Client {} disconnected", client_id);
        }
        removed
    }

    /// Finds the connection a datagram from `addr` belongs to
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<ConnectionId> {
        self.clients
            .iter()
            .find(|(_, peer)| peer.addr() == addr)
            .map(|(id, _)| *id)
    }

    pub fn get_mut(&mut self, client_id: &ConnectionId) -> Option<&mut Peer> {
        self.clients.get_mut(client_id)
    }

    /// Runs the timers of every connection and collects what they report.
    pub fn update_all(&mut self, now: Instant) -> Vec<(ConnectionId, PeerEvent)> {
        self.clients
            .iter_mut()
            .filter_map(|(id, peer)| peer.update(now).map(|event| (*id, event)))
            .collect()
    }

    /// Frames waiting to be written, paired with their destination.
    pub fn take_outgoing(&mut self) -> Vec<(SocketAddr, Frame)> {
        let mut frames = Vec::new();
        for peer in self.clients.values_mut() {
            let addr = peer.addr();
            frames.extend(peer.take_outgoing().into_iter().map(|frame| (addr, frame)));
        }
        frames
    }

    /// Drops connections whose state machine has finished.
    ///
    /// Call after [`take_outgoing`](Self::take_outgoing) so their final
    /// frames still go out.
    pub fn remove_disconnected(&mut self) -> Vec<ConnectionId> {
        let finished: Vec<ConnectionId> = self
            .clients
            .iter()
            .filter(|(_, peer)| peer.state() == PeerState::Disconnected)
            .map(|(id, _)| *id)
            .collect();

        for client_id in &finished {
            self.remove_client(client_id);
        }

        finished
    }

    /// Tells every connection we are leaving, without waiting for answers
    pub fn disconnect_all(&mut self, now: Instant) {
        for peer in self.clients.values_mut() {
            peer.disconnect_now(now);
        }
    }

    pub fn is_full(&self) -> bool {
        self.clients.len() >= self.max_clients
    }

    /// Returns the number of current connections
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if nobody is connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
