//! # Session Server Transport
//!
//! This library provides the host half of the session transport. A host
//! listens on a UDP port, admits up to a fixed number of clients and
//! exchanges reliable-ordered or unreliable packets with each of them.
//!
//! ## Core Responsibilities
//!
//! ### Connection Admission
//! Every `Connect` handshake is checked against the protocol version, the
//! channel count and the client limit. Accepted connections get a
//! connection id from a counter that starts at 1; everything else is
//! answered with a `Reject` carrying the reason.
//!
//! ### Per-Client Records
//! The caller supplies an initialize function that turns a connection id and
//! remote IP into a record of its own type. The function runs on the worker
//! thread at accept time, and the record is handed to the game thread with
//! the connect event. The game thread keeps the list of connected records
//! and uses it for targeted sends and predicate broadcasts.
//!
//! ### Teardown
//! Stopping the server tells every client it is leaving, joins the worker
//! and forgets all records. Queued packets are dropped.
//!
//! ## Architecture Design
//!
//! ### Worker Thread
//! The socket lives on a thread named `netsync::server` running a
//! single-threaded tokio runtime. One `select!` loop reads datagrams, writes
//! queued packets and services every connection's reliability timers.
//!
//! ### Queues Between Threads
//! Outgoing packets travel to the worker over an unbounded channel; connect,
//! disconnect and data events come back over another. The game thread
//! drains its queue once per frame and never blocks on the network.
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! Worker-side connection bookkeeping:
//! - Connection id assignment
//! - Capacity enforcement
//! - Address lookup for incoming datagrams
//! - Timers and teardown of each connection
//!
//! ### Network Module (`network`)
//! The `Server` handle, its listen parameters, the event handler trait and
//! the worker loop itself.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{RemoteClient, Server, ServerEventHandler, ServerListenParams};
//! use shared::{ConnectionId, Delivery};
//! use std::time::Duration;
//!
//! struct Echo {
//!     pending: Vec<(ConnectionId, Vec<u8>)>,
//! }
//!
//! impl ServerEventHandler<RemoteClient> for Echo {
//!     fn on_client_connected(&mut self, client: &RemoteClient) {
//!         println!("client {} from {}", client.id, client.ip);
//!     }
//!     fn on_client_disconnected(&mut self, client_id: ConnectionId) {
//!         println!("client {} left", client_id);
//!     }
//!     fn on_data_received(&mut self, client: &RemoteClient, data: &[u8]) {
//!         self.pending.push((client.id, data.to_vec()));
//!     }
//! }
//!
//! let mut server = Server::new();
//! server.start_listening(ServerListenParams::default().set_listen_port(7777))?;
//!
//! let mut echo = Echo { pending: Vec::new() };
//! loop {
//!     server.consume_events(&mut echo);
//!     for (client_id, data) in echo.pending.drain(..) {
//!         server.send_packet_to(client_id, 0, &data, Delivery::Reliable)?;
//!     }
//!     std::thread::sleep(Duration::from_millis(16));
//! }
//! # Ok::<(), shared::TransportError>(())
//! ```

pub mod client_manager;
pub mod network;

pub use network::{
    ConnectedClient, RemoteClient, Server, ServerEvent, ServerEventHandler, ServerListenParams,
};
