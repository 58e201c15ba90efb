//! # Session Client Transport
//!
//! This library provides the client half of the session transport: a single
//! UDP connection from a player's game to the host, with reliable-ordered and
//! unreliable delivery on top of plain datagrams.
//!
//! ## Architecture Overview
//!
//! ### Background Worker
//! All socket I/O happens on a dedicated thread named `netsync::client`. The
//! thread runs a small single-threaded tokio runtime whose event loop reads
//! datagrams, writes queued packets and drives the reliability timers
//! (resends, keepalives, timeouts). The game thread never touches the socket.
//!
//! ### Queues, Not Locks
//! The game thread and the worker talk through channels. Outgoing packets go
//! down one queue; connection events and received data come back up another.
//! The game thread drains the inbound queue once per frame with
//! `consume_events` and dispatches everything to a `ClientEventHandler`.
//!
//! ### Connection Lifecycle
//! - `connect` resolves and binds synchronously, then starts the worker
//! - `wait_for_connection` blocks until the handshake succeeds or fails
//! - `disconnect` leaves gracefully and joins the worker
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, ClientConnectParams, ClientEventHandler};
//! use shared::Delivery;
//! use std::time::Duration;
//!
//! struct Printer;
//!
//! impl ClientEventHandler for Printer {
//!     fn on_connected(&mut self) {
//!         println!("connected");
//!     }
//!     fn on_disconnected(&mut self) {
//!         println!("disconnected");
//!     }
//!     fn on_data_received(&mut self, data: &[u8]) {
//!         println!("{} bytes", data.len());
//!     }
//! }
//!
//! let mut client = Client::new();
//! let params = ClientConnectParams::new()
//!     .set_server_host_name_and_port("127.0.0.1", 7777)
//!     .set_timeout(Duration::from_secs(5));
//!
//! client.connect(&params)?;
//! client.wait_for_connection()?;
//! client.send_packet(0, b"hello", Delivery::Reliable)?;
//!
//! let mut printer = Printer;
//! while client.is_connecting_or_connected() {
//!     client.consume_events(&mut printer);
//!     std::thread::sleep(Duration::from_millis(16));
//! }
//! # Ok::<(), shared::TransportError>(())
//! ```

pub mod network;

pub use network::{
    Client, ClientConnectParams, ClientEvent, ClientEventHandler, ClientStatistics, ClientStatus,
};
