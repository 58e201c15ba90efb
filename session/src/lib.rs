//! # Multiplayer Session
//!
//! This library ties the client and server transports together into a
//! player's view of a multiplayer session. A game owns one [`Info`], picks a
//! role (host, client or none) and calls [`Info::network_tick`] once per
//! frame. Everything else happens inside that call.
//!
//! ## Roles
//!
//! ### Host
//! The host listens for players, hands each connection its client id and
//! relays what players send to everybody else (a star topology). It is the
//! authority on player ids and on the session phase, which it broadcasts
//! to every client a few times per second. The host never trusts the id a
//! packet claims; the connection it arrived on decides.
//!
//! ### Client
//! A client connects to one host, announces itself and waits to be told its
//! id. From then on it streams its player's location to the host every
//! frame and applies whatever the host relays.
//!
//! ### None
//! No transport is running. Ticking is a no-op.
//!
//! ## Module Organization
//!
//! ### Info Module (`info`)
//! The orchestrator: role transitions, the per-frame tick and outbox
//! delivery to the active transport.
//!
//! ### Protocol Module (`protocol`)
//! What each packet means. Pure state transitions over the replication
//! state and the gameplay hooks, with outgoing packets collected in an
//! outbox, so the rules can be tested without sockets.
//!
//! ### Replication Module (`replication`)
//! Last known name, position and facing of every remote player.
//!
//! ### Hooks Module (`hooks`)
//! The interface gameplay implements so the session can spawn, move and
//! remove remote players and read the local one.
//!
//! ### Config Module (`config`)
//! Ports, limits and timeouts, with their mapping onto transport parameters.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use session::{GameplayHooks, Info, SessionConfig};
//! use shared::{ClientId, PlayerInfo};
//!
//! struct World;
//!
//! impl GameplayHooks for World {
//!     fn add_new_player(&mut self, _origin: ClientId, client_id: ClientId) {
//!         println!("spawn {}", client_id);
//!     }
//!     fn remove_player(&mut self, client_id: ClientId) {
//!         println!("despawn {}", client_id);
//!     }
//!     fn update_remote_player(&mut self, id: ClientId, name: &str, at: [f32; 3], _facing: i32) {
//!         println!("{} ({}) at {:?}", name, id, at);
//!     }
//!     fn player_packet_info(&mut self, my_client_id: ClientId) -> PlayerInfo {
//!         PlayerInfo::new(my_client_id, "Buck", [0.0; 3], 0)
//!     }
//! }
//!
//! let mut session = Info::new(SessionConfig::default(), World);
//! session.set_role_to_host()?;
//! loop {
//!     session.network_tick(1.0 / 60.0);
//!     std::thread::sleep(std::time::Duration::from_millis(16));
//! }
//! # Ok::<(), session::SessionError>(())
//! ```

pub mod config;
pub mod error;
pub mod hooks;
pub mod info;
pub mod protocol;
pub mod replication;
pub mod trigger;

pub use config::SessionConfig;
pub use error::SessionError;
pub use hooks::GameplayHooks;
pub use info::{Info, Role, SessionStatus};
pub use protocol::{Outgoing, Protocol, Target};
pub use replication::{PlayerSnapshot, Replication};
pub use trigger::TickTrigger;
