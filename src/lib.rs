//! Host/client session networking for a small cooperative game.
//!
//! The workspace is split the way the pieces depend on each other:
//!
//! - [`shared`]: packet model, datagram framing and the reliability state machine
//! - [`client`]: the client transport worker
//! - [`server`]: the host transport worker
//! - [`session`]: roles, packet meaning, replication and the per-frame tick
//!
//! Games normally only need [`session::Info`] and the [`session::GameplayHooks`]
//! trait; the lower layers are re-exported for tools and tests.

pub use client;
pub use server;
pub use session;
pub use shared;

pub use session::{GameplayHooks, Info, Role, SessionConfig, SessionError, SessionStatus};
