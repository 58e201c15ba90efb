//! # Shared protocol library
//!
//! Types and constants used by both ends of a session: the application
//! packet model carried between players, the datagram framing used by the
//! transport workers, and the reliability state machine that turns plain
//! UDP into reliable-ordered and unreliable channels.
//!
//! ## Module Organization
//!
//! ### Packet Module (`packet`)
//! The application-level `ClientPacket` and its binary encoding. Every
//! message a player sends (join announcements, locations, host game state)
//! is one of these.
//!
//! ### Frame Module (`frame`)
//! Transport-level datagrams: handshake, acks, keepalives and the envelopes
//! that carry encoded packets.
//!
//! ### Peer Module (`peer`)
//! One end of a connection without any socket attached. The client and
//! server workers feed it received frames and timer ticks, and send
//! whatever frames it queues.

pub mod error;
pub mod frame;
pub mod packet;
pub mod peer;

use bincode::Options;

pub use error::{PacketError, TransportError};
pub use frame::{Delivery, Frame};
pub use packet::{
    AnnouncementInfo, AnnouncementKind, ClientPacket, GameStateInfo, MenuState, Msg, MsgType,
    PingInfo, PlayerInfo, PlayerJoinInfo, PlayerLeaveInfo, WorldInfo,
};
pub use peer::{DisconnectReason, Peer, PeerConfig, PeerEvent, PeerState};

/// Port a host listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 7777;
/// Concurrent remote players a host accepts by default.
pub const MAX_CLIENTS: usize = 4;
/// Longest player name, in bytes, that goes on the wire.
pub const MAX_NAME_LENGTH: usize = 25;
/// Longest announcement text, in bytes, that goes on the wire.
pub const MAX_ANNOUNCEMENT_LENGTH: usize = 200;
/// Bumped on every breaking change to the packet layout.
pub const PROTOCOL_VERSION: u32 = 2;
/// Upper bound for a single UDP datagram we send or accept.
pub const MAX_DATAGRAM_SIZE: usize = 1400;
/// Upper bound for an application payload carried in one frame.
pub const MAX_PAYLOAD_SIZE: usize = 1200;

/// Identity the server worker assigns to each accepted connection.
pub type ConnectionId = u32;
/// Identity of a player as it appears inside packets.
pub type ClientId = i32;

/// `client_id` carried by packets whose sender has not been told its id yet.
pub const UNASSIGNED_CLIENT_ID: ClientId = -1;
/// `client_id` the host uses for its own player. Connection ids start at 1.
pub const HOST_CLIENT_ID: ClientId = 0;

/// Bincode settings shared by packets and frames: fixed-width little-endian
/// integers, no trailing garbage, bounded allocation.
pub(crate) fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .reject_trailing_bytes()
        .with_limit(MAX_DATAGRAM_SIZE as u64)
}

/// Player-facing id for a transport connection id.
pub fn client_id_for(connection: ConnectionId) -> ClientId {
    ClientId::try_from(connection).unwrap_or(UNASSIGNED_CLIENT_ID)
}
