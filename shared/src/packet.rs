//! Application packets exchanged between players in a session.
//!
//! On the wire a packet is `protocol_version: u32`, `client_id: i32`,
//! `msg_type: u32` and then the payload of that message type, all little
//! endian with fixed-width integers. Strings carry a u64 length prefix.

use bincode::Options;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{
    wire_options, ClientId, PacketError, MAX_ANNOUNCEMENT_LENGTH, MAX_NAME_LENGTH,
    PROTOCOL_VERSION,
};

const VERSION_HEADER_LEN: usize = 4;

/// Discriminator of a [`Msg`]. The order matches the wire tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgType {
    Ping,
    PlayerJoin,
    GameState,
    World,
    PlayerLocation,
    PlayerLeave,
    Announcement,
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MsgType::Ping => "Ping",
            MsgType::PlayerJoin => "PlayerJoin",
            MsgType::GameState => "GameState",
            MsgType::World => "World",
            MsgType::PlayerLocation => "PlayerLocation",
            MsgType::PlayerLeave => "PlayerLeave",
            MsgType::Announcement => "Announcement",
        };
        f.write_str(name)
    }
}

/// Session phase the host is in; clients follow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MenuState {
    #[default]
    InMenu,
    Lobby,
    Game,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PingInfo;

/// Join handshake. `is_you` marks the host's reply that tells a client
/// its own id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerJoinInfo {
    pub is_you: bool,
    pub client_id: ClientId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GameStateInfo {
    pub host_menu_state: MenuState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorldInfo;

/// Periodic position broadcast. Starts with the same fields as
/// [`PlayerJoinInfo`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub is_you: bool,
    pub client_id: ClientId,
    pub name: String,
    pub location: [f32; 3],
    pub facing_direction: i32,
}

impl PlayerInfo {
    /// Builds a location payload, cutting `name` down to
    /// [`MAX_NAME_LENGTH`] bytes on a char boundary.
    pub fn new(client_id: ClientId, name: &str, location: [f32; 3], facing_direction: i32) -> Self {
        Self {
            is_you: false,
            client_id,
            name: truncate(name, MAX_NAME_LENGTH).to_string(),
            location,
            facing_direction,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerLeaveInfo {
    pub client_id: ClientId,
}

/// How prominently a client should show an announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AnnouncementKind {
    #[default]
    Message,
    Warning,
    Error,
}

/// A line of text from the host meant for the player, such as who joined
/// or why the session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnouncementInfo {
    pub message: String,
    pub kind: AnnouncementKind,
}

impl AnnouncementInfo {
    /// Cuts `message` down to [`MAX_ANNOUNCEMENT_LENGTH`] bytes on a char
    /// boundary.
    pub fn new(kind: AnnouncementKind, message: &str) -> Self {
        Self {
            message: truncate(message, MAX_ANNOUNCEMENT_LENGTH).to_string(),
            kind,
        }
    }
}

impl fmt::Display for AnnouncementInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}

/// Payload of a packet. Variant order is the wire tag order and must only
/// ever be appended to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Msg {
    Ping(PingInfo),
    PlayerJoin(PlayerJoinInfo),
    GameState(GameStateInfo),
    World(WorldInfo),
    PlayerLocation(PlayerInfo),
    PlayerLeave(PlayerLeaveInfo),
    Announcement(AnnouncementInfo),
}

impl Msg {
    pub fn msg_type(&self) -> MsgType {
        match self {
            Msg::Ping(_) => MsgType::Ping,
            Msg::PlayerJoin(_) => MsgType::PlayerJoin,
            Msg::GameState(_) => MsgType::GameState,
            Msg::World(_) => MsgType::World,
            Msg::PlayerLocation(_) => MsgType::PlayerLocation,
            Msg::PlayerLeave(_) => MsgType::PlayerLeave,
            Msg::Announcement(_) => MsgType::Announcement,
        }
    }
}

impl fmt::Display for Msg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Msg::Ping(_) => write!(f, "ping"),
            Msg::PlayerJoin(info) => write!(
                f,
                "PlayerJoinInfo(is_you: {}, id: {})",
                info.is_you, info.client_id
            ),
            Msg::GameState(info) => write!(f, "GameStateInfo(state: {:?})", info.host_menu_state),
            Msg::World(_) => write!(f, "worldinfo"),
            Msg::PlayerLocation(info) => write!(
                f,
                "PlayerInfo(id: {} name: {} pos({}, {}, {}) facing: {})",
                info.client_id,
                info.name,
                info.location[0],
                info.location[1],
                info.location[2],
                info.facing_direction
            ),
            Msg::PlayerLeave(info) => write!(f, "PlayerLeave({})", info.client_id),
            Msg::Announcement(info) => write!(f, "Announcement({})", info),
        }
    }
}

/// The unit of exchange between players.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientPacket {
    pub client_id: ClientId,
    pub msg: Msg,
}

impl ClientPacket {
    pub fn new(client_id: ClientId, msg: Msg) -> Self {
        Self { client_id, msg }
    }

    pub fn ping(client_id: ClientId) -> Self {
        Self::new(client_id, Msg::Ping(PingInfo))
    }

    pub fn player_join(client_id: ClientId, is_you: bool, joined_id: ClientId) -> Self {
        Self::new(
            client_id,
            Msg::PlayerJoin(PlayerJoinInfo {
                is_you,
                client_id: joined_id,
            }),
        )
    }

    pub fn game_state(client_id: ClientId, host_menu_state: MenuState) -> Self {
        Self::new(client_id, Msg::GameState(GameStateInfo { host_menu_state }))
    }

    pub fn player_location(client_id: ClientId, info: PlayerInfo) -> Self {
        Self::new(client_id, Msg::PlayerLocation(info))
    }

    pub fn player_leave(client_id: ClientId, left_id: ClientId) -> Self {
        Self::new(client_id, Msg::PlayerLeave(PlayerLeaveInfo { client_id: left_id }))
    }

    pub fn announcement(client_id: ClientId, kind: AnnouncementKind, message: &str) -> Self {
        Self::new(
            client_id,
            Msg::Announcement(AnnouncementInfo::new(kind, message)),
        )
    }

    pub fn msg_type(&self) -> MsgType {
        self.msg.msg_type()
    }

    /// Serializes the packet, prefixed with [`PROTOCOL_VERSION`].
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        self.validate()?;

        let mut buffer = Vec::with_capacity(64);
        buffer.extend_from_slice(&PROTOCOL_VERSION.to_le_bytes());
        wire_options().serialize_into(&mut buffer, self)?;
        Ok(buffer)
    }

    /// Parses a buffer produced by [`ClientPacket::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() < VERSION_HEADER_LEN {
            return Err(PacketError::Truncated { len: bytes.len() });
        }

        let (header, body) = bytes.split_at(VERSION_HEADER_LEN);
        let mut version = [0u8; VERSION_HEADER_LEN];
        version.copy_from_slice(header);
        let found = u32::from_le_bytes(version);
        if found != PROTOCOL_VERSION {
            return Err(PacketError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                found,
            });
        }

        let packet: ClientPacket = wire_options().deserialize(body)?;
        packet.validate()?;
        Ok(packet)
    }

    fn validate(&self) -> Result<(), PacketError> {
        match &self.msg {
            Msg::PlayerLocation(info) if info.name.len() > MAX_NAME_LENGTH => {
                Err(PacketError::NameTooLong {
                    len: info.name.len(),
                    max: MAX_NAME_LENGTH,
                })
            }
            Msg::Announcement(info) if info.message.len() > MAX_ANNOUNCEMENT_LENGTH => {
                Err(PacketError::MessageTooLong {
                    len: info.message.len(),
                    max: MAX_ANNOUNCEMENT_LENGTH,
                })
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for ClientPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Packet({}: {} {})", self.client_id, self.msg_type(), self.msg)
    }
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
