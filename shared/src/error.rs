use std::io;
use thiserror::Error;

use crate::ConnectionId;

/// Reasons a [`ClientPacket`](crate::ClientPacket) can fail to encode or decode.
///
/// Decoding never panics on hostile input; every malformed buffer ends up
/// as one of these and the caller drops the packet.
#[derive(Debug, Error)]
pub enum PacketError {
    #[error("packet too short: {len} bytes")]
    Truncated { len: usize },

    #[error("protocol version mismatch (expected {expected}, got {found})")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("player name is {len} bytes, limit is {max}")]
    NameTooLong { len: usize, max: usize },

    #[error("announcement is {len} bytes, limit is {max}")]
    MessageTooLong { len: usize, max: usize },

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("socket error: {0}")]
    Io(#[from] io::Error),

    #[error("could not resolve {0}")]
    AddressResolution(String),

    #[error("transport worker is already running")]
    AlreadyRunning,

    #[error("transport is not connected")]
    NotConnected,

    #[error("no connected client with id {0}")]
    UnknownConnection(ConnectionId),

    #[error("channel {channel} out of range (channel count {channel_count})")]
    InvalidChannel { channel: u8, channel_count: u8 },

    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("timed out waiting for the server to accept the connection")]
    ConnectTimeout,

    #[error("connection rejected: {0}")]
    Rejected(String),

    #[error("transport worker stopped unexpectedly")]
    WorkerStopped,

    #[error("frame codec error: {0}")]
    Codec(#[from] bincode::Error),
}
