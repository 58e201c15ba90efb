//! Transport-level datagrams.
//!
//! Every UDP datagram is `FRAME_MAGIC` followed by one bincode-encoded
//! [`Frame`]. Application packets travel as opaque payloads inside
//! `Reliable` and `Unreliable` frames.

use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::{wire_options, TransportError, MAX_DATAGRAM_SIZE};

/// First four bytes of every datagram we send.
pub const FRAME_MAGIC: u32 = 0x5048_4d53;

const MAGIC_LEN: usize = 4;

/// How a payload should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Resent until acknowledged, delivered in send order per channel.
    Reliable,
    /// Sent once. May be dropped or arrive out of order.
    Unreliable,
}

/// One transport datagram. Variant order is the wire tag order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    /// Client asks to open a connection. Resent until answered.
    Connect {
        protocol_version: u32,
        channel_count: u8,
        /// Random per attempt, echoed back in `Accept`.
        nonce: u64,
    },
    /// Server accepted the `Connect` carrying the same nonce.
    Accept {
        nonce: u64,
    },
    /// Server refused the connection.
    Reject {
        reason: String,
    },
    /// Sender is leaving. Answered with `DisconnectAck`.
    Disconnect,
    DisconnectAck,
    /// Keepalive, sent when nothing else went out for a while.
    Ping,
    /// Payload that is resent until acknowledged.
    Reliable {
        channel: u8,
        sequence: u32,
        payload: Vec<u8>,
    },
    /// Acknowledges one `Reliable` frame.
    Ack {
        channel: u8,
        sequence: u32,
    },
    /// Payload sent once.
    Unreliable {
        channel: u8,
        payload: Vec<u8>,
    },
}

impl Frame {
    /// Prefixes the bincode body with [`FRAME_MAGIC`].
    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        let mut buffer = Vec::with_capacity(32);
        buffer.extend_from_slice(&FRAME_MAGIC.to_le_bytes());
        wire_options().serialize_into(&mut buffer, self)?;
        Ok(buffer)
    }

    /// Returns `None` for anything that is not one of our datagrams.
    pub fn decode(bytes: &[u8]) -> Option<Frame> {
        if bytes.len() < MAGIC_LEN || bytes.len() > MAX_DATAGRAM_SIZE {
            return None;
        }
        let (magic, body) = bytes.split_at(MAGIC_LEN);
        if magic != FRAME_MAGIC.to_le_bytes().as_slice() {
            return None;
        }
        wire_options().deserialize(body).ok()
    }

    /// Variant name for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Frame::Connect { .. } => "Connect",
            Frame::Accept { .. } => "Accept",
            Frame::Reject { .. } => "Reject",
            Frame::Disconnect => "Disconnect",
            Frame::DisconnectAck => "DisconnectAck",
            Frame::Ping => "Ping",
            Frame::Reliable { .. } => "Reliable",
            Frame::Ack { .. } => "Ack",
            Frame::Unreliable { .. } => "Unreliable",
        }
    }
}

const SEQUENCE_WRAP_THRESHOLD: u32 = u32::MAX / 2;

/// Wrapping comparison: is `s1` newer than `s2`?
#[inline]
pub fn sequence_greater_than(s1: u32, s2: u32) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}
