//! Network types

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

/// Largest frame body accepted from a peer
pub const MAX_MESSAGE_LEN: usize = 16 * 1024 * 1024;

/// Peer identifier (32 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId([u8; 32]);

impl PeerId {
    /// Create from bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Generate random peer ID
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        Self(bytes)
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

/// Network message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Handshake message
    Handshake = 0,
    /// Ping message
    Ping = 1,
    /// Pong response
    Pong = 2,
    /// Full block relayed after acceptance
    BlockRelay = 10,
    /// Transaction relayed after pool acceptance
    TxRelay = 11,
    /// Disconnect
    Disconnect = 255,
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Handshake),
            1 => Ok(Self::Ping),
            2 => Ok(Self::Pong),
            10 => Ok(Self::BlockRelay),
            11 => Ok(Self::TxRelay),
            255 => Ok(Self::Disconnect),
            _ => Err(()),
        }
    }
}

/// Handshake data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handshake {
    /// Protocol version
    pub version: u32,
    /// Network ID; peers on different networks refuse each other
    pub network_id: u64,
    /// Sender's peer ID
    pub peer_id: PeerId,
    /// Address the sender accepts connections on
    pub listen_addr: SocketAddr,
}

impl Handshake {
    /// Create a new handshake
    pub fn new(version: u32, network_id: u64, peer_id: PeerId, listen_addr: SocketAddr) -> Self {
        Self {
            version,
            network_id,
            peer_id,
            listen_addr,
        }
    }
}

/// Network message
#[derive(Debug, Clone)]
pub struct Message {
    /// Message type
    pub msg_type: MessageType,
    /// Payload
    pub payload: Bytes,
}

impl Message {
    /// Create a new message
    pub fn new(msg_type: MessageType, payload: Bytes) -> Self {
        Self { msg_type, payload }
    }

    /// Create empty message
    pub fn empty(msg_type: MessageType) -> Self {
        Self {
            msg_type,
            payload: Bytes::new(),
        }
    }

    /// Create ping message
    pub fn ping() -> Self {
        Self::empty(MessageType::Ping)
    }

    /// Create pong message
    pub fn pong() -> Self {
        Self::empty(MessageType::Pong)
    }

    /// Create disconnect message
    pub fn disconnect() -> Self {
        Self::empty(MessageType::Disconnect)
    }

    /// Encode message to bytes
    /// Format: [length: 4 bytes][type: 1 byte][payload: N bytes]
    pub fn encode(&self) -> Bytes {
        let len = 1 + self.payload.len();
        let mut buf = BytesMut::with_capacity(4 + len);
        buf.put_u32(len as u32);
        buf.put_u8(self.msg_type as u8);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Decode message from bytes
    pub fn decode(mut data: Bytes) -> Option<Self> {
        if data.len() < 5 {
            return None;
        }
        let len = data.get_u32() as usize;
        if data.len() < len || len < 1 {
            return None;
        }
        let msg_type = MessageType::try_from(data.get_u8()).ok()?;
        let payload = data.split_to(len - 1);
        Some(Self { msg_type, payload })
    }
}
