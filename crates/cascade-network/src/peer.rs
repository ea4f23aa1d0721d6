//! Peer management

use crate::error::{NetworkError, NetworkResult};
use crate::types::{Message, PeerId, MAX_MESSAGE_LEN};
use bytes::BytesMut;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Peer connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Handshake in progress
    Connecting,
    /// Handshake complete
    Connected,
}

/// Peer information
#[derive(Debug, Clone)]
pub struct PeerInfo {
    /// Peer ID
    pub id: PeerId,
    /// Remote socket address
    pub addr: SocketAddr,
    /// Address the peer advertised for new connections
    pub listen_addr: SocketAddr,
    /// Connection state
    pub state: PeerState,
    /// Connection time
    pub connected_at: Instant,
    /// Last message time
    pub last_message_at: Instant,
    /// Is inbound connection
    pub inbound: bool,
}

impl PeerInfo {
    /// Create new peer info
    pub fn new(id: PeerId, addr: SocketAddr, listen_addr: SocketAddr, inbound: bool) -> Self {
        let now = Instant::now();
        Self {
            id,
            addr,
            listen_addr,
            state: PeerState::Connecting,
            connected_at: now,
            last_message_at: now,
            inbound,
        }
    }

    /// Update last message time
    pub fn touch(&mut self) {
        self.last_message_at = Instant::now();
    }
}

/// Peer connection handle
pub struct PeerConnection {
    /// Peer ID
    pub peer_id: PeerId,
    /// Outgoing message sender
    pub sender: mpsc::Sender<Message>,
}

impl PeerConnection {
    /// Queue a message for this peer
    pub async fn send(&self, msg: Message) -> NetworkResult<()> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| NetworkError::ChannelClosed)
    }
}

/// Read one framed message
pub async fn read_message<R>(reader: &mut R) -> NetworkResult<Message>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;

    if len == 0 || len > MAX_MESSAGE_LEN {
        return Err(NetworkError::InvalidMessage("invalid message length".into()));
    }

    let mut buf = BytesMut::with_capacity(4 + len);
    buf.extend_from_slice(&len_buf);
    buf.resize(4 + len, 0);
    reader.read_exact(&mut buf[4..]).await?;

    Message::decode(buf.freeze())
        .ok_or_else(|| NetworkError::InvalidMessage("failed to decode message".into()))
}

/// Write one framed message
pub async fn write_message<W>(writer: &mut W, msg: &Message) -> NetworkResult<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&msg.encode()).await?;
    writer.flush().await?;
    Ok(())
}

/// Peer manager
pub struct PeerManager {
    peers: RwLock<HashMap<PeerId, PeerInfo>>,
    connections: RwLock<HashMap<PeerId, Arc<PeerConnection>>>,
    max_peers: usize,
}

impl PeerManager {
    /// Create new peer manager
    pub fn new(max_peers: usize) -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
            max_peers,
        }
    }

    /// Add a peer
    pub fn add_peer(&self, info: PeerInfo, conn: Arc<PeerConnection>) -> NetworkResult<()> {
        let mut peers = self.peers.write();
        let mut connections = self.connections.write();

        if peers.len() >= self.max_peers {
            return Err(NetworkError::ConnectionFailed("max peers reached".into()));
        }

        if peers.contains_key(&info.id) {
            return Err(NetworkError::AlreadyConnected(info.id.to_string()));
        }

        peers.insert(info.id, info);
        connections.insert(conn.peer_id, conn);
        Ok(())
    }

    /// Remove a peer
    pub fn remove_peer(&self, peer_id: &PeerId) {
        self.peers.write().remove(peer_id);
        self.connections.write().remove(peer_id);
    }

    /// Drop every peer. Writer tasks exit once their senders are gone.
    pub fn clear(&self) {
        self.peers.write().clear();
        self.connections.write().clear();
    }

    /// Get peer info
    pub fn get_peer(&self, peer_id: &PeerId) -> Option<PeerInfo> {
        self.peers.read().get(peer_id).cloned()
    }

    /// Get peer connection
    pub fn get_connection(&self, peer_id: &PeerId) -> Option<Arc<PeerConnection>> {
        self.connections.read().get(peer_id).cloned()
    }

    /// Snapshot of every connection
    pub fn connections(&self) -> Vec<Arc<PeerConnection>> {
        self.connections.read().values().cloned().collect()
    }

    /// Touch peer (update last message time)
    pub fn touch_peer(&self, peer_id: &PeerId) {
        if let Some(peer) = self.peers.write().get_mut(peer_id) {
            peer.touch();
        }
    }

    /// Get all peer IDs
    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.peers.read().keys().cloned().collect()
    }

    /// Get peer count
    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    /// Check if can accept more peers
    pub fn can_accept(&self) -> bool {
        self.peers.read().len() < self.max_peers
    }

    /// Check if peer exists
    pub fn has_peer(&self, peer_id: &PeerId) -> bool {
        self.peers.read().contains_key(peer_id)
    }
}
