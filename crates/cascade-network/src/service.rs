//! Network subsystem

use crate::error::{NetworkError, NetworkResult};
use crate::peer::{read_message, write_message, PeerConnection, PeerInfo, PeerManager, PeerState};
use crate::types::{Handshake, Message, MessageType, PeerId};
use cascade_storage::{cf, Database};
use cascade_types::{unix_now, Block, Transaction};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const PEER_QUEUE: usize = 256;

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Listen address; port 0 picks a free port
    pub listen_addr: SocketAddr,
    /// Maximum peers
    pub max_peers: usize,
    /// Protocol version
    pub protocol_version: u32,
    /// Network ID
    pub network_id: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            max_peers: 32,
            protocol_version: 1,
            network_id: 1,
        }
    }
}

impl NetworkConfig {
    /// Set listen address
    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = addr;
        self
    }

    /// Set maximum peers
    pub fn with_max_peers(mut self, max_peers: usize) -> Self {
        self.max_peers = max_peers;
        self
    }

    /// Set network ID
    pub fn with_network_id(mut self, network_id: u64) -> Self {
        self.network_id = network_id;
        self
    }
}

/// Persisted entry in the peers column family, keyed by listen address
#[derive(Debug, Serialize, Deserialize)]
struct PeerRecord {
    peer_id: PeerId,
    last_seen: u64,
}

struct NetworkInner {
    config: NetworkConfig,
    peer_id: PeerId,
    local_addr: SocketAddr,
    peers: PeerManager,
    store: Database,
    relayed: AtomicU64,
    received: AtomicU64,
    shutdown: watch::Receiver<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Network subsystem handle
///
/// Dropping the handle stops the accept loop and every peer task.
pub struct Network {
    inner: Arc<NetworkInner>,
    shutdown: watch::Sender<bool>,
}

impl Network {
    /// Open the peer store under `dir` and start listening
    pub async fn bind(config: NetworkConfig, dir: impl AsRef<Path>) -> NetworkResult<Arc<Self>> {
        let store = Database::open_at(dir.as_ref())?;
        let listener = TcpListener::bind(config.listen_addr).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let inner = Arc::new(NetworkInner {
            peers: PeerManager::new(config.max_peers),
            config,
            peer_id: PeerId::random(),
            local_addr,
            store,
            relayed: AtomicU64::new(0),
            received: AtomicU64::new(0),
            shutdown: shutdown_rx,
            tasks: Mutex::new(Vec::new()),
        });

        let accept = tokio::spawn(accept_loop(inner.clone(), listener));
        inner.track(accept);

        info!(addr = %local_addr, peer_id = %inner.peer_id, "Network listening");
        Ok(Arc::new(Self {
            inner,
            shutdown: shutdown_tx,
        }))
    }

    /// Our peer ID
    pub fn peer_id(&self) -> PeerId {
        self.inner.peer_id
    }

    /// Bound listen address
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// Configuration this network was bound with
    pub fn config(&self) -> &NetworkConfig {
        &self.inner.config
    }

    /// Get peer count
    pub fn peer_count(&self) -> usize {
        self.inner.peers.peer_count()
    }

    /// Get connected peer IDs
    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.inner.peers.peer_ids()
    }

    /// Get peer info
    pub fn get_peer(&self, peer_id: &PeerId) -> Option<PeerInfo> {
        self.inner.peers.get_peer(peer_id)
    }

    /// Number of relay calls made through this network
    pub fn relayed_count(&self) -> u64 {
        self.inner.relayed.load(Ordering::SeqCst)
    }

    /// Number of relayed blocks and transactions received from peers
    pub fn received_count(&self) -> u64 {
        self.inner.received.load(Ordering::SeqCst)
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Listen addresses of every peer this store has ever completed a handshake with
    pub fn known_peers(&self) -> NetworkResult<Vec<SocketAddr>> {
        let mut addrs = Vec::new();
        for (key, _) in self.inner.store.entries(cf::PEERS)? {
            match std::str::from_utf8(&key).ok().and_then(|s| s.parse().ok()) {
                Some(addr) => addrs.push(addr),
                None => warn!(key = %hex::encode(&key), "Skipping malformed peer record"),
            }
        }
        Ok(addrs)
    }

    /// Connect to a peer and complete the handshake
    pub async fn connect(&self, addr: SocketAddr) -> NetworkResult<PeerId> {
        if self.is_closed() {
            return Err(NetworkError::Closed);
        }
        if !self.inner.peers.can_accept() {
            return Err(NetworkError::ConnectionFailed("max peers reached".into()));
        }

        info!(%addr, "Connecting to peer");
        let stream = TcpStream::connect(addr).await?;
        self.inner.handle_connection(stream, addr, false).await
    }

    /// Queue a message to every connected peer, returning how many accepted it
    pub async fn broadcast(&self, msg: Message) -> usize {
        let mut sent = 0;
        for conn in self.inner.peers.connections() {
            match conn.send(msg.clone()).await {
                Ok(()) => sent += 1,
                Err(e) => warn!(peer = %conn.peer_id, error = %e, "Failed to send to peer"),
            }
        }
        sent
    }

    /// Relay an accepted block to every peer
    pub async fn relay_block(&self, block: &Block) -> usize {
        self.relay(MessageType::BlockRelay, serde_json::to_vec(block))
            .await
    }

    /// Relay an accepted transaction to every peer
    pub async fn relay_transaction(&self, tx: &Transaction) -> usize {
        self.relay(MessageType::TxRelay, serde_json::to_vec(tx)).await
    }

    async fn relay(
        &self,
        msg_type: MessageType,
        payload: Result<Vec<u8>, serde_json::Error>,
    ) -> usize {
        self.inner.relayed.fetch_add(1, Ordering::SeqCst);
        match payload {
            Ok(payload) => self.broadcast(Message::new(msg_type, payload.into())).await,
            Err(e) => {
                warn!(?msg_type, error = %e, "Failed to encode relay payload");
                0
            }
        }
    }

    /// Stop listening, drop every peer and wait for all network tasks
    pub async fn close(&self) {
        self.shutdown.send_replace(true);
        loop {
            self.inner.peers.clear();
            let tasks = std::mem::take(&mut *self.inner.tasks.lock());
            if tasks.is_empty() {
                break;
            }
            for task in tasks {
                let _ = task.await;
            }
        }
        self.inner.store.close();
        info!(addr = %self.inner.local_addr, "Network closed");
    }
}

impl Drop for Network {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

impl NetworkInner {
    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn remember_peer(&self, listen_addr: SocketAddr, peer_id: PeerId) {
        let record = PeerRecord {
            peer_id,
            last_seen: unix_now(),
        };
        let result = serde_json::to_vec(&record)
            .map_err(|e| e.to_string())
            .and_then(|value| {
                self.store
                    .put(cf::PEERS, listen_addr.to_string().as_bytes(), &value)
                    .map_err(|e| e.to_string())
            });
        if let Err(e) = result {
            warn!(%listen_addr, error = %e, "Failed to persist peer");
        }
    }

    async fn handle_connection(
        self: &Arc<Self>,
        mut stream: TcpStream,
        addr: SocketAddr,
        inbound: bool,
    ) -> NetworkResult<PeerId> {
        let ours = Handshake::new(
            self.config.protocol_version,
            self.config.network_id,
            self.peer_id,
            self.local_addr,
        );
        let payload =
            serde_json::to_vec(&ours).map_err(|e| NetworkError::Protocol(e.to_string()))?;
        write_message(&mut stream, &Message::new(MessageType::Handshake, payload.into())).await?;

        let response = tokio::time::timeout(HANDSHAKE_TIMEOUT, read_message(&mut stream))
            .await
            .map_err(|_| NetworkError::Timeout(format!("handshake with {}", addr)))??;
        if response.msg_type != MessageType::Handshake {
            return Err(NetworkError::Protocol("expected handshake".into()));
        }
        let theirs: Handshake = serde_json::from_slice(&response.payload)
            .map_err(|e| NetworkError::Protocol(e.to_string()))?;

        if theirs.version != self.config.protocol_version {
            return Err(NetworkError::Protocol(format!(
                "protocol version mismatch: ours {}, theirs {}",
                self.config.protocol_version, theirs.version
            )));
        }
        if theirs.network_id != self.config.network_id {
            return Err(NetworkError::Protocol("network ID mismatch".into()));
        }
        if theirs.peer_id == self.peer_id {
            return Err(NetworkError::Protocol("connected to self".into()));
        }
        if self.is_shutting_down() {
            return Err(NetworkError::Closed);
        }

        let peer_id = theirs.peer_id;
        let (tx, mut rx) = mpsc::channel::<Message>(PEER_QUEUE);

        let mut info = PeerInfo::new(peer_id, addr, theirs.listen_addr, inbound);
        info.state = PeerState::Connected;
        let conn = Arc::new(PeerConnection {
            peer_id,
            sender: tx,
        });
        self.peers.add_peer(info, conn)?;
        self.remember_peer(theirs.listen_addr, peer_id);

        info!(peer = %peer_id, %addr, inbound, "Connected to peer");

        let (read_half, mut write_half) = stream.into_split();
        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if write_message(&mut write_half, &msg).await.is_err() {
                    break;
                }
            }
        });
        self.track(writer);

        let this = self.clone();
        let reader = tokio::spawn(async move { this.read_loop(peer_id, read_half).await });
        self.track(reader);

        Ok(peer_id)
    }

    async fn read_loop(&self, peer_id: PeerId, read_half: OwnedReadHalf) {
        let mut reader = BufReader::new(read_half);
        let mut shutdown = self.shutdown.clone();

        loop {
            if *shutdown.borrow() {
                break;
            }
            let msg = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                read = read_message(&mut reader) => match read {
                    Ok(msg) => msg,
                    Err(e) => {
                        debug!(peer = %peer_id, error = %e, "Peer stream ended");
                        break;
                    }
                },
            };

            self.peers.touch_peer(&peer_id);
            match msg.msg_type {
                MessageType::Ping => {
                    if let Some(conn) = self.peers.get_connection(&peer_id) {
                        let _ = conn.send(Message::pong()).await;
                    }
                }
                MessageType::Pong => {}
                MessageType::Disconnect => break,
                MessageType::Handshake => {
                    warn!(peer = %peer_id, "Unexpected handshake after connect");
                    break;
                }
                MessageType::BlockRelay | MessageType::TxRelay => {
                    self.received.fetch_add(1, Ordering::SeqCst);
                    debug!(peer = %peer_id, kind = ?msg.msg_type, bytes = msg.payload.len(), "Relay received");
                }
            }
        }

        self.peers.remove_peer(&peer_id);
        debug!(peer = %peer_id, "Peer disconnected");
    }
}

async fn accept_loop(inner: Arc<NetworkInner>, listener: TcpListener) {
    let mut shutdown = inner.shutdown.clone();
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    debug!(%addr, "Incoming connection");
                    if !inner.peers.can_accept() {
                        warn!(%addr, "Rejecting connection: max peers reached");
                        continue;
                    }
                    let conn_inner = inner.clone();
                    let handle = tokio::spawn(async move {
                        if let Err(e) = conn_inner.handle_connection(stream, addr, true).await {
                            warn!(%addr, error = %e, "Inbound connection failed");
                        }
                    });
                    inner.track(handle);
                }
                Err(e) => error!(error = %e, "Accept error"),
            },
        }
    }
    debug!(addr = %inner.local_addr, "Accept loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn bind_temp(config: NetworkConfig) -> (TempDir, Arc<Network>) {
        let dir = TempDir::new().unwrap();
        let network = Network::bind(config, dir.path().join("network"))
            .await
            .unwrap();
        (dir, network)
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[test]
    fn test_config_default() {
        let config = NetworkConfig::default();
        assert_eq!(config.listen_addr.port(), 0);
        assert!(config.listen_addr.ip().is_loopback());
        assert_eq!(config.protocol_version, 1);
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let (_dir, network) = bind_temp(NetworkConfig::default()).await;
        assert_ne!(network.local_addr().port(), 0);
        assert_eq!(network.peer_count(), 0);
        assert!(!network.is_closed());
        network.close().await;
        assert!(network.is_closed());
    }

    #[tokio::test]
    async fn test_bind_address_in_use() {
        let (_dir, first) = bind_temp(NetworkConfig::default()).await;
        let dir = TempDir::new().unwrap();
        let config = NetworkConfig::default().with_listen_addr(first.local_addr());

        let result = Network::bind(config, dir.path()).await;
        assert!(matches!(result, Err(NetworkError::Io(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_peer_to_peer_connection() {
        let (_da, a) = bind_temp(NetworkConfig::default()).await;
        let (_db, b) = bind_temp(NetworkConfig::default()).await;

        let peer = a.connect(b.local_addr()).await.unwrap();
        assert_eq!(peer, b.peer_id());
        assert_eq!(a.peer_count(), 1);
        wait_until(|| b.peer_count() == 1).await;
        assert!(b.get_peer(&a.peer_id()).unwrap().inbound);

        a.close().await;
        b.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_relay_reaches_peer() {
        let (_da, a) = bind_temp(NetworkConfig::default()).await;
        let (_db, b) = bind_temp(NetworkConfig::default()).await;
        a.connect(b.local_addr()).await.unwrap();

        assert_eq!(a.relay_block(&Block::genesis()).await, 1);
        wait_until(|| b.received_count() == 1).await;
        assert_eq!(a.relayed_count(), 1);
        assert_eq!(b.relayed_count(), 0);
    }

    #[tokio::test]
    async fn test_relay_without_peers() {
        let (_dir, network) = bind_temp(NetworkConfig::default()).await;
        let tx = Transaction::new(
            cascade_types::Address::ZERO,
            cascade_types::Address::ZERO,
            1,
            1,
            0,
        );
        assert_eq!(network.relay_transaction(&tx).await, 0);
        assert_eq!(network.relayed_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_network_id_mismatch() {
        let (_da, a) = bind_temp(NetworkConfig::default().with_network_id(1)).await;
        let (_db, b) = bind_temp(NetworkConfig::default().with_network_id(2)).await;

        let result = a.connect(b.local_addr()).await;
        assert!(matches!(result, Err(NetworkError::Protocol(_))));
        assert_eq!(a.peer_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_self_connection_rejected() {
        let (_dir, a) = bind_temp(NetworkConfig::default()).await;
        let result = a.connect(a.local_addr()).await;
        assert!(matches!(result, Err(NetworkError::Protocol(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_known_peers_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let (_db, b) = bind_temp(NetworkConfig::default()).await;

        let a = Network::bind(NetworkConfig::default(), dir.path()).await.unwrap();
        a.connect(b.local_addr()).await.unwrap();
        assert_eq!(a.known_peers().unwrap(), vec![b.local_addr()]);
        a.close().await;
        drop(a);

        let reopened = Network::bind(NetworkConfig::default(), dir.path()).await.unwrap();
        assert_eq!(reopened.known_peers().unwrap(), vec![b.local_addr()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_closed_network_refuses() {
        let (_da, a) = bind_temp(NetworkConfig::default()).await;
        let (_db, b) = bind_temp(NetworkConfig::default()).await;
        let b_addr = b.local_addr();
        b.close().await;

        assert!(a.connect(b_addr).await.is_err());
        assert!(matches!(b.connect(a.local_addr()).await, Err(NetworkError::Closed)));
    }
}
