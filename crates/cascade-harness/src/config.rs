//! Composition configuration

use crate::{HarnessError, HarnessResult};
use cascade_miner::MinerConfig;
use cascade_network::NetworkConfig;
use cascade_txpool::PoolConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Network peer store, under the scratch root
pub const NETWORK_DIR: &str = "network";
/// Chain store, under the scratch root
pub const CONSENSUS_DIR: &str = "consensus";
/// Wallet address store, under the scratch root
pub const WALLET_DIR: &str = "wallet";

/// Configuration for one node composition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeConfig {
    /// Scratch root; each subsystem with storage gets a subdirectory
    pub root: PathBuf,
    /// Network listen address; port 0 picks a free port
    pub listen_addr: SocketAddr,
    /// Maximum network peers
    pub max_peers: usize,
    /// Network ID used in handshakes
    pub network_id: u64,
    /// Transaction pool limits
    pub pool: PoolConfig,
    /// Miner settings
    pub miner: MinerConfig,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        let network = NetworkConfig::default();
        Self {
            root: PathBuf::from("./cascade-data"),
            listen_addr: network.listen_addr,
            max_peers: network.max_peers,
            network_id: network.network_id,
            pool: PoolConfig::default(),
            miner: MinerConfig::default(),
        }
    }
}

impl ComposeConfig {
    /// Creates a config rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Sets the listen address.
    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = addr;
        self
    }

    /// Sets the maximum peer count.
    pub fn with_max_peers(mut self, max_peers: usize) -> Self {
        self.max_peers = max_peers;
        self
    }

    /// Sets the network ID.
    pub fn with_network_id(mut self, network_id: u64) -> Self {
        self.network_id = network_id;
        self
    }

    /// Sets the pool config.
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Sets the miner config.
    pub fn with_miner(mut self, miner: MinerConfig) -> Self {
        self.miner = miner;
        self
    }

    /// Network settings derived from this config
    pub fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            listen_addr: self.listen_addr,
            max_peers: self.max_peers,
            network_id: self.network_id,
            ..Default::default()
        }
    }

    /// Network store directory
    pub fn network_dir(&self) -> PathBuf {
        self.root.join(NETWORK_DIR)
    }

    /// Consensus store directory
    pub fn consensus_dir(&self) -> PathBuf {
        self.root.join(CONSENSUS_DIR)
    }

    /// Wallet store directory
    pub fn wallet_dir(&self) -> PathBuf {
        self.root.join(WALLET_DIR)
    }

    /// Loads config from a TOML file.
    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| HarnessError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Saves config to a TOML file.
    pub fn to_file(&self, path: &Path) -> HarnessResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| HarnessError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_ephemeral_loopback() {
        let config = ComposeConfig::default();
        assert_eq!(config.listen_addr.port(), 0);
        assert!(config.listen_addr.ip().is_loopback());
    }

    #[test]
    fn test_subdirectories_do_not_overlap() {
        let config = ComposeConfig::new("/tmp/case-a");
        let dirs = [
            config.network_dir(),
            config.consensus_dir(),
            config.wallet_dir(),
        ];
        for dir in &dirs {
            assert!(dir.starts_with("/tmp/case-a"));
        }
        assert_ne!(dirs[0], dirs[1]);
        assert_ne!(dirs[1], dirs[2]);
        assert_ne!(dirs[0], dirs[2]);
    }

    #[test]
    fn test_builders() {
        let addr: SocketAddr = "127.0.0.1:4100".parse().unwrap();
        let config = ComposeConfig::new("/tmp/x")
            .with_listen_addr(addr)
            .with_max_peers(3)
            .with_network_id(9)
            .with_pool(PoolConfig {
                max_size: 10,
                min_fee: 1,
            })
            .with_miner(MinerConfig {
                block_reward: 7,
                max_block_transactions: 5,
            });

        let network = config.network_config();
        assert_eq!(network.listen_addr, addr);
        assert_eq!(network.max_peers, 3);
        assert_eq!(network.network_id, 9);
        assert_eq!(config.pool.max_size, 10);
        assert_eq!(config.miner.block_reward, 7);
    }

    #[test]
    fn test_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compose.toml");
        let config = ComposeConfig::new(dir.path().join("root")).with_network_id(42);

        config.to_file(&path).unwrap();
        let loaded = ComposeConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compose.toml");
        std::fs::write(&path, "root = \"/tmp/partial\"\n\n[miner]\nblock_reward = 5\n").unwrap();

        let loaded = ComposeConfig::from_file(&path).unwrap();
        assert_eq!(loaded.root, PathBuf::from("/tmp/partial"));
        assert_eq!(loaded.miner.block_reward, 5);
        assert_eq!(loaded.miner.max_block_transactions, 1000);
        assert_eq!(loaded.pool, PoolConfig::default());
    }

    #[test]
    fn test_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compose.toml");
        std::fs::write(&path, "root = [").unwrap();
        assert!(matches!(
            ComposeConfig::from_file(&path),
            Err(HarnessError::Config(_))
        ));
    }
}
