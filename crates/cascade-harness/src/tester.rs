//! Scoped per-test node fixture

use crate::composer::{compose, NodeComposition};
use crate::config::ComposeConfig;
use crate::{init_tracing, HarnessResult};
use cascade_types::Block;
use std::path::Path;
use tempfile::TempDir;
use tracing::info;

/// One composed node over its own scratch directory.
///
/// The scratch directory is removed when the tester drops. Fields drop in
/// declaration order, so the node's stores close before their files go.
pub struct NodeTester {
    name: String,
    node: NodeComposition,
    scratch: TempDir,
}

impl NodeTester {
    /// Compose a node with default settings in a fresh scratch directory
    pub async fn new(name: &str) -> HarnessResult<Self> {
        Self::with_config(name, |config| config).await
    }

    /// Compose a node, adjusting the config rooted at the scratch directory
    pub async fn with_config<F>(name: &str, configure: F) -> HarnessResult<Self>
    where
        F: FnOnce(ComposeConfig) -> ComposeConfig,
    {
        init_tracing();

        let scratch = tempfile::Builder::new()
            .prefix(&format!("cascade-{}-", name))
            .tempdir()?;
        let config = configure(ComposeConfig::new(scratch.path()));
        let node = compose(config).await?;
        info!(tester = name, root = %scratch.path().display(), "Tester ready");

        Ok(Self {
            name: name.to_string(),
            node,
            scratch,
        })
    }

    /// Name given at construction
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scratch root
    pub fn root(&self) -> &Path {
        self.scratch.path()
    }

    /// Composed node
    pub fn node(&self) -> &NodeComposition {
        &self.node
    }

    /// Composed node, for barrier waits
    pub fn node_mut(&mut self) -> &mut NodeComposition {
        &mut self.node
    }

    /// Mine one block and wait until it has propagated
    pub async fn mine_block_and_settle(&mut self) -> HarnessResult<Block> {
        let block = self.node.miner().mine_block().await?;
        self.node.await_consensus_propagation().await;
        Ok(block)
    }

    /// Close every subsystem, then release the scratch directory
    pub async fn shutdown(self) {
        self.node.shutdown().await;
        info!(tester = %self.name, "Tester shut down");
    }
}
