//! # cascade-storage
//!
//! Storage layer for cascade subsystems using RocksDB.
//!
//! Each subsystem that persists anything opens its own [`Database`] in its
//! own directory; two subsystems never share a store.
//!
//! This crate provides:
//! - [`Database`]: column-family key-value store with batch writes
//! - [`ChainDb`]: typed block storage with a height index and a tip pointer

#![warn(missing_docs)]
#![warn(clippy::all)]

mod chain;
mod db;
mod error;

pub use chain::ChainDb;
pub use db::{cf, Database, DbConfig, WriteBatchWrapper, ALL_CFS};
pub use error::{StorageError, StorageResult};
