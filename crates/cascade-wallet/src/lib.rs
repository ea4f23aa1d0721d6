//! # cascade-wallet
//!
//! Wallet subsystem: a set of addresses, their confirmed balance from the
//! chain and their unconfirmed flows from the transaction pool.
//!
//! The wallet re-indexes whenever the transaction pool announces a change.
//! Because the pool reacts to every consensus change, a new block always
//! reaches the wallet through the pool.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod wallet;

pub use error::{WalletError, WalletResult};
pub use wallet::{Unconfirmed, Wallet};
