//! # cascade-explorer
//!
//! Read model over the consensus set: chain status plus block, transaction
//! and address indexes. The explorer only observes consensus and is never
//! an input to another subsystem.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod explorer;

pub use error::{ExplorerError, ExplorerResult};
pub use explorer::{Explorer, ExplorerStatus};
