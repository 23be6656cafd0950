//! Journal engine: shard-and-segment structured log storage fronted by a
//! Raft-replicated placement metadata plane.

mod config;
mod errors;
mod metrics;
mod network;
mod node;
pub mod placement;
pub mod proto;
pub mod raft;
pub mod segment;
mod server;
mod shard;
mod storage;
mod tracker;
pub mod utils;

pub use config::*;
pub use errors::*;
pub use metrics::*;
pub use network::*;
pub use node::*;
pub use server::*;
pub use shard::*;
pub use storage::*;
pub use tracker::*;
pub use utils::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
