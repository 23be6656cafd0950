//! Raft consensus for the placement metadata plane.
//!
//! A single task ([`Raft`]) owns all consensus state. Peers and local clients
//! talk to it through a [`RaftNode`] handle; outgoing RPCs go through the
//! [`crate::Transport`] abstraction.

mod election;
mod event;
mod node;
mod raft_core;
mod replication;
mod rpc;
mod state_machine;
mod types;

pub use election::*;
pub(crate) use event::*;
pub use node::*;
pub use raft_core::*;
pub use replication::*;
pub use rpc::*;
pub use state_machine::*;
pub use types::*;

#[cfg(test)]
mod election_test;
