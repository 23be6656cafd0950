//! Placement center: the cluster metadata replicated by the Raft plane.
//!
//! [`PlacementStateMachine`] holds nodes, resource configs, schemas,
//! idempotency records, consumer offsets and shard/segment metadata.
//! Everything else reaches it through the [`MetadataClient`] seam.

mod client;
mod commands;
mod heartbeat;
mod state_machine;

pub use client::*;
pub use commands::*;
pub use heartbeat::*;
pub use state_machine::*;

#[cfg(test)]
mod heartbeat_test;
#[cfg(test)]
mod state_machine_test;
