//! Shard lifecycle and routing: maps `(namespace, shard_name)` to its segment
//! chain, keeping cluster-wide fields in the placement center and offsets in
//! the local segment store.

mod manager;

pub use manager::*;
