//! Shared fixtures for unit tests: logging, an in-process Raft network and a
//! metadata client backed directly by the placement state machine.
mod common;
mod local_metadata;
mod mem_transport;

pub use common::*;
pub use local_metadata::*;
pub use mem_transport::*;
