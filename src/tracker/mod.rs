//! Idempotent-producer deduplication and consumer group offsets, both kept
//! in the placement center.

mod offset_tracker;

pub use offset_tracker::*;

#[cfg(test)]
mod offset_tracker_test;
