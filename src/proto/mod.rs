//! Protobuf messages of the journal engine protocol and the persisted
//! record format.
//!
//! The message types are written out in the shape `prost-build` emits so the
//! crate builds without `protoc`.

pub mod journal_engine;
pub mod journal_record;

mod exts;
