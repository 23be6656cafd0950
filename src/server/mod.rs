//! Journal engine protocol server: frame codec, request handler and the TCP
//! accept loop.

mod codec;
mod handler;
mod tcp_server;

pub use codec::*;
pub use handler::*;
pub use tcp_server::*;

#[cfg(test)]
mod handler_test;
