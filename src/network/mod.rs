//! This module is the network abstraction layer of the placement Raft plane
//! with a timeout-aware TCP implementation.
//!
//! Raft RPCs travel as bincode payloads in length-delimited frames. All
//! calls are bounded by the timeout the caller passes in; retries follow a
//! [`BackoffPolicy`].

mod codec;
mod rpc_server;
mod tcp_transport;

pub use codec::*;
pub use rpc_server::*;
pub use tcp_transport::*;


// Trait definition of the current module
// -----------------------------------------------------------------------------
// Core model in Raft: Transport Definition
//

#[cfg(test)]
use mockall::automock;

use crate::raft::RaftRequest;
use crate::raft::RaftResponse;
use crate::BackoffPolicy;
use crate::Error;
use crate::NetworkError;
use crate::Result;
use crate::SystemError;

#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends one Raft RPC to `target` at `address` and waits for its answer.
    ///
    /// # Errors
    /// - [`NetworkError::Timeout`] when no answer arrives within `timeout`
    /// - [`NetworkError::ConnectError`] when the peer can not be reached
    async fn send(
        &self,
        target: u64,
        address: String,
        request: RaftRequest,
        timeout: Duration,
    ) -> Result<RaftResponse>;
}

/// Serves Raft RPCs received by the listener.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait RaftRpcHandler: Send + Sync + 'static {
    async fn handle(
        &self,
        request: RaftRequest,
    ) -> RaftResponse;
}

// Module level utils
// -----------------------------------------------------------------------------
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tokio::time::timeout;
use tracing::debug;
use tracing::warn;

/// Network faults worth another attempt; everything else is returned as is.
pub(crate) fn is_retryable(e: &Error) -> bool {
    matches!(
        e,
        Error::System(SystemError::Network(
            NetworkError::Timeout { .. }
                | NetworkError::ConnectError { .. }
                | NetworkError::ConnectionClosed(_)
                | NetworkError::RetryTimeoutError(_)
                | NetworkError::Io(_)
        ))
    )
}

/// As soon as task has return we should return from this function
pub(crate) async fn task_with_timeout_and_exponential_backoff<F, T, U>(
    mut task: F,
    policy: BackoffPolicy,
) -> Result<U>
where
    F: FnMut() -> T,
    T: Future<Output = Result<U>>,
{
    let mut retries = 0;
    let mut current_delay = Duration::from_millis(policy.base_delay_ms);
    let timeout_duration = Duration::from_millis(policy.timeout_ms);
    let max_delay = Duration::from_millis(policy.max_delay_ms);
    let max_retries = policy.max_retries.max(1);

    let mut last_error: Error = NetworkError::TaskBackoffFailed("Task failed after max retries".to_string()).into();
    while retries < max_retries {
        debug!("Attempt {} of {}", retries + 1, max_retries);
        match timeout(timeout_duration, task()).await {
            Ok(Ok(r)) => {
                return Ok(r);
            }
            Ok(Err(e)) if is_retryable(&e) => {
                warn!("retryable task error: {}", e);
                last_error = e;
            }
            Ok(Err(e)) => {
                return Err(e);
            }
            Err(_) => {
                warn!("Task timed out after {:?}", timeout_duration);
                last_error = NetworkError::RetryTimeoutError(timeout_duration).into();
            }
        };

        if retries < max_retries - 1 {
            debug!("Retrying in {:?}...", current_delay);
            sleep(current_delay).await;

            current_delay = (current_delay * 2).min(max_delay);
        }
        retries += 1;
    }
    warn!("Task failed after {} retries", max_retries);
    Err(last_error)
}
