//! Request-scoped deadline and cancellation for store round-trips.

use crate::errors::StorageError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Deadline and cancellation signal carried by one external call.
///
/// Every store call made on behalf of the request goes through [`RequestContext::run`].
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
    cancellation: CancellationToken,
}

impl RequestContext {
    /// Context with no deadline that is never cancelled
    pub fn background() -> Self {
        Self::default()
    }

    /// Context whose deadline is `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            cancellation: CancellationToken::new(),
        }
    }

    /// Replace the cancellation token, e.g. with one owned by a server shutdown signal
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Derive a context that shares the deadline and is cancelled with this one
    pub fn child(&self) -> Self {
        Self {
            deadline: self.deadline,
            cancellation: self.cancellation.child_token(),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Run one store call under this context.
    ///
    /// The call is never started once the context is cancelled. A call that loses the
    /// race against cancellation or the deadline is dropped.
    pub async fn run<F, T>(&self, call: F) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        if self.cancellation.is_cancelled() {
            return Err(StorageError::Cancelled);
        }

        let bounded = async {
            match self.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, call)
                    .await
                    .unwrap_or(Err(StorageError::DeadlineExceeded)),
                None => call.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(StorageError::Cancelled),
            result = bounded => result,
        }
    }
}
