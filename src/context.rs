//! Deadline and cancellation supervision for a single call.
//!
//! Both ends of a call share one [`CallContext`]. Expiry and caller aborts
//! are observed at suspension points: message boundaries of streaming
//! handlers, fixed waits inside slow handlers, and the call future itself.

use std::{future::Future, time::Duration};

use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::ProtocolError;

/// Deadline and cancellation state of one call.
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancellation: CancellationToken,
}

impl CallContext {
    /// A context without a deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context whose deadline is `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancellation: CancellationToken::new(),
        }
    }

    /// Ties the context to `parent`: cancelling the parent cancels this call,
    /// but cancelling the call leaves the parent untouched.
    pub fn child_of(mut self, parent: &CancellationToken) -> Self {
        self.cancellation = parent.child_token();
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline, zero once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Aborts the call.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Completes once the call is aborted.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    /// Returns the terminal error if the deadline passed or the call was
    /// aborted.
    pub fn check(&self) -> Result<(), ProtocolError> {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(ProtocolError::deadline_exceeded());
            }
        }
        if self.cancellation.is_cancelled() {
            return Err(ProtocolError::cancelled());
        }
        Ok(())
    }

    /// Drives `future` until it completes, the deadline passes, or the call
    /// is aborted. In the latter two cases the future is dropped before it
    /// can make further progress.
    pub async fn run<F: Future>(&self, future: F) -> Result<F::Output, ProtocolError> {
        self.check()?;
        let expiry = async {
            match self.deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(ProtocolError::cancelled()),
            _ = expiry => Err(ProtocolError::deadline_exceeded()),
            output = future => Ok(output),
        }
    }

    /// Waits for `duration`, waking early with the terminal error.
    pub async fn sleep(&self, duration: Duration) -> Result<(), ProtocolError> {
        self.run(tokio::time::sleep(duration)).await
    }
}
