//! Caller-supplied cancellation and deadlines for runtime calls.

use std::time::{Duration, Instant};

use futures::future::select_all;
use tokio_util::sync::CancellationToken;

use crate::error::HostError;

/// Cancels every context holding it, once.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(CancellationToken);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        self.0.cancelled().await;
    }

    /// A token cancelled together with this one that can also be cancelled on its own.
    pub fn child_token(&self) -> CancelToken {
        CancelToken(self.0.child_token())
    }
}

/// Context threaded through a `Call` and the batch tree it builds.
///
/// Synchronous work checks the context between steps; async work races against
/// [`CallContext::cancelled`]. Either way the call ends with `HostError::Cancelled` once any
/// attached token fires or the deadline passes.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    tokens: Vec<CancellationToken>,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context that is never cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_cancel(token: CancelToken) -> Self {
        CallContext { tokens: vec![token.0], deadline: None }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        CallContext { tokens: Vec::new(), deadline: Some(Instant::now() + timeout) }
    }

    /// Derives a context that is additionally cancelled by `token`.
    ///
    /// Only a child of `token` is attached, so nothing done through the derived context
    /// cancels `token` itself.
    pub fn child(&self, token: &CancelToken) -> Self {
        let mut ctx = self.clone();
        ctx.tokens.push(token.0.child_token());
        ctx
    }

    /// Derives a context whose deadline is the earlier of the current one and `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut ctx = self.clone();
        ctx.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        ctx
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.tokens.iter().any(CancellationToken::is_cancelled)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn check(&self) -> Result<(), HostError> {
        if self.is_cancelled() {
            return Err(HostError::Cancelled);
        }
        Ok(())
    }

    /// Resolves once any attached token is cancelled or the deadline passes.
    ///
    /// Never resolves for a background context.
    pub async fn cancelled(&self) {
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
                None => std::future::pending().await,
            }
        };
        let fired = async {
            if self.tokens.is_empty() {
                return std::future::pending().await;
            }
            select_all(self.tokens.iter().map(|token| Box::pin(token.cancelled()))).await;
        };
        tokio::select! {
            _ = expired => {}
            _ = fired => {}
        }
    }
}
