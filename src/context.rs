//! Cancellation contexts.
//!
//! Every blocking operation on a [`Client`](crate::Client) races against a
//! [`Context`]: explicit cancellation through a
//! [`CancellationToken`](tokio_util::sync::CancellationToken), an optional
//! deadline, or both.
//!
//! ```ignore
//! use std::time::Duration;
//! use libpi::Context;
//!
//! let ctx = Context::with_timeout(Duration::from_secs(30));
//! let state = client.get_state(&ctx).await?;
//!
//! // Cancel from another task.
//! let ctx = Context::new();
//! let canceller = ctx.clone();
//! tokio::spawn(async move { canceller.cancel() });
//! ```

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::Error;

/// A cancellation signal with an optional deadline.
///
/// Clones share the same cancellation state.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Deadline>,
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    timeout: Duration,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that expires after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().timeout(timeout)
    }

    /// Wrap an existing cancellation token.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Derive a child context that also expires after `timeout`.
    ///
    /// Cancelling the parent cancels the child; the earlier deadline wins.
    pub fn timeout(&self, timeout: Duration) -> Self {
        let candidate = Deadline {
            at: Instant::now() + timeout,
            timeout,
        };
        let deadline = match self.deadline {
            Some(existing) if existing.at <= candidate.at => existing,
            _ => candidate,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Apply `timeout` only if this context has no deadline yet.
    pub(crate) fn or_timeout(&self, timeout: Duration) -> Self {
        if self.deadline.is_some() {
            self.clone()
        } else {
            Self {
                token: self.token.clone(),
                deadline: Some(Deadline {
                    at: Instant::now() + timeout,
                    timeout,
                }),
            }
        }
    }

    /// Cancel this context and every child derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The underlying cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The instant this context expires, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline.map(|d| d.at)
    }

    /// The error this context currently reports, if it is done.
    pub fn err(&self) -> Option<Error> {
        if self.token.is_cancelled() {
            return Some(Error::Cancelled);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d.at => Some(Error::Timeout(d.timeout)),
            _ => None,
        }
    }

    /// Wait until the context is cancelled or its deadline passes.
    pub async fn done(&self) -> Error {
        match self.deadline {
            Some(d) => tokio::select! {
                _ = self.token.cancelled() => Error::Cancelled,
                _ = tokio::time::sleep_until(d.at) => Error::Timeout(d.timeout),
            },
            None => {
                self.token.cancelled().await;
                Error::Cancelled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Context>();
    }

    #[tokio::test]
    async fn cancel_resolves_done() {
        let ctx = Context::new();
        assert!(ctx.err().is_none());
        ctx.cancel();
        assert!(matches!(ctx.done().await, Error::Cancelled));
        assert!(matches!(ctx.err(), Some(Error::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_resolves_done_with_timeout() {
        let ctx = Context::with_timeout(Duration::from_millis(50));
        let err = ctx.done().await;
        assert!(matches!(err, Error::Timeout(d) if d == Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn parent_cancel_reaches_child() {
        let parent = Context::new();
        let child = parent.timeout(Duration::from_secs(60));
        parent.cancel();
        assert!(matches!(child.done().await, Error::Cancelled));
    }

    #[test]
    fn earlier_deadline_wins() {
        let tight = Context::with_timeout(Duration::from_millis(10));
        let child = tight.timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), tight.deadline());
    }

    #[test]
    fn or_timeout_keeps_existing_deadline() {
        let ctx = Context::with_timeout(Duration::from_secs(1));
        assert_eq!(ctx.or_timeout(Duration::from_secs(120)).deadline(), ctx.deadline());
        assert!(Context::new().or_timeout(Duration::from_secs(1)).deadline().is_some());
    }
}
