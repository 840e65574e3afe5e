//! Caller-supplied cancellation and deadlines.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, Result};

/// Cancellation scope for one logical call.
///
/// Both the transport call and every backoff wait run under the context; if
/// the token fires or the deadline passes, the pending operation is abandoned
/// and the matching error is returned immediately.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    token: Option<CancellationToken>,
    deadline: Option<(Instant, Duration)>,
}

impl RequestContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Cancel the call when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Give up once `timeout` has elapsed from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        self.with_deadline_inner(deadline, timeout)
    }

    /// Give up at `deadline`.
    pub fn with_deadline(self, deadline: Instant) -> Self {
        let budget = deadline.saturating_duration_since(Instant::now());
        self.with_deadline_inner(deadline, budget)
    }

    fn with_deadline_inner(mut self, deadline: Instant, budget: Duration) -> Self {
        // Keep the earlier deadline if one was already set.
        match self.deadline {
            Some((existing, _)) if existing <= deadline => {}
            _ => self.deadline = Some((deadline, budget)),
        }
        self
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline.map(|(at, _)| at)
    }

    /// Return the cancellation error if the context is already done.
    pub fn check(&self) -> Result<()> {
        if let Some(token) = &self.token
            && token.is_cancelled()
        {
            return Err(ClientError::Cancelled);
        }
        if let Some((at, budget)) = self.deadline
            && Instant::now() >= at
        {
            return Err(ClientError::DeadlineExceeded(budget));
        }
        Ok(())
    }

    /// Run `future` to completion unless the context finishes first.
    pub async fn run<F: Future>(&self, future: F) -> Result<F::Output> {
        self.check()?;

        let cancelled = async {
            match &self.token {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some((at, _)) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Err(ClientError::Cancelled),
            _ = expired => Err(self.deadline_error()),
            output = future => Ok(output),
        }
    }

    /// Sleep for `delay` unless the context finishes first.
    pub async fn sleep(&self, delay: Duration) -> Result<()> {
        self.run(tokio::time::sleep(delay)).await
    }

    fn deadline_error(&self) -> ClientError {
        let budget = self.deadline.map(|(_, budget)| budget).unwrap_or_default();
        ClientError::DeadlineExceeded(budget)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_background_sleep_completes() {
        let cx = RequestContext::background();
        let start = Instant::now();

        cx.sleep(Duration::from_secs(3)).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_sleep() {
        let token = CancellationToken::new();
        let cx = RequestContext::background().with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        });

        let start = Instant::now();
        let err = cx.sleep(Duration::from_secs(60)).await.unwrap_err();
        assert!(matches!(err, ClientError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(1));
        canceller.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_interrupts_sleep() {
        let cx = RequestContext::background().with_timeout(Duration::from_secs(2));

        let err = cx.sleep(Duration::from_secs(60)).await.unwrap_err();
        assert!(matches!(err, ClientError::DeadlineExceeded(d) if d == Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn test_already_cancelled_context_fails_fast() {
        let token = CancellationToken::new();
        token.cancel();
        let cx = RequestContext::background().with_cancellation(token);

        assert!(cx.check().is_err());
        let err = cx.run(async { 42 }).await.unwrap_err();
        assert!(err.is_cancellation());
    }

    #[tokio::test(start_paused = true)]
    async fn test_earlier_deadline_wins() {
        let cx = RequestContext::background()
            .with_timeout(Duration::from_secs(5))
            .with_timeout(Duration::from_secs(10));

        assert_eq!(cx.deadline(), Some(Instant::now() + Duration::from_secs(5)));
    }
}
