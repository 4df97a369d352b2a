//! Retrying invoker for model round-trips
//!
//! A model call is retried only when its fault is classified as transient. The
//! classification rule and the wait between attempts are both strategies, so
//! tests can count waits without sleeping and the matching rule can change
//! without touching the loop.

use crate::error::{DbdexError, Result};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Default number of attempts, including the first
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default fixed wait between attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// How a fault should be treated by the invoker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    /// Expected to succeed on retry without client-side changes
    Transient,
    /// Propagate immediately
    Fatal,
}

/// Classification strategy for faults
pub trait FaultClassifier: Send + Sync {
    fn classify(&self, error: &DbdexError) -> FaultClass;
}

/// Provider overload detection by message text
///
/// Transient when the error text carries both a `503` status marker and the
/// word "overloaded" (any case).
#[derive(Debug, Clone, Copy, Default)]
pub struct OverloadClassifier;

impl FaultClassifier for OverloadClassifier {
    fn classify(&self, error: &DbdexError) -> FaultClass {
        let message = error.to_string();
        if message.contains("503") && message.to_lowercase().contains("overloaded") {
            FaultClass::Transient
        } else {
            FaultClass::Fatal
        }
    }
}

/// Wait strategy between attempts
#[async_trait]
pub trait Backoff: Send + Sync {
    async fn wait(&self, delay: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioBackoff;

#[async_trait]
impl Backoff for TokioBackoff {
    async fn wait(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Runs a fallible async operation with bounded retries on transient faults
pub struct RetryingInvoker {
    max_attempts: u32,
    delay: Duration,
    classifier: Box<dyn FaultClassifier>,
    backoff: Box<dyn Backoff>,
}

impl Default for RetryingInvoker {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
            classifier: Box::new(OverloadClassifier),
            backoff: Box::new(TokioBackoff),
        }
    }
}

impl RetryingInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the total number of attempts (at least one)
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_classifier(mut self, classifier: impl FaultClassifier + 'static) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    pub fn with_backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        self.backoff = Box::new(backoff);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Invoke `operation`, retrying while it fails with a transient fault
    ///
    /// Fatal faults propagate on first occurrence. When the attempts run out the
    /// last transient fault propagates unchanged.
    pub async fn invoke<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let class = self.classifier.classify(&err);
                    if class == FaultClass::Fatal || attempt >= self.max_attempts {
                        return Err(err);
                    }
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "transient model fault, retrying"
                    );
                    self.backoff.wait(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct CountingBackoff(Arc<AtomicU32>);

    #[async_trait]
    impl Backoff for CountingBackoff {
        async fn wait(&self, _delay: Duration) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn overloaded() -> DbdexError {
        DbdexError::LLMApiError {
            provider: "Gemini".to_string(),
            message: r#"{"error":{"code":503,"message":"The model is overloaded."}}"#.to_string(),
            status: 503,
        }
    }

    #[test]
    fn test_overload_classifier() {
        let classifier = OverloadClassifier;
        assert_eq!(classifier.classify(&overloaded()), FaultClass::Transient);

        let unavailable = DbdexError::LLMApiError {
            provider: "OpenAI".to_string(),
            message: "Service Unavailable".to_string(),
            status: 503,
        };
        assert_eq!(classifier.classify(&unavailable), FaultClass::Fatal);
        assert_eq!(
            classifier.classify(&DbdexError::Agent("Overloaded".to_string())),
            FaultClass::Fatal
        );
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let backoff = CountingBackoff::default();
        let invoker = RetryingInvoker::new().with_backoff(backoff.clone());
        let calls = &AtomicU32::new(0);

        let value = invoker
            .invoke(|| async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(overloaded())
                } else {
                    Ok("done")
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(backoff.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fatal_fault_propagates_immediately() {
        let backoff = CountingBackoff::default();
        let invoker = RetryingInvoker::new().with_backoff(backoff.clone());
        let calls = &AtomicU32::new(0);

        let err = invoker
            .invoke(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(DbdexError::execution("no such table: users"))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DbdexError::Execution { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(backoff.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_return_last_fault() {
        let backoff = CountingBackoff::default();
        let invoker = RetryingInvoker::new().with_backoff(backoff.clone());
        let calls = &AtomicU32::new(0);

        let err = invoker
            .invoke(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(overloaded())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DbdexError::LLMApiError { status: 503, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), DEFAULT_MAX_ATTEMPTS);
        assert_eq!(backoff.0.load(Ordering::SeqCst), 2);
    }
}
