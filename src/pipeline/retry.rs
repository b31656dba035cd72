use super::{Answer, Answers, EvalRequest, Evaluate};
use crate::config::RetryConfig;
use crate::error::CallError;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Execute an async operation with a fixed delay between attempts.
///
/// The operation sees the previous attempt's error, if any.
pub async fn retry_with_delay<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut(Option<&E>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let delay = Duration::from_millis(config.delay_ms);
    let mut attempts = 0;
    let mut last_error: Option<E> = None;

    loop {
        attempts += 1;

        match operation(last_error.as_ref()).await {
            Ok(result) => return Ok(result),
            Err(e) if attempts >= config.max_attempts => {
                warn!("All {} attempts failed: {}", attempts, e);
                return Err(e);
            }
            Err(e) => {
                warn!(
                    "Attempt {} failed: {}. Retrying in {:?}...",
                    attempts, e, delay
                );
                last_error = Some(e);
                sleep(delay).await;
            }
        }
    }
}

/// Retries transport, decode and validation failures alike
pub struct Retrying<E> {
    inner: E,
    policy: RetryConfig,
}

impl<E> Retrying<E> {
    pub fn new(inner: E, policy: RetryConfig) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<A, E> Evaluate<A> for Retrying<E>
where
    A: Answer,
    E: Evaluate<A>,
{
    async fn evaluate(&self, request: &EvalRequest) -> Result<Answers<A>, CallError> {
        let inner = &self.inner;

        retry_with_delay(&self.policy, |last: Option<&CallError>| {
            let attempt = request.after_failure(last);
            async move { inner.evaluate(&attempt).await }
        })
        .await
        .map_err(|last| CallError::RetriesExhausted {
            attempts: self.policy.max_attempts.max(1),
            last: Box::new(last),
        })
    }
}
