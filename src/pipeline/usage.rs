//! Usage tallies for every real remote call.

use crate::error::ProviderError;
use crate::provider::{Completion, Message, Transport};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Run-wide counters shared by every pipeline.
#[derive(Debug, Default)]
pub struct UsageCounter {
    remote_calls: AtomicU64,
    failed_calls: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub remote_calls: u64,
    pub failed_calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl UsageCounter {
    fn record_success(&self, completion: &Completion) {
        self.remote_calls.fetch_add(1, Ordering::Relaxed);
        self.input_tokens
            .fetch_add(completion.usage.input_tokens, Ordering::Relaxed);
        self.output_tokens
            .fetch_add(completion.usage.output_tokens, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.remote_calls.fetch_add(1, Ordering::Relaxed);
        self.failed_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            remote_calls: self.remote_calls.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            input_tokens: self.input_tokens.load(Ordering::Relaxed),
            output_tokens: self.output_tokens.load(Ordering::Relaxed),
        }
    }
}

/// Counts each call and its token usage, then hands the result back unchanged.
pub struct CountingTransport {
    inner: Arc<dyn Transport>,
    usage: Arc<UsageCounter>,
}

impl CountingTransport {
    pub fn new(inner: Arc<dyn Transport>, usage: Arc<UsageCounter>) -> Self {
        Self { inner, usage }
    }
}

#[async_trait]
impl Transport for CountingTransport {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn complete(&self, messages: &[Message]) -> Result<Completion, ProviderError> {
        let result = self.inner.complete(messages).await;
        match &result {
            Ok(completion) => self.usage.record_success(completion),
            Err(_) => self.usage.record_failure(),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::ScriptedTransport;

    #[tokio::test]
    async fn test_counts_successes_and_failures() {
        let scripted = Arc::new(ScriptedTransport::new(vec![
            Ok("first".to_string()),
            Err(ProviderError::EmptyContent),
            Ok("third".to_string()),
        ]));
        let usage = Arc::new(UsageCounter::default());
        let counting = CountingTransport::new(scripted, usage.clone());

        let messages = vec![Message::user("hi")];
        assert_eq!(counting.complete(&messages).await.unwrap().content, "first");
        assert!(counting.complete(&messages).await.is_err());
        assert_eq!(counting.complete(&messages).await.unwrap().content, "third");

        assert_eq!(
            usage.snapshot(),
            UsageSnapshot {
                remote_calls: 3,
                failed_calls: 1,
                input_tokens: 20,
                output_tokens: 10,
            }
        );
    }

    #[test]
    fn test_fresh_counter_is_zero() {
        assert_eq!(UsageCounter::default().snapshot(), UsageSnapshot::default());
    }
}
