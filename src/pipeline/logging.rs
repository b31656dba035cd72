use crate::error::ProviderError;
use crate::provider::{Completion, Message, Transport};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Logs the duration and outcome of every raw call.
pub struct LoggingTransport {
    inner: Arc<dyn Transport>,
}

impl LoggingTransport {
    pub fn new(inner: Arc<dyn Transport>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Transport for LoggingTransport {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn complete(&self, messages: &[Message]) -> Result<Completion, ProviderError> {
        let start = Instant::now();
        let result = self.inner.complete(messages).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(completion) => debug!(
                "{} call finished in {:.2}s ({} in / {} out tokens)",
                self.inner.name(),
                elapsed.as_secs_f64(),
                completion.usage.input_tokens,
                completion.usage.output_tokens
            ),
            Err(e) => warn!(
                "{} call failed after {:.2}s: {}",
                self.inner.name(),
                elapsed.as_secs_f64(),
                e
            ),
        }

        result
    }
}
