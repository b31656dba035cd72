//! Resilient call pipeline around one LLM evaluation.
//!
//! A call travels through an ordered chain of links, outer to inner:
//!
//! ```text
//! Cached -> Limited -> Retrying -> ModelCall -> LoggingTransport -> CountingTransport -> Transport
//! ```
//!
//! Cache hits return before the limiter, so they never hold a concurrency permit
//! and are never retried. Decode and validation failures surface from `ModelCall`
//! as ordinary `CallError`s and are retried like transport failures.

mod cache;
mod call;
mod decode;
mod limit;
mod logging;
mod prompt;
mod retry;
mod usage;

pub use cache::{fingerprint, CacheStats, Cached, ResponseCache};
pub use call::ModelCall;
pub use limit::Limited;
pub use logging::LoggingTransport;
pub use retry::{retry_with_delay, Retrying};
pub use usage::{CountingTransport, UsageCounter, UsageSnapshot};

use crate::config::RetryConfig;
use crate::error::CallError;
use crate::provider::Transport;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// `key -> question` pairs evaluated together in one call
pub type Checklist = BTreeMap<String, String>;

/// Leaf answer type of a checklist call.
pub trait Answer:
    Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static
{
    /// Stable name of the answer kind; part of every fingerprint
    const KIND: &'static str;

    /// Heading for the list of items in the prompt
    const ITEM_LABEL: &'static str;

    /// Task description preceding the items
    const INSTRUCTIONS: &'static str;
}

impl Answer for bool {
    const KIND: &'static str = "boolean";
    const ITEM_LABEL: &'static str = "Checklist";
    const INSTRUCTIONS: &'static str = "You are an expert candidate reviewer. Read the resume carefully and evaluate every checklist item.

For each checklist entry, produce:
- \"reasoning\": the full reasoning that leads to your answer
- \"answer\": true or false

Return a single JSON object whose keys are exactly the checklist keys.";
}

impl Answer for String {
    const KIND: &'static str = "text";
    const ITEM_LABEL: &'static str = "Questions";
    const INSTRUCTIONS: &'static str = "You are an expert candidate reviewer. Read the resume carefully and answer every question.

For each question entry, produce:
- \"reasoning\": the full reasoning that leads to your answer
- \"answer\": a string answer to the question, as concise as possible unless the question says otherwise

Return a single JSON object whose keys are exactly the question keys. Do not add extra keys and answer every question.";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemAnswer<A> {
    #[serde(default)]
    pub reasoning: String,
    pub answer: A,
}

/// Decoded response: one answer per requested key
pub type Answers<A> = BTreeMap<String, ItemAnswer<A>>;

/// A rejected response shown back to the model on the next attempt
#[derive(Debug, Clone, PartialEq)]
pub struct Feedback {
    pub raw: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct EvalRequest {
    pub checklist: Arc<Checklist>,
    pub document: Arc<str>,
    /// Distinguishes repeated samples of the same checklist and document
    pub repeat: Option<u32>,
    pub feedback: Option<Feedback>,
}

impl EvalRequest {
    pub fn new(checklist: Arc<Checklist>, document: Arc<str>, repeat: Option<u32>) -> Self {
        Self {
            checklist,
            document,
            repeat,
            feedback: None,
        }
    }

    /// The same request, carrying feedback about a previous malformed response
    pub fn after_failure(&self, last: Option<&CallError>) -> Self {
        let mut next = self.clone();
        next.feedback = last
            .and_then(CallError::malformed_response)
            .map(|(raw, reason)| Feedback {
                raw: raw.to_string(),
                reason,
            });
        next
    }
}

/// One link of the pipeline. Every link keeps this contract.
#[async_trait]
pub trait Evaluate<A: Answer>: Send + Sync {
    async fn evaluate(&self, request: &EvalRequest) -> Result<Answers<A>, CallError>;
}

/// Holds the run-wide shared state and assembles pipelines in a fixed order
pub struct PipelineBuilder {
    transport: Arc<dyn Transport>,
    limiter: Arc<Semaphore>,
    cache: Option<Arc<ResponseCache>>,
    usage: Arc<UsageCounter>,
    retry: RetryConfig,
    model_id: String,
}

impl PipelineBuilder {
    pub fn new(
        transport: Arc<dyn Transport>,
        concurrency: usize,
        retry: RetryConfig,
        model_id: impl Into<String>,
    ) -> Self {
        let usage = Arc::new(UsageCounter::default());
        let counted: Arc<dyn Transport> = Arc::new(CountingTransport::new(transport, usage.clone()));
        let logged: Arc<dyn Transport> = Arc::new(LoggingTransport::new(counted));

        Self {
            transport: logged,
            limiter: Arc::new(Semaphore::new(concurrency)),
            cache: None,
            usage,
            retry,
            model_id: model_id.into(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build<A: Answer>(&self) -> Arc<dyn Evaluate<A>> {
        let call = ModelCall::<A>::new(self.transport.clone());
        let retrying = Retrying::new(call, self.retry.clone());
        let limited = Limited::new(retrying, self.limiter.clone());

        match &self.cache {
            Some(cache) => Arc::new(Cached::new(limited, cache.clone(), self.model_id.clone())),
            None => Arc::new(limited),
        }
    }

    pub fn usage(&self) -> UsageSnapshot {
        self.usage.snapshot()
    }

    pub fn cache(&self) -> Option<&Arc<ResponseCache>> {
        self.cache.as_ref()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::ProviderError;
    use crate::provider::{Completion, Message, TokenUsage};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Transport that replays canned replies and records every conversation
    pub struct ScriptedTransport {
        replies: Mutex<VecDeque<Result<String, ProviderError>>>,
        fallback: Option<String>,
        pub calls: AtomicUsize,
        pub conversations: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedTransport {
        pub fn new(replies: Vec<Result<String, ProviderError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                fallback: None,
                calls: AtomicUsize::new(0),
                conversations: Mutex::new(Vec::new()),
            }
        }

        /// Always answer with the same reply
        pub fn repeating(reply: &str) -> Self {
            Self {
                fallback: Some(reply.to_string()),
                ..Self::new(Vec::new())
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn complete(&self, messages: &[Message]) -> Result<Completion, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.conversations.lock().unwrap().push(messages.to_vec());
            let next = self.replies.lock().unwrap().pop_front();
            let content = match next {
                Some(reply) => reply?,
                None => self.fallback.clone().ok_or(ProviderError::EmptyContent)?,
            };
            Ok(Completion {
                content,
                usage: TokenUsage {
                    input_tokens: 10,
                    output_tokens: 5,
                },
            })
        }
    }

    pub fn checklist(keys: &[&str]) -> Arc<Checklist> {
        Arc::new(
            keys.iter()
                .map(|k| (k.to_string(), format!("Question {}?", k)))
                .collect(),
        )
    }

    pub fn bool_reply(pairs: &[(&str, bool)]) -> String {
        let map: serde_json::Map<String, serde_json::Value> = pairs
            .iter()
            .map(|(k, v)| {
                (
                    k.to_string(),
                    serde_json::json!({"reasoning": "because", "answer": v}),
                )
            })
            .collect();
        serde_json::Value::Object(map).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use tempfile::TempDir;

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            delay_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_built_pipeline_caches_across_builds() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(ResponseCache::open(dir.path().join("cache.jsonl")).unwrap());
        let transport = Arc::new(ScriptedTransport::repeating(&bool_reply(&[("rust", true)])));

        let builder = PipelineBuilder::new(transport.clone(), 2, fast_retry(3), "gpt@0")
            .with_cache(cache.clone());
        let request = EvalRequest::new(checklist(&["rust"]), Arc::from("cv"), Some(0));

        let first = builder.build::<bool>().evaluate(&request).await.unwrap();
        let second = builder.build::<bool>().evaluate(&request).await.unwrap();

        assert_eq!(first, second);
        assert!(first["rust"].answer);
        assert_eq!(transport.call_count(), 1);
        assert_eq!(builder.usage().remote_calls, 1);
        assert_eq!(builder.usage().input_tokens, 10);
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_distinct_repeats_are_distinct_calls() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(ResponseCache::open(dir.path().join("cache.jsonl")).unwrap());
        let transport = Arc::new(ScriptedTransport::repeating(&bool_reply(&[("rust", true)])));
        let pipeline = PipelineBuilder::new(transport.clone(), 2, fast_retry(3), "gpt@0")
            .with_cache(cache)
            .build::<bool>();

        let docs: Arc<str> = Arc::from("cv");
        for repeat in 0..3 {
            let request = EvalRequest::new(checklist(&["rust"]), docs.clone(), Some(repeat));
            pipeline.evaluate(&request).await.unwrap();
        }

        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn test_validation_failure_is_retried_with_feedback() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(bool_reply(&[("rust", true)])),
            Ok(bool_reply(&[("rust", true), ("go", false)])),
        ]));
        let pipeline =
            PipelineBuilder::new(transport.clone(), 1, fast_retry(3), "gpt@0").build::<bool>();

        let request = EvalRequest::new(checklist(&["rust", "go"]), Arc::from("cv"), None);
        let answers = pipeline.evaluate(&request).await.unwrap();

        assert!(!answers["go"].answer);
        assert_eq!(transport.call_count(), 2);

        let conversations = transport.conversations.lock().unwrap();
        assert_eq!(conversations[0].len(), 1);
        assert_eq!(conversations[1].len(), 3);
        assert!(conversations[1][2].content.contains("go"));
    }

    #[tokio::test]
    async fn test_text_pipeline_decodes_strings() {
        let transport = Arc::new(ScriptedTransport::repeating(
            r#"{"years": {"reasoning": "listed", "answer": "7"}}"#,
        ));
        let pipeline =
            PipelineBuilder::new(transport, 1, fast_retry(1), "gpt@0").build::<String>();

        let request = EvalRequest::new(checklist(&["years"]), Arc::from("cv"), None);
        let answers = pipeline.evaluate(&request).await.unwrap();
        assert_eq!(answers["years"].answer, "7");
        assert_eq!(answers["years"].reasoning, "listed");
    }
}
