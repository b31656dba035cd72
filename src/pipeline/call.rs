use super::decode::decode_answers;
use super::prompt::build_messages;
use super::{Answer, Answers, EvalRequest, Evaluate};
use crate::error::CallError;
use crate::provider::Transport;
use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;

/// Innermost link: render the prompt, call the transport, decode and validate.
pub struct ModelCall<A> {
    transport: Arc<dyn Transport>,
    _answer: PhantomData<fn() -> A>,
}

impl<A> ModelCall<A> {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            _answer: PhantomData,
        }
    }
}

#[async_trait]
impl<A: Answer> Evaluate<A> for ModelCall<A> {
    async fn evaluate(&self, request: &EvalRequest) -> Result<Answers<A>, CallError> {
        let messages = build_messages::<A>(request);
        let completion = self.transport.complete(&messages).await?;
        decode_answers::<A>(&completion.content, &request.checklist)
    }
}
