use super::fanout::par_map_settled;
use crate::discovery::Document;
use crate::error::CallError;
use crate::pipeline::{Answers, Checklist, EvalRequest, Evaluate};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, Instrument};

/// Answers free-text questions with a single sample per document.
#[derive(Clone)]
pub struct QuestionAnswerer {
    evaluator: Arc<dyn Evaluate<String>>,
    questions: Arc<Checklist>,
}

impl QuestionAnswerer {
    pub fn new(evaluator: Arc<dyn Evaluate<String>>, questions: Arc<Checklist>) -> Self {
        Self {
            evaluator,
            questions,
        }
    }

    pub async fn answer_document(&self, document: &Document) -> Result<Answers<String>, CallError> {
        if self.questions.is_empty() {
            return Ok(Answers::new());
        }

        let request = EvalRequest::new(self.questions.clone(), document.text.clone(), None);
        match self.evaluator.evaluate(&request).await {
            Ok(answers) => {
                info!("{}: answered {} questions", document.name, answers.len());
                debug!("{}: {:?}", document.name, answers);
                Ok(answers)
            }
            Err(e) => {
                error!("{}: question answering failed: {}", document.name, e);
                Err(e)
            }
        }
    }

    /// Answer for every document, keeping each document's own outcome.
    pub async fn answer_all_settled(
        &self,
        documents: &[Document],
    ) -> Vec<Result<Answers<String>, CallError>> {
        info!(
            "Answering {} questions for {} documents",
            self.questions.len(),
            documents.len()
        );
        par_map_settled(documents.iter().cloned(), |document| {
            let answerer = self.clone();
            let span = info_span!("questions", document = %document.name);
            async move { answerer.answer_document(&document).await }.instrument(span)
        })
        .await
    }
}
