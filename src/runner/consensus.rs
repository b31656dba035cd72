use super::fanout::{par_map, par_map_range, par_map_settled};
use crate::discovery::Document;
use crate::error::{DocumentError, JoinedError};
use crate::pipeline::{Answers, Checklist, EvalRequest, Evaluate};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, debug_span, error, info, info_span, Instrument};

/// Consensus over the repeated answers to one checklist question.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuestionResult {
    probability: f64,
}

impl QuestionResult {
    pub fn new(probability: f64) -> Self {
        Self { probability }
    }

    /// Fraction of the votes that were `true`
    pub fn from_votes(trues: usize, total: usize) -> Self {
        if total == 0 {
            return Self::new(0.0);
        }
        Self::new(trues as f64 / total as f64)
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    /// Strict majority; an even split is not true
    pub fn is_true(&self) -> bool {
        self.probability > 0.5
    }

    /// 0 when unanimous, 1 on an even split
    pub fn inconsistency(&self) -> f64 {
        2.0 * self.probability.min(1.0 - self.probability)
    }
}

pub type DocumentReviewResult = BTreeMap<String, QuestionResult>;

/// Average the boolean answers of every sample, key by key
pub fn aggregate(checklist: &Checklist, samples: &[Answers<bool>]) -> DocumentReviewResult {
    checklist
        .keys()
        .map(|key| {
            let trues = samples
                .iter()
                .filter(|sample| sample.get(key).map(|a| a.answer).unwrap_or(false))
                .count();
            (key.clone(), QuestionResult::from_votes(trues, samples.len()))
        })
        .collect()
}

pub fn mean_inconsistency(result: &DocumentReviewResult) -> f64 {
    if result.is_empty() {
        return 0.0;
    }
    result.values().map(|r| r.inconsistency()).sum::<f64>() / result.len() as f64
}

/// Samples a checklist `repeats` times per document and reduces the votes.
#[derive(Clone)]
pub struct ConsensusReviewer {
    evaluator: Arc<dyn Evaluate<bool>>,
    checklist: Arc<Checklist>,
    repeats: u32,
}

impl ConsensusReviewer {
    pub fn new(evaluator: Arc<dyn Evaluate<bool>>, checklist: Arc<Checklist>, repeats: u32) -> Self {
        debug_assert!(repeats > 0, "a consensus needs at least one repeat");
        Self {
            evaluator,
            checklist,
            repeats,
        }
    }

    pub fn checklist(&self) -> &Checklist {
        &self.checklist
    }

    /// Review one document. Fails if any repeat fails, after all repeats finished.
    pub async fn review_document(
        &self,
        document: &Document,
    ) -> Result<DocumentReviewResult, DocumentError> {
        if self.checklist.is_empty() {
            return Ok(DocumentReviewResult::new());
        }

        let samples = par_map_range(self.repeats as usize, |repeat| {
            let evaluator = self.evaluator.clone();
            let request = EvalRequest::new(
                self.checklist.clone(),
                document.text.clone(),
                Some(repeat as u32),
            );
            async move { evaluator.evaluate(&request).await }
                .instrument(debug_span!("repeat", repeat))
        })
        .await;

        match samples {
            Ok(samples) => {
                let result = aggregate(&self.checklist, &samples);
                info!(
                    "{}: mean inconsistency {:.2}",
                    document.name,
                    mean_inconsistency(&result)
                );
                debug!("{}: {:?}", document.name, result);
                Ok(result)
            }
            Err(e) => {
                error!("{}: review failed: {}", document.name, e);
                Err(e)
            }
        }
    }

    /// Review every document; all results, or every failed document.
    pub async fn review_all(
        &self,
        documents: &[Document],
    ) -> Result<Vec<DocumentReviewResult>, JoinedError<DocumentError>> {
        par_map(documents.iter().cloned(), |document| self.spawn_review(document)).await
    }

    /// Review every document, keeping each document's own outcome.
    pub async fn review_all_settled(
        &self,
        documents: &[Document],
    ) -> Vec<Result<DocumentReviewResult, DocumentError>> {
        par_map_settled(documents.iter().cloned(), |document| {
            self.spawn_review(document)
        })
        .await
    }

    fn spawn_review(
        &self,
        document: Document,
    ) -> impl std::future::Future<Output = Result<DocumentReviewResult, DocumentError>> + Send + 'static
    {
        let reviewer = self.clone();
        let span = info_span!("document", document = %document.name);
        async move { reviewer.review_document(&document).await }.instrument(span)
    }
}
