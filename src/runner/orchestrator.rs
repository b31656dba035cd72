use super::consensus::ConsensusReviewer;
use super::fanout::par_map_settled;
use super::questions::QuestionAnswerer;
use crate::config::{Config, View};
use crate::discovery::Document;
use crate::error::OutputError;
use crate::output::{sort_reports, write_answers, write_view_reports, CandidateReport};
use crate::pipeline::{CacheStats, Checklist, Evaluate, PipelineBuilder, UsageSnapshot};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, info_span, warn, Instrument};

#[derive(Debug)]
pub struct RunReport {
    pub view_results: Vec<ViewResult>,
    pub question_result: Option<QuestionPassResult>,
    pub documents: usize,
    pub usage: UsageSnapshot,
    pub cache: Option<CacheStats>,
    pub total_duration: Duration,
}

impl RunReport {
    /// Failed views, documents and question passes
    pub fn failure_count(&self) -> usize {
        let views: usize = self
            .view_results
            .iter()
            .map(|v| v.failed_documents.len() + usize::from(v.status.is_failed()))
            .sum();
        let questions = self
            .question_result
            .as_ref()
            .map(|q| q.failed_documents.len() + usize::from(q.status.is_failed()))
            .unwrap_or(0);
        views + questions
    }

    pub fn has_failures(&self) -> bool {
        self.failure_count() > 0
    }
}

#[derive(Debug, Clone)]
pub struct DocumentFailure {
    pub file_name: String,
    pub error: String,
}

#[derive(Debug)]
pub struct ViewResult {
    pub view_id: String,
    pub view_name: String,
    pub status: PassStatus,
    pub documents_reviewed: usize,
    pub failed_documents: Vec<DocumentFailure>,
    pub reports: Vec<PathBuf>,
    pub duration: Duration,
}

#[derive(Debug)]
pub struct QuestionPassResult {
    pub status: PassStatus,
    pub documents_answered: usize,
    pub failed_documents: Vec<DocumentFailure>,
    pub report: Option<PathBuf>,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PassStatus {
    Completed,
    Failed { error: String },
}

impl PassStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, PassStatus::Failed { .. })
    }
}

impl std::fmt::Display for PassStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PassStatus::Completed => write!(f, "completed"),
            PassStatus::Failed { error } => write!(f, "failed: {}", error),
        }
    }
}

/// One top-level parallel unit of a run
#[derive(Clone)]
enum Pass {
    View { id: String, view: View },
    Questions,
}

enum PassOutcome {
    View(ViewResult),
    Questions(QuestionPassResult),
}

/// Everything a pass needs, owned so the pass can run on its own task
struct PassContext {
    documents: Arc<[Document]>,
    report_dir: PathBuf,
    repeats: u32,
    views: Arc<dyn Evaluate<bool>>,
    texts: Arc<dyn Evaluate<String>>,
    questions: Arc<Checklist>,
}

pub struct Orchestrator {
    config: Config,
    pipelines: PipelineBuilder,
}

impl Orchestrator {
    pub fn new(config: Config, pipelines: PipelineBuilder) -> Self {
        Self { config, pipelines }
    }

    /// Run every view and the question pass in parallel. Never fails as a whole;
    /// each failure is recorded in the report.
    pub async fn run(&self, documents: &[Document], report_dir: &Path) -> RunReport {
        let start = Instant::now();

        let mut passes: Vec<Pass> = self
            .config
            .views
            .iter()
            .map(|(id, view)| Pass::View {
                id: id.clone(),
                view: view.clone(),
            })
            .collect();
        if !self.config.questions.is_empty() {
            passes.push(Pass::Questions);
        }

        info!(
            "Running {} views over {} documents ({} repeats, concurrency {})",
            self.config.views.len(),
            documents.len(),
            self.config.repeats,
            self.config.concurrency
        );

        let documents: Arc<[Document]> = Arc::from(documents);
        let views = self.pipelines.build::<bool>();
        let texts = self.pipelines.build::<String>();
        let questions = Arc::new(self.config.questions.clone());

        let settled = par_map_settled(passes.clone(), |pass| {
            let context = PassContext {
                documents: documents.clone(),
                report_dir: report_dir.to_path_buf(),
                repeats: self.config.repeats,
                views: views.clone(),
                texts: texts.clone(),
                questions: questions.clone(),
            };
            let span = match &pass {
                Pass::View { id, .. } => info_span!("view", view = %id),
                Pass::Questions => info_span!("view", view = "questions"),
            };
            async move { context.run(pass).await }.instrument(span)
        })
        .await;

        let mut view_results = Vec::new();
        let mut question_result = None;
        for (pass, outcome) in passes.into_iter().zip(settled) {
            match (pass, outcome) {
                (_, Ok(PassOutcome::View(result))) => view_results.push(result),
                (_, Ok(PassOutcome::Questions(result))) => question_result = Some(result),
                (Pass::View { id, view }, Err(e)) => {
                    warn!("View {} failed: {}", id, e);
                    view_results.push(ViewResult {
                        view_id: id,
                        view_name: view.pretty_name,
                        status: PassStatus::Failed {
                            error: e.to_string(),
                        },
                        documents_reviewed: 0,
                        failed_documents: Vec::new(),
                        reports: Vec::new(),
                        duration: Duration::ZERO,
                    });
                }
                (Pass::Questions, Err(e)) => {
                    warn!("Question pass failed: {}", e);
                    question_result = Some(QuestionPassResult {
                        status: PassStatus::Failed {
                            error: e.to_string(),
                        },
                        documents_answered: 0,
                        failed_documents: Vec::new(),
                        report: None,
                        duration: Duration::ZERO,
                    });
                }
            }
        }

        RunReport {
            view_results,
            question_result,
            documents: documents.len(),
            usage: self.pipelines.usage(),
            cache: self.pipelines.cache().map(|c| c.stats()),
            total_duration: start.elapsed(),
        }
    }
}

impl PassContext {
    async fn run(self, pass: Pass) -> Result<PassOutcome, OutputError> {
        match pass {
            Pass::View { id, view } => self.run_view(id, view).await.map(PassOutcome::View),
            Pass::Questions => self.run_questions().await.map(PassOutcome::Questions),
        }
    }

    async fn run_view(&self, id: String, view: View) -> Result<ViewResult, OutputError> {
        let start = Instant::now();
        let reviewer = ConsensusReviewer::new(
            self.views.clone(),
            Arc::new(view.checklist()),
            self.repeats,
        );
        info!(
            "Reviewing {} documents against {} checklist items ({} estimated calls)",
            self.documents.len(),
            reviewer.checklist().len(),
            self.documents.len() * self.repeats as usize
        );

        let settled = reviewer.review_all_settled(&self.documents).await;

        let weights = view.weights();
        let mut reports = Vec::new();
        let mut failed_documents = Vec::new();
        for (document, result) in self.documents.iter().zip(settled) {
            match result {
                Ok(result) => reports.push(CandidateReport::new(document, result, &weights)),
                Err(e) => failed_documents.push(DocumentFailure {
                    file_name: document.name.clone(),
                    error: e.to_string(),
                }),
            }
        }
        if !failed_documents.is_empty() {
            warn!(
                "{} of {} documents failed and are left out of the report",
                failed_documents.len(),
                self.documents.len()
            );
        }

        sort_reports(&mut reports);
        let written = write_view_reports(&self.report_dir, &id, &reports)?;

        let duration = start.elapsed();
        info!("Finished review in {:.1}s", duration.as_secs_f64());

        Ok(ViewResult {
            view_id: id,
            view_name: view.pretty_name,
            status: PassStatus::Completed,
            documents_reviewed: reports.len(),
            failed_documents,
            reports: written,
            duration,
        })
    }

    async fn run_questions(&self) -> Result<QuestionPassResult, OutputError> {
        let start = Instant::now();
        let answerer = QuestionAnswerer::new(self.texts.clone(), self.questions.clone());

        let settled = answerer.answer_all_settled(&self.documents).await;

        let mut answered = Vec::new();
        let mut failed_documents = Vec::new();
        for (document, result) in self.documents.iter().zip(&settled) {
            match result {
                Ok(answers) => answered.push((document, answers)),
                Err(e) => failed_documents.push(DocumentFailure {
                    file_name: document.name.clone(),
                    error: e.to_string(),
                }),
            }
        }

        let report = write_answers(&self.report_dir, &answered)?;

        let duration = start.elapsed();
        info!("Finished question answering in {:.1}s", duration.as_secs_f64());

        Ok(QuestionPassResult {
            status: PassStatus::Completed,
            documents_answered: answered.len(),
            failed_documents,
            report: Some(report),
            duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChecklistItem, RetryConfig};
    use crate::error::ProviderError;
    use crate::pipeline::testing::ScriptedTransport;
    use crate::provider::{Completion, Message, TokenUsage, Transport};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    /// Answers every checklist key `true` unless the resume mentions "nothing";
    /// fails every call for resumes containing "broken"
    struct ResumeAwareTransport;

    #[async_trait]
    impl Transport for ResumeAwareTransport {
        fn name(&self) -> &'static str {
            "resume-aware"
        }

        async fn complete(&self, messages: &[Message]) -> Result<Completion, ProviderError> {
            let prompt = &messages[0].content;
            if prompt.contains("broken") {
                return Err(ProviderError::EmptyContent);
            }
            let vote = !prompt.contains("nothing");
            let content = if prompt.contains("- years:") {
                r#"{"years": {"reasoning": "", "answer": "4"}}"#.to_string()
            } else {
                serde_json::json!({
                    "rust": {"reasoning": "", "answer": vote},
                    "go": {"reasoning": "", "answer": false},
                })
                .to_string()
            };
            Ok(Completion {
                content,
                usage: TokenUsage::default(),
            })
        }
    }

    fn config() -> Config {
        let mut score_checklist = BTreeMap::new();
        score_checklist.insert(
            "rust".to_string(),
            ChecklistItem {
                question: "Knows Rust?".to_string(),
                weight: 2.0,
            },
        );
        score_checklist.insert(
            "go".to_string(),
            ChecklistItem {
                question: "Knows Go?".to_string(),
                weight: 1.0,
            },
        );

        let mut config = Config {
            repeats: 3,
            retry: RetryConfig {
                max_attempts: 2,
                delay_ms: 1,
            },
            ..Config::default()
        };
        config.views.insert(
            "backend".to_string(),
            View {
                pretty_name: "Backend".to_string(),
                score_checklist,
            },
        );
        config
            .questions
            .insert("years".to_string(), "Years of experience?".to_string());
        config
    }

    fn documents() -> Vec<Document> {
        vec![
            Document::new(0, PathBuf::from("pdf/zed.pdf"), "rust everywhere"),
            Document::new(1, PathBuf::from("pdf/amy.pdf"), "nothing relevant"),
            Document::new(2, PathBuf::from("pdf/bad.pdf"), "broken file"),
        ]
    }

    #[tokio::test]
    async fn test_run_writes_reports_and_records_failures() {
        let dir = TempDir::new().unwrap();
        let config = config();
        let pipelines = PipelineBuilder::new(
            Arc::new(ResumeAwareTransport),
            config.concurrency,
            config.retry.clone(),
            "test@0",
        );
        let orchestrator = Orchestrator::new(config, pipelines);

        let report = orchestrator.run(&documents(), dir.path()).await;

        assert_eq!(report.view_results.len(), 1);
        let view = &report.view_results[0];
        assert_eq!(view.status, PassStatus::Completed);
        assert_eq!(view.documents_reviewed, 2);
        assert_eq!(view.failed_documents.len(), 1);
        assert_eq!(view.failed_documents[0].file_name, "bad.pdf");

        let csv = fs::read_to_string(dir.path().join("report_backend.csv")).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines[0], "FileName,FileLoc,go,rust,FinalScore");
        assert_eq!(lines[1], "zed.pdf,pdf/zed.pdf,false,true,2");
        assert_eq!(lines[2], "amy.pdf,pdf/amy.pdf,false,false,0");
        assert_eq!(lines.len(), 3);
        assert!(dir.path().join("probabilities_backend.csv").exists());
        assert!(dir.path().join("inconsistency_backend.csv").exists());

        let questions = report.question_result.as_ref().unwrap();
        assert_eq!(questions.documents_answered, 2);
        assert_eq!(questions.failed_documents.len(), 1);
        assert!(dir.path().join("answers.csv").exists());

        // bad.pdf fails in the view and in the question pass
        assert_eq!(report.failure_count(), 2);
        // 2 good documents x 3 repeats + 2 answers, plus 2 attempts for each of 4 failing calls
        assert_eq!(report.usage.remote_calls, 8 + 8);
        assert_eq!(report.usage.failed_calls, 8);
    }

    #[tokio::test]
    async fn test_run_without_questions_has_no_question_pass() {
        let dir = TempDir::new().unwrap();
        let mut config = config();
        config.questions.clear();
        let transport = Arc::new(ScriptedTransport::repeating(
            r#"{"rust": {"answer": true}, "go": {"answer": true}}"#,
        ));
        let pipelines =
            PipelineBuilder::new(transport.clone(), 2, config.retry.clone(), "test@0");
        let orchestrator = Orchestrator::new(config, pipelines);

        let report = orchestrator.run(&documents()[..2], dir.path()).await;

        assert!(report.question_result.is_none());
        assert!(!report.has_failures());
        assert_eq!(transport.call_count(), 6);
        assert!(!dir.path().join("answers.csv").exists());
    }

    #[tokio::test]
    async fn test_failed_view_does_not_stop_other_views() {
        let dir = TempDir::new().unwrap();
        let mut config = config();
        config.questions.clear();
        let backend = config.views["backend"].clone();
        config.views.insert(
            "frontend".to_string(),
            View {
                pretty_name: "Frontend".to_string(),
                ..backend
            },
        );
        // A directory where the frontend report should go makes its write fail
        fs::create_dir_all(dir.path().join("report_frontend.csv")).unwrap();

        let pipelines = PipelineBuilder::new(
            Arc::new(ResumeAwareTransport),
            config.concurrency,
            config.retry.clone(),
            "test@0",
        );
        let orchestrator = Orchestrator::new(config, pipelines);

        let report = orchestrator.run(&documents()[..2], dir.path()).await;

        assert_eq!(report.view_results.len(), 2);
        let view = |id: &str| {
            report
                .view_results
                .iter()
                .find(|v| v.view_id == id)
                .unwrap()
        };

        let backend = view("backend");
        assert_eq!(backend.status, PassStatus::Completed);
        assert_eq!(backend.documents_reviewed, 2);
        assert_eq!(backend.reports.len(), 3);
        assert!(dir.path().join("report_backend.csv").is_file());
        assert!(dir.path().join("probabilities_backend.csv").is_file());
        assert!(dir.path().join("inconsistency_backend.csv").is_file());

        let frontend = view("frontend");
        assert!(frontend.status.is_failed());
        assert_eq!(frontend.view_name, "Frontend");
        assert!(frontend.reports.is_empty());

        assert_eq!(report.failure_count(), 1);
        assert!(report.has_failures());
    }
}
