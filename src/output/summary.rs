use crate::error::OutputError;
use crate::pipeline::{CacheStats, UsageSnapshot};
use crate::runner::{DocumentFailure, PassStatus, RunReport};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct SummaryReport {
    pub run_id: Uuid,
    pub timestamp: String,
    pub target: String,
    pub model: String,
    pub repeats: u32,
    pub documents: usize,
    pub duration_sec: f64,
    pub views: Vec<ViewSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub questions: Option<QuestionSummary>,
    pub usage: UsageSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheStats>,
    pub failed: Vec<String>,
    pub exit_code: i32,
    pub report_dir: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ViewSummary {
    pub id: String,
    pub name: String,
    pub status: String,
    pub duration_sec: f64,
    pub documents_reviewed: usize,
    pub failed_documents: Vec<FailedDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuestionSummary {
    pub status: String,
    pub duration_sec: f64,
    pub documents_answered: usize,
    pub failed_documents: Vec<FailedDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FailedDocument {
    pub file_name: String,
    pub error: String,
}

/// Run details that live outside the report itself
pub struct RunInfo<'a> {
    pub target: &'a Path,
    pub model: &'a str,
    pub repeats: u32,
}

pub fn write_summary(
    report_dir: &Path,
    run_report: &RunReport,
    info: &RunInfo<'_>,
) -> Result<SummaryReport, OutputError> {
    // Also needed when every pass failed before writing anything
    fs::create_dir_all(report_dir).map_err(OutputError::CreateDir)?;

    let summary = build_summary(run_report, report_dir.to_path_buf(), info);

    let json_path = report_dir.join("summary.json");
    let json = serde_json::to_string_pretty(&summary)?;
    fs::write(&json_path, json).map_err(OutputError::WriteReport)?;

    let md_path = report_dir.join("summary.md");
    let md = build_summary_markdown(&summary);
    fs::write(&md_path, md).map_err(OutputError::WriteReport)?;

    Ok(summary)
}

fn split_status(status: &PassStatus) -> (String, Option<String>) {
    match status {
        PassStatus::Completed => ("completed".to_string(), None),
        PassStatus::Failed { error } => ("failed".to_string(), Some(error.clone())),
    }
}

fn failed_documents(failures: &[DocumentFailure]) -> Vec<FailedDocument> {
    failures
        .iter()
        .map(|f| FailedDocument {
            file_name: f.file_name.clone(),
            error: f.error.clone(),
        })
        .collect()
}

fn build_summary(run_report: &RunReport, report_dir: PathBuf, info: &RunInfo<'_>) -> SummaryReport {
    let mut failed = Vec::new();

    let views = run_report
        .view_results
        .iter()
        .map(|result| {
            let (status, reason) = split_status(&result.status);
            if result.status.is_failed() {
                failed.push(result.view_id.clone());
            }
            for doc in &result.failed_documents {
                failed.push(format!("{}/{}", result.view_id, doc.file_name));
            }
            ViewSummary {
                id: result.view_id.clone(),
                name: result.view_name.clone(),
                status,
                duration_sec: result.duration.as_secs_f64(),
                documents_reviewed: result.documents_reviewed,
                failed_documents: failed_documents(&result.failed_documents),
                reason,
            }
        })
        .collect();

    let questions = run_report.question_result.as_ref().map(|result| {
        let (status, reason) = split_status(&result.status);
        if result.status.is_failed() {
            failed.push("questions".to_string());
        }
        for doc in &result.failed_documents {
            failed.push(format!("questions/{}", doc.file_name));
        }
        QuestionSummary {
            status,
            duration_sec: result.duration.as_secs_f64(),
            documents_answered: result.documents_answered,
            failed_documents: failed_documents(&result.failed_documents),
            reason,
        }
    });

    let exit_code = if failed.is_empty() { 0 } else { 1 };

    SummaryReport {
        run_id: Uuid::new_v4(),
        timestamp: Utc::now().to_rfc3339(),
        target: info.target.display().to_string(),
        model: info.model.to_string(),
        repeats: info.repeats,
        documents: run_report.documents,
        duration_sec: run_report.total_duration.as_secs_f64(),
        views,
        questions,
        usage: run_report.usage,
        cache: run_report.cache,
        failed,
        exit_code,
        report_dir,
    }
}

fn build_summary_markdown(summary: &SummaryReport) -> String {
    let mut md = String::new();

    md.push_str("# cvscan Summary\n\n");
    md.push_str(&format!("**Run:** {}\n", summary.run_id));
    md.push_str(&format!("**Generated:** {}\n", summary.timestamp));
    md.push_str(&format!("**Target:** {}\n", summary.target));
    md.push_str(&format!(
        "**Report Dir:** {}\n",
        summary.report_dir.display()
    ));
    md.push_str(&format!(
        "**Model:** {} ({} repeats)\n",
        summary.model, summary.repeats
    ));
    md.push_str(&format!("**Documents:** {}\n", summary.documents));
    md.push_str(&format!("**Duration:** {:.1}s\n\n", summary.duration_sec));

    // Usage
    md.push_str("## Usage\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("|--------|-------|\n");
    md.push_str(&format!(
        "| LLM calls | {} |\n",
        summary.usage.remote_calls
    ));
    md.push_str(&format!(
        "| Failed calls | {} |\n",
        summary.usage.failed_calls
    ));
    md.push_str(&format!(
        "| Input tokens | {} |\n",
        summary.usage.input_tokens
    ));
    md.push_str(&format!(
        "| Output tokens | {} |\n",
        summary.usage.output_tokens
    ));
    if let Some(cache) = &summary.cache {
        md.push_str(&format!(
            "| Cache hits / misses | {} / {} |\n",
            cache.hits, cache.misses
        ));
    }
    md.push('\n');

    // Views table
    md.push_str("## Views\n\n");
    md.push_str("| View | Status | Reviewed | Failed |\n");
    md.push_str("|------|--------|----------|--------|\n");

    for view in &summary.views {
        md.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            view.name,
            status_cell(&view.status, view.reason.as_deref()),
            view.documents_reviewed,
            view.failed_documents.len()
        ));
    }

    if let Some(questions) = &summary.questions {
        md.push_str("\n## Questions\n\n");
        md.push_str(&format!(
            "{} documents answered, {} failed ({})\n",
            questions.documents_answered,
            questions.failed_documents.len(),
            status_cell(&questions.status, questions.reason.as_deref())
        ));
    }

    if !summary.failed.is_empty() {
        md.push_str("\n## Failures\n\n");
        for view in &summary.views {
            for doc in &view.failed_documents {
                md.push_str(&format!("- **{}** `{}`: {}\n", view.id, doc.file_name, doc.error));
            }
        }
        if let Some(questions) = &summary.questions {
            for doc in &questions.failed_documents {
                md.push_str(&format!("- **questions** `{}`: {}\n", doc.file_name, doc.error));
            }
        }
    }

    md
}

fn status_cell(status: &str, reason: Option<&str>) -> String {
    let icon = match status {
        "completed" => "✅",
        "failed" => "❌",
        _ => "❓",
    };
    match reason {
        Some(reason) => format!("{} {} ({})", icon, status, reason),
        None => format!("{} {}", icon, status),
    }
}
