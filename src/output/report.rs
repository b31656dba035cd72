use crate::discovery::Document;
use crate::error::OutputError;
use crate::pipeline::Answers;
use crate::runner::DocumentReviewResult;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// What each checklist cell of a view report shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    Boolean,
    Probability,
    Inconsistency,
}

impl ReportMode {
    pub const ALL: [ReportMode; 3] = [
        ReportMode::Boolean,
        ReportMode::Probability,
        ReportMode::Inconsistency,
    ];

    fn file_name(&self, view_id: &str) -> String {
        let prefix = match self {
            ReportMode::Boolean => "report",
            ReportMode::Probability => "probabilities",
            ReportMode::Inconsistency => "inconsistency",
        };
        format!("{}_{}.csv", prefix, view_id)
    }
}

/// One reviewed document's row in a view report
#[derive(Debug, Clone)]
pub struct CandidateReport {
    pub file_name: String,
    pub file_loc: PathBuf,
    pub result: DocumentReviewResult,
    pub final_score: f64,
}

impl CandidateReport {
    /// Score is the summed weight of every key that came out true
    pub fn new(document: &Document, result: DocumentReviewResult, weights: &BTreeMap<String, f64>) -> Self {
        // Folding from +0.0 keeps an empty sum from turning into -0.0
        let final_score = result
            .iter()
            .filter(|(_, r)| r.is_true())
            .map(|(key, _)| weights.get(key).copied().unwrap_or(0.0))
            .fold(0.0, |total, weight| total + weight);

        Self {
            file_name: document.name.clone(),
            file_loc: document.path.clone(),
            result,
            final_score,
        }
    }
}

/// Highest score first; equal scores by file name
pub fn sort_reports(reports: &mut [CandidateReport]) {
    reports.sort_by(|a, b| {
        b.final_score
            .total_cmp(&a.final_score)
            .then_with(|| a.file_name.cmp(&b.file_name))
    });
}

/// Write the boolean, probability and inconsistency CSVs of one view
pub fn write_view_reports(
    report_dir: &Path,
    view_id: &str,
    reports: &[CandidateReport],
) -> Result<Vec<PathBuf>, OutputError> {
    fs::create_dir_all(report_dir).map_err(OutputError::CreateDir)?;

    let mut written = Vec::with_capacity(ReportMode::ALL.len());
    for mode in ReportMode::ALL {
        let path = report_dir.join(mode.file_name(view_id));
        fs::write(&path, render_csv(reports, mode)).map_err(OutputError::WriteReport)?;
        written.push(path);
    }
    Ok(written)
}

pub fn render_csv(reports: &[CandidateReport], mode: ReportMode) -> String {
    let keys: BTreeSet<&String> = reports.iter().flat_map(|r| r.result.keys()).collect();

    let mut header = vec!["FileName".to_string(), "FileLoc".to_string()];
    header.extend(keys.iter().map(|k| k.to_string()));
    header.push("FinalScore".to_string());

    let mut csv = String::new();
    push_row(&mut csv, &header);

    for report in reports {
        let mut row = vec![
            report.file_name.clone(),
            report.file_loc.display().to_string(),
        ];
        for key in &keys {
            let cell = match (report.result.get(*key), mode) {
                (None, _) => String::new(),
                (Some(r), ReportMode::Boolean) => r.is_true().to_string(),
                (Some(r), ReportMode::Probability) => format!("{:.3}", r.probability()),
                (Some(r), ReportMode::Inconsistency) => format!("{:.3}", r.inconsistency()),
            };
            row.push(cell);
        }
        row.push(report.final_score.to_string());
        push_row(&mut csv, &row);
    }

    csv
}

/// Write the free-text answers of every answered document
pub fn write_answers(
    report_dir: &Path,
    answered: &[(&Document, &Answers<String>)],
) -> Result<PathBuf, OutputError> {
    fs::create_dir_all(report_dir).map_err(OutputError::CreateDir)?;

    let keys: BTreeSet<&String> = answered.iter().flat_map(|(_, a)| a.keys()).collect();

    let mut header = vec!["FileName".to_string(), "FileLoc".to_string()];
    header.extend(keys.iter().map(|k| k.to_string()));

    let mut csv = String::new();
    push_row(&mut csv, &header);
    for (document, answers) in answered {
        let mut row = vec![document.name.clone(), document.path.display().to_string()];
        for key in &keys {
            row.push(
                answers
                    .get(*key)
                    .map(|a| a.answer.clone())
                    .unwrap_or_default(),
            );
        }
        push_row(&mut csv, &row);
    }

    let path = report_dir.join("answers.csv");
    fs::write(&path, csv).map_err(OutputError::WriteReport)?;
    Ok(path)
}

fn push_row(csv: &mut String, fields: &[String]) {
    let line = fields
        .iter()
        .map(|f| escape_field(f))
        .collect::<Vec<_>>()
        .join(",");
    csv.push_str(&line);
    csv.push('\n');
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
