mod report;
mod summary;

pub use report::{
    render_csv, sort_reports, write_answers, write_view_reports, CandidateReport, ReportMode,
};
pub use summary::{write_summary, RunInfo, SummaryReport};
