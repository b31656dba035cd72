mod consensus;
mod fanout;
mod orchestrator;
mod questions;

pub use consensus::{
    aggregate, mean_inconsistency, ConsensusReviewer, DocumentReviewResult, QuestionResult,
};
pub use fanout::{par_map, par_map_range, par_map_settled};
pub use orchestrator::{
    DocumentFailure, Orchestrator, PassStatus, QuestionPassResult, RunReport, ViewResult,
};
pub use questions::QuestionAnswerer;
