//! Question-to-answer pipeline

pub mod collaborators;
pub mod orchestrator;
pub mod run;

pub use collaborators::{AnswerFormatter, Generation, SqlGenerator};
pub use orchestrator::{fallback_answer, Pipeline, PipelineSettings, OUT_OF_SCOPE_ANSWER};
pub use run::{CandidateStatement, PipelineRun, Stage};
