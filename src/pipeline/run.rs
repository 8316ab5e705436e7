//! Pipeline run record and stage machine

use crate::db::RowSet;
use crate::reason::ReasonCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Generating,
    Validating,
    Executing,
    Formatting,
    Completed,
    Failed,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }

    /// Legal one-way transitions. Generating may jump to Completed for
    /// out-of-scope questions.
    pub fn can_advance_to(&self, next: Stage) -> bool {
        match (self, next) {
            (current, Stage::Failed) => !current.is_terminal(),
            (Stage::Generating, Stage::Validating) => true,
            (Stage::Generating, Stage::Completed) => true,
            (Stage::Validating, Stage::Executing) => true,
            (Stage::Executing, Stage::Formatting) => true,
            (Stage::Formatting, Stage::Completed) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Generating => "generating",
            Stage::Validating => "validating",
            Stage::Executing => "executing",
            Stage::Formatting => "formatting",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        }
    }
}

/// Raw generator output for one question. Never trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateStatement {
    pub question: String,
    pub text: String,
}

/// Everything known about one question's trip through the pipeline
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub question: String,
    pub generated_sql: Option<String>,
    pub validated_sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<RowSet>,
    pub row_count: usize,
    pub answer: Option<String>,
    pub error: Option<ReasonCode>,
    pub error_detail: Option<String>,
    pub stage: Stage,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    pub fn start(question: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            question: question.to_string(),
            generated_sql: None,
            validated_sql: None,
            rows: None,
            row_count: 0,
            answer: None,
            error: None,
            error_detail: None,
            stage: Stage::Generating,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Move to `next`. Illegal transitions are refused and leave the run unchanged.
    pub(crate) fn advance(&mut self, next: Stage) -> bool {
        if !self.stage.can_advance_to(next) {
            return false;
        }
        self.stage = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        true
    }

    pub(crate) fn fail(&mut self, reason: ReasonCode) {
        self.error = Some(reason);
        self.error_detail = Some(reason.summary().to_string());
        self.advance(Stage::Failed);
    }

    pub fn is_completed(&self) -> bool {
        self.stage == Stage::Completed
    }

    pub fn elapsed_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_path() {
        let path = [
            Stage::Generating,
            Stage::Validating,
            Stage::Executing,
            Stage::Formatting,
            Stage::Completed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]));
            assert!(!pair[1].can_advance_to(pair[0]));
        }
    }

    #[test]
    fn test_failed_reachable_from_non_terminal_only() {
        assert!(Stage::Executing.can_advance_to(Stage::Failed));
        assert!(!Stage::Completed.can_advance_to(Stage::Failed));
        assert!(!Stage::Failed.can_advance_to(Stage::Generating));
    }

    #[test]
    fn test_no_skipping_validation() {
        assert!(!Stage::Generating.can_advance_to(Stage::Executing));
        assert!(!Stage::Validating.can_advance_to(Stage::Formatting));
    }

    #[test]
    fn test_fail_records_sanitized_detail() {
        let mut run = PipelineRun::start("How many quotes?");
        run.fail(ReasonCode::UnknownTable);
        assert_eq!(run.stage, Stage::Failed);
        assert_eq!(run.error, Some(ReasonCode::UnknownTable));
        assert_eq!(run.error_detail.as_deref(), Some(ReasonCode::UnknownTable.summary()));
        assert!(run.finished_at.is_some());
        assert!(!run.advance(Stage::Validating));
    }

    #[test]
    fn test_serializes_stage_in_snake_case() {
        let run = PipelineRun::start("q");
        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["stage"], "generating");
        assert!(json.get("rows").is_none());
    }
}
