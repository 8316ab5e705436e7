//! Pipeline Orchestrator
//!
//! Drives one question through generate, validate, execute and format. A run
//! never returns an error: every outcome is recorded on the `PipelineRun`.

use crate::db::{StatementExecutor, DEFAULT_ROW_LIMIT};
use crate::pipeline::collaborators::{AnswerFormatter, Generation, SqlGenerator};
use crate::pipeline::run::{CandidateStatement, PipelineRun, Stage};
use crate::reason::ReasonCode;
use crate::schema::{SchemaContext, SchemaHandle};
use crate::validator::{SqlValidator, ValidationVerdict};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const OUT_OF_SCOPE_ANSWER: &str = "Sorry, I can only answer questions about vehicle cards, \
detected damages, repairs and quotes in the ClearQuote database. Your question doesn't seem to \
fall into any of those categories. Could you rephrase or ask something else?";

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub row_limit: usize,
    pub generation_timeout: Duration,
    pub formatting_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            row_limit: DEFAULT_ROW_LIMIT,
            generation_timeout: Duration::from_secs(30),
            formatting_timeout: Duration::from_secs(30),
        }
    }
}

pub struct Pipeline {
    schema: Arc<SchemaHandle>,
    validator: SqlValidator,
    executor: Arc<dyn StatementExecutor>,
    generator: Arc<dyn SqlGenerator>,
    formatter: Arc<dyn AnswerFormatter>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        schema: Arc<SchemaHandle>,
        executor: Arc<dyn StatementExecutor>,
        generator: Arc<dyn SqlGenerator>,
        formatter: Arc<dyn AnswerFormatter>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            schema,
            validator: SqlValidator::new(),
            executor,
            generator,
            formatter,
            settings,
        }
    }

    pub fn with_validator(mut self, validator: SqlValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn schema(&self) -> Arc<SchemaContext> {
        self.schema.snapshot()
    }

    pub fn validator(&self) -> &SqlValidator {
        &self.validator
    }

    pub fn executor(&self) -> Arc<dyn StatementExecutor> {
        Arc::clone(&self.executor)
    }

    pub async fn run(&self, question: &str) -> PipelineRun {
        let mut run = PipelineRun::start(question);
        // One snapshot for the whole run, so prompt and whitelist agree
        let schema = self.schema.snapshot();
        info!(run_id = %run.run_id, "Pipeline run started");

        let candidate = match self.generate(&mut run, &schema).await {
            Some(candidate) => candidate,
            None => return self.finish(run),
        };
        run.generated_sql = Some(candidate.text.clone());
        transition(&mut run, Stage::Validating);

        let accepted = match self.validator.validate(&candidate.text, &schema) {
            ValidationVerdict::Accepted(statement) => statement,
            ValidationVerdict::Rejected(rejection) => {
                warn!(
                    run_id = %run.run_id,
                    reason = %rejection.reason,
                    fragment = %rejection.fragment,
                    "Generated SQL rejected"
                );
                run.fail(rejection.reason);
                return self.finish(run);
            }
        };
        run.validated_sql = Some(accepted.normalized().to_string());
        debug!(
            run_id = %run.run_id,
            tables = ?accepted.referenced_tables(),
            "Generated SQL accepted"
        );
        transition(&mut run, Stage::Executing);

        let rows = match self.executor.execute(&accepted, self.settings.row_limit).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(run_id = %run.run_id, reason = %e.reason, error = %e.message, "Execution failed");
                run.fail(e.reason);
                return self.finish(run);
            }
        };
        run.row_count = rows.row_count;
        transition(&mut run, Stage::Formatting);

        let formatted = tokio::time::timeout(
            self.settings.formatting_timeout,
            self.formatter.format(&candidate.question, accepted.normalized(), &rows),
        )
        .await;
        let answer = match formatted {
            Ok(Ok(answer)) if !answer.trim().is_empty() => Some(answer),
            Ok(Ok(_)) => {
                warn!(run_id = %run.run_id, "Formatter returned an empty answer");
                None
            }
            Ok(Err(e)) => {
                warn!(run_id = %run.run_id, error = %e, "Formatter failed");
                None
            }
            Err(_) => {
                warn!(run_id = %run.run_id, "Formatter timed out");
                None
            }
        };
        match answer {
            Some(answer) => run.answer = Some(answer),
            None => {
                run.answer = Some(fallback_answer(rows.row_count));
                run.error = Some(ReasonCode::FormattingDegraded);
                run.error_detail = Some(ReasonCode::FormattingDegraded.summary().to_string());
            }
        }
        run.rows = Some(rows);
        transition(&mut run, Stage::Completed);

        self.finish(run)
    }

    /// Generating stage. `None` means the run already reached a terminal stage.
    async fn generate(
        &self,
        run: &mut PipelineRun,
        schema: &SchemaContext,
    ) -> Option<CandidateStatement> {
        let generated = tokio::time::timeout(
            self.settings.generation_timeout,
            self.generator.generate(&run.question, &schema.prompt_context()),
        )
        .await;

        match generated {
            Ok(Ok(Generation::Sql(text))) if !text.trim().is_empty() => Some(CandidateStatement {
                question: run.question.clone(),
                text,
            }),
            Ok(Ok(Generation::Sql(_))) => {
                warn!(run_id = %run.run_id, "Generator returned empty SQL");
                run.fail(ReasonCode::GenerationFailed);
                None
            }
            Ok(Ok(Generation::NotAnswerable)) => {
                info!(run_id = %run.run_id, "Question is out of scope");
                run.answer = Some(OUT_OF_SCOPE_ANSWER.to_string());
                transition(run, Stage::Completed);
                None
            }
            Ok(Err(e)) => {
                warn!(run_id = %run.run_id, error = %e, "Generator failed");
                run.fail(ReasonCode::GenerationFailed);
                None
            }
            Err(_) => {
                warn!(
                    run_id = %run.run_id,
                    timeout_ms = self.settings.generation_timeout.as_millis() as u64,
                    "Generator timed out"
                );
                run.fail(ReasonCode::GenerationFailed);
                None
            }
        }
    }

    fn finish(&self, run: PipelineRun) -> PipelineRun {
        info!(
            run_id = %run.run_id,
            stage = run.stage.as_str(),
            error = run.error.map(|r| r.as_str()).unwrap_or("none"),
            rows = run.row_count,
            elapsed_ms = run.elapsed_ms().unwrap_or_default(),
            "Pipeline run finished"
        );
        run
    }
}

fn transition(run: &mut PipelineRun, next: Stage) {
    let from = run.stage;
    if run.advance(next) {
        debug!(run_id = %run.run_id, from = from.as_str(), to = next.as_str(), "Stage transition");
    } else {
        error!(run_id = %run.run_id, from = from.as_str(), to = next.as_str(), "Illegal stage transition");
    }
}

/// Answer used when the formatter cannot phrase the result
pub fn fallback_answer(row_count: usize) -> String {
    if row_count == 0 {
        "Query returned no rows".to_string()
    } else {
        format!("Query returned {} rows", row_count)
    }
}
