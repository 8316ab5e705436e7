//! Reason Codes
//!
//! Stable identifiers for why a pipeline stage failed. These are the only
//! failure details that leave the process; driver messages and offending SQL
//! fragments stay in the logs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure taxonomy shared by the validator, the executor and the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    GenerationFailed,
    MultiStatement,
    WriteOperation,
    DangerousFunction,
    UnknownTable,
    SchemaQualifiedName,
    EmptyOrUnparseable,
    PoolExhausted,
    StatementTimeout,
    ConnectionError,
    ExecutionError,
    FormattingDegraded,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::GenerationFailed => "generation_failed",
            ReasonCode::MultiStatement => "multi_statement",
            ReasonCode::WriteOperation => "write_operation",
            ReasonCode::DangerousFunction => "dangerous_function",
            ReasonCode::UnknownTable => "unknown_table",
            ReasonCode::SchemaQualifiedName => "schema_qualified_name",
            ReasonCode::EmptyOrUnparseable => "empty_or_unparseable",
            ReasonCode::PoolExhausted => "pool_exhausted",
            ReasonCode::StatementTimeout => "statement_timeout",
            ReasonCode::ConnectionError => "connection_error",
            ReasonCode::ExecutionError => "execution_error",
            ReasonCode::FormattingDegraded => "formatting_degraded",
        }
    }

    /// Caller-safe summary. Never includes database text or SQL.
    pub fn summary(&self) -> &'static str {
        match self {
            ReasonCode::GenerationFailed => "The question could not be translated into SQL.",
            ReasonCode::MultiStatement => "The generated SQL contained more than one statement.",
            ReasonCode::WriteOperation => "Only read-only SELECT queries are allowed.",
            ReasonCode::DangerousFunction => "The generated SQL used a blocked function.",
            ReasonCode::UnknownTable => "The generated SQL referenced a table outside the allowed schema.",
            ReasonCode::SchemaQualifiedName => "Schema-qualified table names are not allowed.",
            ReasonCode::EmptyOrUnparseable => "The generated SQL was empty or could not be read.",
            ReasonCode::PoolExhausted => "The database is busy. Please retry shortly.",
            ReasonCode::StatementTimeout => "The query took too long and was cancelled.",
            ReasonCode::ConnectionError => "The database could not be reached.",
            ReasonCode::ExecutionError => "The database rejected the generated query.",
            ReasonCode::FormattingDegraded => "The answer could not be phrased; raw results are included.",
        }
    }

    /// Reasons raised by the validator's rule engine
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ReasonCode::MultiStatement
                | ReasonCode::WriteOperation
                | ReasonCode::DangerousFunction
                | ReasonCode::UnknownTable
                | ReasonCode::SchemaQualifiedName
                | ReasonCode::EmptyOrUnparseable
        )
    }

    /// Only formatting trouble is swallowed into a successful run
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ReasonCode::FormattingDegraded)
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
