//! Collaborator contracts for the two LLM-backed stages

use crate::db::RowSet;
use crate::error::Result;
use async_trait::async_trait;

/// What the generator made of a question
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    /// Candidate SQL, fences already stripped. Untrusted.
    Sql(String),
    /// The question has nothing to do with the schema
    NotAnswerable,
}

#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate(&self, question: &str, schema_context: &str) -> Result<Generation>;
}

#[async_trait]
pub trait AnswerFormatter: Send + Sync {
    async fn format(&self, question: &str, sql: &str, rows: &RowSet) -> Result<String>;
}
