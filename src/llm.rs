//! LLM client for an OpenAI-compatible chat completions endpoint.
//!
//! Generates candidate SQL from a question and phrases query results as an
//! answer. Gemini is reached through its OpenAI-compatible surface.

use crate::db::RowSet;
use crate::error::{ClearQuoteError, Result};
use crate::pipeline::collaborators::{AnswerFormatter, Generation, SqlGenerator};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Sentinel the generator returns for questions outside the schema
pub const NOT_ANSWERABLE: &str = "NOT_ANSWERABLE";

lazy_static! {
    static ref CODE_FENCE: Regex = Regex::new(r"(?s)^\s*```(?:[A-Za-z]*[ \t]*\r?\n)?\s*(.*?)\s*```\s*$").unwrap();
}

const SQL_RULES: &str = "\
RULES FOR SQL GENERATION
1. Output ONLY the raw SQL query. No explanation, no markdown fences, no trailing semicolon.
2. The query MUST be a single SELECT statement. Never produce INSERT, UPDATE, DELETE, DROP or ALTER.
3. Use ILIKE or LOWER() for string comparisons on panel_name, severity, damage_type, manufacturer and model.
4. Map informal phrases to real column values as documented above.
5. If no time range is given for a date-filtered question, default to the last 30 days.
6. If the question is unrelated to vehicles, damages, repairs or quotes, return exactly: NOT_ANSWERABLE
7. If a phrase is ambiguous (\"front side\" may be front panel or front bumper), match every option with OR or IN.
8. Alias computed values with readable names (e.g. AS avg_repair_cost).
9. Limit result sets to 100 rows unless the user asks for more.
10. Prefer explicit column lists over SELECT *.
11. Use only the tables listed above, unqualified (no schema prefix).";

const ANSWER_RULES: &str = "\
RULES FOR FORMATTING THE ANSWER
1. Turn the raw data into a clear, concise answer.
2. A single number is stated directly with context.
3. Several rows are summarised or shown as a short plain-text table.
4. Monetary values use INR (₹) with 2 decimal places.
5. Do not invent information that is not in the results.
6. A COUNT column equal to 0 means no matching records were found; say so and name what was searched for.
7. A COUNT above 0 with a NULL aggregate means the records exist but the value could not be calculated.
8. An empty result with no COUNT column means no matching records were found.";

#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl LlmClient {
    pub fn new(api_key: String, model: String, base_url: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClearQuoteError::Llm(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    pub async fn call_llm(&self, system: &str, prompt: &str) -> Result<String> {
        if !self.is_configured() {
            return Err(ClearQuoteError::Llm(
                "LLM API key is not configured. Set it via POST /api/config/api-key".to_string(),
            ));
        }

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.1,
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClearQuoteError::Llm(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClearQuoteError::Llm(format!(
                "LLM API error ({}): {}",
                status, error_text
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ClearQuoteError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        if let Some(finish_reason) = response_json["choices"][0]["finish_reason"].as_str() {
            if finish_reason == "content_filter" {
                return Err(ClearQuoteError::Llm(
                    "LLM response was filtered by content policy".to_string(),
                ));
            }
            if finish_reason == "length" {
                warn!("LLM response was truncated due to length limit");
            }
        }

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ClearQuoteError::Llm("No content in LLM response".to_string()))?;

        Ok(content.trim().to_string())
    }

    /// `GET {base_url}/models`, used by the health endpoint
    pub async fn health_check(&self) -> Result<()> {
        if !self.is_configured() {
            return Err(ClearQuoteError::Llm("LLM API key is not configured".to_string()));
        }
        let response = self
            .http
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| ClearQuoteError::Llm(format!("LLM health check failed: {}", e)))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ClearQuoteError::Llm(format!(
                "LLM health check returned {}",
                response.status()
            )))
        }
    }
}

pub fn sql_prompt(question: &str, schema_context: &str) -> String {
    format!(
        "{}\n\n{}\n\nUSER QUESTION\n{}",
        schema_context, SQL_RULES, question
    )
}

pub fn answer_prompt(question: &str, sql: &str, rows: &RowSet) -> String {
    let results = serde_json::to_string_pretty(&rows.to_json_rows())
        .unwrap_or_else(|_| "[]".to_string());
    format!(
        "The user asked the following question about vehicle data:\n\n\"{}\"\n\n\
         A SQL query was run and returned these results (as JSON):\n\n{}\n\n\
         The SQL that was executed:\n{}\n\n{}",
        question, results, sql, ANSWER_RULES
    )
}

/// Remove a surrounding markdown code fence, if any
pub fn strip_code_fences(raw: &str) -> String {
    match CODE_FENCE.captures(raw) {
        Some(caps) => caps
            .get(1)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default(),
        None => raw.trim().to_string(),
    }
}

/// Interpret raw generator output
pub fn parse_generation(raw: &str) -> Generation {
    let sql = strip_code_fences(raw);
    let bare = sql.trim_end_matches(|c: char| c == '.' || c == ';').trim();
    if bare.eq_ignore_ascii_case(NOT_ANSWERABLE) {
        Generation::NotAnswerable
    } else {
        Generation::Sql(sql)
    }
}

#[async_trait]
impl SqlGenerator for LlmClient {
    async fn generate(&self, question: &str, schema_context: &str) -> Result<Generation> {
        let raw = self
            .call_llm(
                "You translate questions into PostgreSQL. Return SQL only.",
                &sql_prompt(question, schema_context),
            )
            .await?;
        debug!(model = %self.model, chars = raw.len(), "Generator responded");
        Ok(parse_generation(&raw))
    }
}

#[async_trait]
impl AnswerFormatter for LlmClient {
    async fn format(&self, question: &str, sql: &str, rows: &RowSet) -> Result<String> {
        let answer = self
            .call_llm(
                "You explain database query results to a non-technical user.",
                &answer_prompt(question, sql, rows),
            )
            .await?;
        if answer.is_empty() {
            return Err(ClearQuoteError::Llm("Empty answer from LLM".to_string()));
        }
        Ok(answer)
    }
}
