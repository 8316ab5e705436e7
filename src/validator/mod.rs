//! SQL Validator
//!
//! Decides whether generated SQL may run. Pure and deterministic: the same
//! text against the same schema always yields the same verdict. Rules run in
//! order and the first failure wins:
//!
//! 1. single statement
//! 2. read-only
//! 3. no dangerous functions
//! 4. every table reference is whitelisted, once parentheses are known to pair up

pub mod keywords;
pub mod rules;
pub mod scanner;
pub mod verdict;

pub use verdict::{AcceptedStatement, Rejection, ValidationVerdict};

use crate::reason::ReasonCode;
use crate::schema::SchemaContext;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct SqlValidator {
    /// Deployment-specific additions to the built-in function denylist, lower case
    extra_denied: HashSet<String>,
}

impl SqlValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_denied_function(mut self, name: &str) -> Self {
        self.extra_denied.insert(name.to_lowercase());
        self
    }

    pub fn validate(&self, candidate: &str, schema: &SchemaContext) -> ValidationVerdict {
        let verdict = match self.check(candidate, schema) {
            Ok(statement) => ValidationVerdict::Accepted(statement),
            Err(rejection) => ValidationVerdict::Rejected(rejection),
        };
        if let ValidationVerdict::Rejected(ref rejection) = verdict {
            debug!(
                reason = %rejection.reason,
                fragment = %rejection.fragment,
                "Rejected candidate SQL"
            );
        }
        verdict
    }

    fn check(&self, candidate: &str, schema: &SchemaContext) -> Result<AcceptedStatement, Rejection> {
        let scanned = scanner::scan(candidate)
            .map_err(|e| Rejection::new(ReasonCode::EmptyOrUnparseable, &e.fragment))?;

        let statement = &scanned.tokens[..scanned.statement_end()];
        if statement.is_empty() {
            return Err(Rejection::new(ReasonCode::EmptyOrUnparseable, ""));
        }

        rules::single_statement(statement)?;
        rules::read_only(statement, &scanned.comments)?;
        rules::dangerous_functions(statement, &self.extra_denied)?;
        rules::balanced_parens(statement)?;
        let tables = rules::table_whitelist(statement, schema)?;

        Ok(AcceptedStatement::new(scanned.normalized(), tables))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(sql: &str) -> Option<ReasonCode> {
        SqlValidator::new()
            .validate(sql, &SchemaContext::describe())
            .reason()
    }

    #[test]
    fn test_accepts_join_and_reports_tables() {
        let verdict = SqlValidator::new().validate(
            "SELECT AVG(r.repair_cost) AS avg_cost, COUNT(*) AS matching_repairs\n\
             FROM repairs r JOIN damage_detections dd\n\
               ON dd.card_id = r.card_id AND LOWER(dd.panel_name) = LOWER(r.panel_name)\n\
             WHERE LOWER(dd.panel_name) = 'rear bumper';",
            &SchemaContext::describe(),
        );
        let accepted = verdict.accepted().expect("accepted");
        assert_eq!(
            accepted.referenced_tables().iter().cloned().collect::<Vec<_>>(),
            vec!["damage_detections".to_string(), "repairs".to_string()]
        );
        assert!(!accepted.normalized().ends_with(';'));
        assert!(!accepted.normalized().contains('\n'));
    }

    #[test]
    fn test_statement_after_comment_is_multi_statement() {
        assert_eq!(
            reason("SELECT * FROM vehicle_cards /* */; DROP TABLE quotes;"),
            Some(ReasonCode::MultiStatement)
        );
    }

    #[test]
    fn test_semicolon_inside_literal_is_fine() {
        assert_eq!(reason("SELECT * FROM quotes WHERE currency = ';'"), None);
    }

    #[test]
    fn test_writes_are_rejected() {
        assert_eq!(reason("DELETE FROM repairs"), Some(ReasonCode::WriteOperation));
        assert_eq!(reason("update repairs set approved = true"), Some(ReasonCode::WriteOperation));
        assert_eq!(
            reason("WITH gone AS (DELETE FROM repairs RETURNING *) SELECT * FROM gone"),
            Some(ReasonCode::WriteOperation)
        );
        assert_eq!(
            reason("SELECT * INTO backup FROM repairs"),
            Some(ReasonCode::WriteOperation)
        );
        assert_eq!(reason("EXPLAIN SELECT 1"), Some(ReasonCode::WriteOperation));
    }

    #[test]
    fn test_keywords_inside_literals_are_not_writes() {
        assert_eq!(
            reason("SELECT * FROM repairs WHERE repair_action = 'delete and replace'"),
            None
        );
    }

    #[test]
    fn test_dangerous_functions_in_any_spelling() {
        assert_eq!(
            reason("SELECT pg_sleep(5) FROM repairs"),
            Some(ReasonCode::DangerousFunction)
        );
        assert_eq!(
            reason("SELECT PG_SLEEP /**/ (5) FROM repairs"),
            Some(ReasonCode::DangerousFunction)
        );
        assert_eq!(
            reason("SELECT \"pg_read_file\"('/etc/passwd')"),
            Some(ReasonCode::DangerousFunction)
        );
    }

    #[test]
    fn test_extra_denied_function() {
        let validator = SqlValidator::new().with_denied_function("Random");
        let verdict = validator.validate("SELECT random() FROM quotes", &SchemaContext::describe());
        assert_eq!(verdict.reason(), Some(ReasonCode::DangerousFunction));
    }

    #[test]
    fn test_unknown_and_qualified_tables() {
        assert_eq!(reason("SELECT * FROM users"), Some(ReasonCode::UnknownTable));
        assert_eq!(
            reason("SELECT * FROM public.vehicle_cards"),
            Some(ReasonCode::SchemaQualifiedName)
        );
        assert_eq!(
            reason("SELECT * FROM analytics.vehicle_cards"),
            Some(ReasonCode::SchemaQualifiedName)
        );
    }

    #[test]
    fn test_system_catalogs_denied_anywhere() {
        assert_eq!(
            reason("SELECT * FROM pg_catalog.pg_tables"),
            Some(ReasonCode::DangerousFunction)
        );
        assert_eq!(
            reason("SELECT card_id, (SELECT 1 FROM \"information_schema\".tables LIMIT 1) FROM quotes"),
            Some(ReasonCode::DangerousFunction)
        );
        assert_eq!(
            reason("SELECT pg_catalog.now() FROM quotes"),
            Some(ReasonCode::DangerousFunction)
        );
    }

    #[test]
    fn test_empty_and_unparseable() {
        assert_eq!(reason(""), Some(ReasonCode::EmptyOrUnparseable));
        assert_eq!(reason("  ;; "), Some(ReasonCode::EmptyOrUnparseable));
        assert_eq!(reason("-- only a comment"), Some(ReasonCode::EmptyOrUnparseable));
        assert_eq!(reason("SELECT 'unterminated"), Some(ReasonCode::EmptyOrUnparseable));
        assert_eq!(reason("Here is your query"), Some(ReasonCode::EmptyOrUnparseable));
    }

    #[test]
    fn test_rule_order_first_failure_wins() {
        // Also a write and an unknown table, but the second statement is found first
        assert_eq!(
            reason("SELECT * FROM users; DELETE FROM repairs"),
            Some(ReasonCode::MultiStatement)
        );
        assert_eq!(
            reason("SELECT pg_sleep(1) FROM users"),
            Some(ReasonCode::DangerousFunction)
        );
    }

    #[test]
    fn test_ctes_and_date_functions_pass() {
        assert_eq!(
            reason(
                "WITH monthly AS (SELECT DATE_TRUNC('month', created_at) AS m, SUM(repair_cost) AS total \
                 FROM repairs GROUP BY 1) \
                 SELECT EXTRACT(MONTH FROM m), total FROM monthly ORDER BY 1"
            ),
            None
        );
    }

    #[test]
    fn test_deterministic() {
        let schema = SchemaContext::describe();
        let validator = SqlValidator::new();
        let sql = "SELECT * FROM quotes q JOIN vehicle_cards v ON v.card_id = q.card_id";
        assert_eq!(validator.validate(sql, &schema), validator.validate(sql, &schema));
    }
}
