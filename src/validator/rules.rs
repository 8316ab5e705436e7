//! Validation Rules
//!
//! Each rule inspects the scanned token stream and returns the first
//! violation it finds. Rules are run in a fixed order by `SqlValidator`.

use crate::reason::ReasonCode;
use crate::schema::SchemaContext;
use crate::validator::keywords::{
    COMMENT_WRITE_KEYWORDS, DENIED_CALLS, DENIED_FUNCTIONS, DENIED_SCHEMAS, FROM_CLAUSE_END,
    FROM_TAKING_FUNCTIONS, OTHER_STATEMENTS, STATEMENT_BODY_KEYWORDS, WRITE_KEYWORDS,
};
use crate::validator::scanner::{Token, TokenKind};
use crate::validator::verdict::Rejection;
use std::collections::{BTreeSet, HashSet};

type RuleResult<T = ()> = std::result::Result<T, Rejection>;

/// Rule 1: a `;` followed by anything means a second statement
pub fn single_statement(tokens: &[Token]) -> RuleResult {
    if tokens.iter().any(|t| t.kind == TokenKind::Semicolon) {
        return Err(Rejection::new(ReasonCode::MultiStatement, ";"));
    }
    Ok(())
}

/// Rule 2: only SELECT, or WITH ... SELECT, and no write keyword anywhere
pub fn read_only(tokens: &[Token], comments: &[String]) -> RuleResult {
    let first = match tokens.first() {
        Some(t) => t,
        None => return Err(Rejection::new(ReasonCode::EmptyOrUnparseable, "")),
    };

    if first.kind != TokenKind::Word {
        return Err(Rejection::new(ReasonCode::EmptyOrUnparseable, &first.text));
    }

    let leading = first.upper();
    if leading != "SELECT" && leading != "WITH" {
        if WRITE_KEYWORDS.contains(leading.as_str()) || OTHER_STATEMENTS.contains(leading.as_str()) {
            return Err(Rejection::new(ReasonCode::WriteOperation, &first.text));
        }
        return Err(Rejection::new(ReasonCode::EmptyOrUnparseable, &first.text));
    }

    if let Some(write) = tokens
        .iter()
        .find(|t| t.kind == TokenKind::Word && WRITE_KEYWORDS.contains(t.upper().as_str()))
    {
        return Err(Rejection::new(ReasonCode::WriteOperation, &write.text));
    }

    for comment in comments {
        let smuggled = comment
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .find(|w| COMMENT_WRITE_KEYWORDS.contains(w.to_ascii_uppercase().as_str()));
        if let Some(word) = smuggled {
            return Err(Rejection::new(ReasonCode::WriteOperation, word));
        }
    }

    if leading == "WITH" {
        match body_keyword_after_with(tokens) {
            Some(body) if body.is_word("SELECT") => {}
            Some(body) => return Err(Rejection::new(ReasonCode::WriteOperation, &body.text)),
            None => return Err(Rejection::new(ReasonCode::EmptyOrUnparseable, "WITH")),
        }
    }

    Ok(())
}

/// First statement keyword at depth 0 once the CTE list is over
fn body_keyword_after_with(tokens: &[Token]) -> Option<&Token> {
    let mut depth: i32 = 0;
    for token in tokens.iter().skip(1) {
        if token.is_punct("(") {
            depth += 1;
        } else if token.is_punct(")") {
            depth -= 1;
        } else if depth == 0
            && token.kind == TokenKind::Word
            && STATEMENT_BODY_KEYWORDS.contains(token.upper().as_str())
        {
            return Some(token);
        }
    }
    None
}

/// Rule 3: denylisted functions, however they are spelled or spaced
pub fn dangerous_functions(tokens: &[Token], extra_denied: &HashSet<String>) -> RuleResult {
    for (idx, token) in tokens.iter().enumerate() {
        let name = match token.kind {
            TokenKind::Word => token.text.to_lowercase(),
            TokenKind::QuotedIdent => match token.ident_key() {
                Some(key) => key,
                None => continue,
            },
            _ => continue,
        };

        if DENIED_FUNCTIONS.contains(name.as_str())
            || DENIED_SCHEMAS.contains(name.as_str())
            || extra_denied.contains(&name)
        {
            return Err(Rejection::new(ReasonCode::DangerousFunction, &token.text));
        }

        let called = tokens.get(idx + 1).map_or(false, |next| next.is_punct("("));
        if called && DENIED_CALLS.contains(name.as_str()) {
            return Err(Rejection::new(ReasonCode::DangerousFunction, &token.text));
        }
    }
    Ok(())
}

/// Rule 4: parentheses must pair up. A stray `)` would close the executor's wrapper.
pub fn balanced_parens(tokens: &[Token]) -> RuleResult {
    let mut depth: usize = 0;
    for token in tokens {
        if token.is_punct("(") {
            depth += 1;
        } else if token.is_punct(")") {
            depth = match depth.checked_sub(1) {
                Some(d) => d,
                None => return Err(Rejection::new(ReasonCode::EmptyOrUnparseable, ")")),
            };
        }
    }
    if depth != 0 {
        return Err(Rejection::new(ReasonCode::EmptyOrUnparseable, "("));
    }
    Ok(())
}

/// Rule 5: every table after FROM / JOIN / FROM-list comma must be whitelisted.
/// Returns the canonical names of the tables touched. Expects balanced parentheses.
pub fn table_whitelist(tokens: &[Token], schema: &SchemaContext) -> RuleResult<BTreeSet<String>> {
    let mut referenced = BTreeSet::new();
    // CTE names with the depth of the query that declared them
    let mut cte_scopes: Vec<(usize, HashSet<String>)> = Vec::new();

    let mut depth: usize = 0;
    // Opener word for each open parenthesis, e.g. EXTRACT for `EXTRACT(`
    let mut openers: Vec<String> = Vec::new();
    // Depths at which a FROM clause is currently open
    let mut from_depths: Vec<usize> = Vec::new();

    for (idx, token) in tokens.iter().enumerate() {
        if token.is_punct("(") {
            let opener = idx
                .checked_sub(1)
                .and_then(|p| tokens.get(p))
                .filter(|p| p.kind == TokenKind::Word)
                .map(|p| p.upper())
                .unwrap_or_default();
            openers.push(opener);
            depth += 1;
            continue;
        }

        if token.is_punct(")") {
            openers.pop();
            depth = depth.saturating_sub(1);
            while from_depths.last().map_or(false, |&d| d > depth) {
                from_depths.pop();
            }
            while cte_scopes.last().map_or(false, |(d, _)| *d > depth) {
                cte_scopes.pop();
            }
            continue;
        }

        let in_from_clause = from_depths.last() == Some(&depth);

        if token.kind == TokenKind::Word {
            let upper = token.upper();

            if upper == "WITH" && starts_query(tokens, idx) {
                cte_scopes.push((depth, with_clause_names(tokens, idx)));
                continue;
            }

            if upper == "FROM" {
                if is_non_table_from(tokens, idx, &openers) {
                    continue;
                }
                if !in_from_clause {
                    from_depths.push(depth);
                }
                check_table_ref(tokens, idx + 1, schema, &cte_scopes, &mut referenced)?;
                continue;
            }

            if upper == "JOIN" {
                check_table_ref(tokens, idx + 1, schema, &cte_scopes, &mut referenced)?;
                continue;
            }

            if in_from_clause && FROM_CLAUSE_END.contains(upper.as_str()) {
                from_depths.pop();
            }
            continue;
        }

        if in_from_clause && token.is_punct(",") {
            check_table_ref(tokens, idx + 1, schema, &cte_scopes, &mut referenced)?;
        }
    }

    Ok(referenced)
}

/// FROM inside EXTRACT(...) and friends, or in IS [NOT] DISTINCT FROM
fn is_non_table_from(tokens: &[Token], idx: usize, openers: &[String]) -> bool {
    if openers
        .last()
        .map_or(false, |o| FROM_TAKING_FUNCTIONS.contains(o.as_str()))
    {
        return true;
    }
    idx >= 2 && tokens[idx - 1].is_word("DISTINCT") && (tokens[idx - 2].is_word("IS") || tokens[idx - 2].is_word("NOT"))
}

fn check_table_ref(
    tokens: &[Token],
    start: usize,
    schema: &SchemaContext,
    cte_scopes: &[(usize, HashSet<String>)],
    referenced: &mut BTreeSet<String>,
) -> RuleResult {
    let mut pos = start;
    while tokens
        .get(pos)
        .map_or(false, |t| t.is_word("ONLY") || t.is_word("LATERAL"))
    {
        pos += 1;
    }

    let first = match tokens.get(pos) {
        Some(t) => t,
        None => return Err(Rejection::new(ReasonCode::EmptyOrUnparseable, "FROM")),
    };

    // Derived table; its own FROM is checked when the scan reaches it
    if first.is_punct("(") {
        return Ok(());
    }

    let mut parts: Vec<&Token> = Vec::new();
    match first.kind {
        TokenKind::Word | TokenKind::QuotedIdent => parts.push(first),
        _ => return Err(Rejection::new(ReasonCode::EmptyOrUnparseable, &first.text)),
    }
    pos += 1;
    while tokens.get(pos).map_or(false, |t| t.is_punct("."))
        && tokens
            .get(pos + 1)
            .map_or(false, |t| matches!(t.kind, TokenKind::Word | TokenKind::QuotedIdent))
    {
        parts.push(&tokens[pos + 1]);
        pos += 2;
    }

    let written: Vec<&str> = parts.iter().map(|t| t.text.as_str()).collect();
    let fragment = written.join(".");

    match parts.as_slice() {
        [name] => {
            let key = name.ident_key().unwrap_or_default();
            if cte_scopes.iter().any(|(_, names)| names.contains(&key)) {
                return Ok(());
            }
            let known = match name.kind {
                TokenKind::QuotedIdent => schema.contains_exact(&key),
                _ => schema.contains(&key),
            };
            if !known {
                return Err(Rejection::new(ReasonCode::UnknownTable, &fragment));
            }
            let canonical = schema
                .table(&key)
                .map(|t| t.name.clone())
                .unwrap_or(key);
            referenced.insert(canonical);
            Ok(())
        }
        [schema_part, table_part] => {
            let schema_key = schema_part.ident_key().unwrap_or_default();
            let table_key = table_part.ident_key().unwrap_or_default();
            if schema.contains_qualified(&schema_key, &table_key) {
                referenced.insert(format!("{}.{}", schema_key, table_key).to_lowercase());
                Ok(())
            } else {
                Err(Rejection::new(ReasonCode::SchemaQualifiedName, &fragment))
            }
        }
        _ => Err(Rejection::new(ReasonCode::SchemaQualifiedName, &fragment)),
    }
}

/// `WITH` that opens a query: first token, or right after `(`
fn starts_query(tokens: &[Token], idx: usize) -> bool {
    idx == 0 || tokens[idx - 1].is_punct("(")
}

/// Names declared by the WITH clause at `with_idx`:
/// `WITH [RECURSIVE] name [(cols)] AS [[NOT] MATERIALIZED] (...) [, ...]`
fn with_clause_names(tokens: &[Token], with_idx: usize) -> HashSet<String> {
    let mut names = HashSet::new();
    let mut pos = with_idx + 1;
    if tokens.get(pos).map_or(false, |t| t.is_word("RECURSIVE")) {
        pos += 1;
    }

    loop {
        let name = match tokens.get(pos) {
            Some(t) if matches!(t.kind, TokenKind::Word | TokenKind::QuotedIdent) => t,
            _ => break,
        };
        pos += 1;
        if tokens.get(pos).map_or(false, |t| t.is_punct("(")) {
            match matching_paren(tokens, pos) {
                Some(close) => pos = close + 1,
                None => break,
            }
        }
        if !tokens.get(pos).map_or(false, |t| t.is_word("AS")) {
            break;
        }
        pos += 1;
        while tokens
            .get(pos)
            .map_or(false, |t| t.is_word("NOT") || t.is_word("MATERIALIZED"))
        {
            pos += 1;
        }
        if !tokens.get(pos).map_or(false, |t| t.is_punct("(")) {
            break;
        }
        let close = match matching_paren(tokens, pos) {
            Some(close) => close,
            None => break,
        };
        if let Some(key) = name.ident_key() {
            names.insert(key);
        }
        pos = close + 1;
        if !tokens.get(pos).map_or(false, |t| t.is_punct(",")) {
            break;
        }
        pos += 1;
    }
    names
}

fn matching_paren(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, token) in tokens[open..].iter().enumerate() {
        if token.is_punct("(") {
            depth += 1;
        } else if token.is_punct(")") {
            depth -= 1;
            if depth == 0 {
                return Some(open + offset);
            }
        }
    }
    None
}
