//! Validation outcome types

use crate::reason::ReasonCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A statement that passed every rule. Only the validator can build one, and
/// it is the only input the executor accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcceptedStatement {
    normalized: String,
    referenced_tables: BTreeSet<String>,
}

impl AcceptedStatement {
    pub(crate) fn new(normalized: String, referenced_tables: BTreeSet<String>) -> Self {
        Self {
            normalized,
            referenced_tables,
        }
    }

    /// Comment-free, whitespace-collapsed text without trailing separators
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn referenced_tables(&self) -> &BTreeSet<String> {
        &self.referenced_tables
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub reason: ReasonCode,
    /// Offending fragment, for logs only
    pub fragment: String,
}

impl Rejection {
    pub fn new(reason: ReasonCode, fragment: &str) -> Self {
        Self {
            reason,
            fragment: fragment.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationVerdict {
    Accepted(AcceptedStatement),
    Rejected(Rejection),
}

impl ValidationVerdict {
    pub fn reason(&self) -> Option<ReasonCode> {
        match self {
            ValidationVerdict::Accepted(_) => None,
            ValidationVerdict::Rejected(rejection) => Some(rejection.reason),
        }
    }

    pub fn accepted(&self) -> Option<&AcceptedStatement> {
        match self {
            ValidationVerdict::Accepted(statement) => Some(statement),
            ValidationVerdict::Rejected(_) => None,
        }
    }

    pub fn into_result(self) -> Result<AcceptedStatement, Rejection> {
        match self {
            ValidationVerdict::Accepted(statement) => Ok(statement),
            ValidationVerdict::Rejected(rejection) => Err(rejection),
        }
    }
}
