//! Typed query results

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Rows returned by one execution, columns in select-list order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
}

impl RowSet {
    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    /// Build from `row_to_json` objects. Column order is taken from the first
    /// object; at most `limit` rows are kept.
    pub fn from_json_objects(objects: Vec<Map<String, Value>>, limit: usize) -> Self {
        let columns: Vec<String> = objects
            .first()
            .map(|first| first.keys().cloned().collect())
            .unwrap_or_default();

        let rows: Vec<Vec<Value>> = objects
            .into_iter()
            .take(limit)
            .map(|mut object| {
                columns
                    .iter()
                    .map(|c| object.remove(c).unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Self {
            row_count: rows.len(),
            columns,
            rows,
        }
    }

    /// Rows as JSON objects keyed by column name
    pub fn to_json_rows(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| {
                let object: Map<String, Value> = self
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect();
                Value::Object(object)
            })
            .collect()
    }
}
