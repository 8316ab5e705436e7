//! Schema Context
//!
//! The whitelist of queryable tables and the description handed to the SQL
//! generator. Loaded once; replaced only as a whole.

use crate::error::{ClearQuoteError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub type_tag: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub references_table: String,
    pub references_column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
}

/// Immutable description of the tables a generated query may touch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaContext {
    pub database: String,
    pub tables: Vec<TableDescriptor>,
    /// `schema.table` pairs that may appear qualified. Empty by default.
    #[serde(default)]
    pub qualified_whitelist: Vec<String>,
    /// Free-text guidance appended to the generator prompt
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(skip)]
    index: HashSet<String>,
}

impl SchemaContext {
    pub fn new(
        database: impl Into<String>,
        tables: Vec<TableDescriptor>,
        qualified_whitelist: Vec<String>,
        notes: Vec<String>,
    ) -> Self {
        let mut schema = Self {
            database: database.into(),
            tables,
            qualified_whitelist: qualified_whitelist
                .into_iter()
                .map(|q| q.to_lowercase())
                .collect(),
            notes,
            index: HashSet::new(),
        };
        schema.rebuild_index();
        schema
    }

    /// The built-in ClearQuote schema
    pub fn describe() -> Self {
        super::clear_quote::clear_quote_schema()
    }

    /// Load a schema description from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClearQuoteError::Schema(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let mut schema: SchemaContext = serde_json::from_str(&content)?;
        if schema.tables.is_empty() {
            return Err(ClearQuoteError::Schema(format!(
                "{} declares no tables",
                path.display()
            )));
        }
        schema.qualified_whitelist = schema
            .qualified_whitelist
            .iter()
            .map(|q| q.to_lowercase())
            .collect();
        schema.rebuild_index();
        Ok(schema)
    }

    fn rebuild_index(&mut self) {
        self.index = self.tables.iter().map(|t| t.name.to_lowercase()).collect();
    }

    /// Case-insensitive table lookup for unquoted identifiers
    pub fn contains(&self, table_name: &str) -> bool {
        self.index.contains(&table_name.to_lowercase())
    }

    /// Exact lookup for quoted identifiers
    pub fn contains_exact(&self, table_name: &str) -> bool {
        self.tables.iter().any(|t| t.name == table_name)
    }

    pub fn contains_qualified(&self, schema: &str, table: &str) -> bool {
        let qualified = format!("{}.{}", schema.to_lowercase(), table.to_lowercase());
        self.qualified_whitelist.contains(&qualified)
    }

    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        let lowered = name.to_lowercase();
        self.tables.iter().find(|t| t.name.to_lowercase() == lowered)
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// Render the schema as prompt context for the SQL generator
    pub fn prompt_context(&self) -> String {
        let mut parts = Vec::new();
        parts.push(format!(
            "You are working with a PostgreSQL database called '{}'.",
            self.database
        ));
        parts.push(format!(
            "The database contains exactly the following {} tables. You must ONLY query these tables.",
            self.tables.len()
        ));

        for (idx, table) in self.tables.iter().enumerate() {
            parts.push(format!("\nTABLE {} - {}", idx + 1, table.name));
            for column in &table.columns {
                let mut line = format!("  {:<22} {}", column.name, column.type_tag);
                if let Some(ref note) = column.note {
                    line.push_str("  ");
                    line.push_str(note);
                }
                parts.push(line);
            }
            for fk in &table.foreign_keys {
                parts.push(format!(
                    "  FK {} -> {}.{}",
                    fk.column, fk.references_table, fk.references_column
                ));
            }
        }

        if !self.notes.is_empty() {
            parts.push("\nIMPORTANT NOTES FOR SQL GENERATION".to_string());
            for note in &self.notes {
                parts.push(format!("- {}", note));
            }
        }

        parts.join("\n")
    }
}

/// Process-wide schema holder. Readers take a snapshot; reloads swap the whole `Arc`.
#[derive(Debug)]
pub struct SchemaHandle {
    current: RwLock<Arc<SchemaContext>>,
}

impl SchemaHandle {
    pub fn new(schema: SchemaContext) -> Self {
        Self {
            current: RwLock::new(Arc::new(schema)),
        }
    }

    pub fn snapshot(&self) -> Arc<SchemaContext> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn replace(&self, schema: SchemaContext) {
        let next = Arc::new(schema);
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}

impl Default for SchemaHandle {
    fn default() -> Self {
        Self::new(SchemaContext::describe())
    }
}
