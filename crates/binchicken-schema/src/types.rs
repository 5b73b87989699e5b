//! Value types produced by schema sources

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const BYTES_PER_MEGABYTE: f64 = 1024.0 * 1024.0;

/// Convert a page count into megabytes for page-based storage engines
pub fn pages_to_megabytes(page_count: u64, page_size: u64) -> f64 {
    (page_count as f64 * page_size as f64) / BYTES_PER_MEGABYTE
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<ColumnInfo>,
}

/// Tables in the order the source reported them, optionally with columns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescription {
    tables: Vec<TableSchema>,
}

impl SchemaDescription {
    pub fn new(tables: Vec<TableSchema>) -> Self {
        Self { tables }
    }

    /// Build a description that only knows table names
    pub fn from_table_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: names
                .into_iter()
                .map(|name| TableSchema {
                    name: name.into(),
                    columns: Vec::new(),
                })
                .collect(),
        }
    }

    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Render as plain text for embedding in a prompt.
    ///
    /// One table per paragraph; when columns are known they follow the table
    /// name as `  - name TYPE` lines.
    pub fn to_prompt_text(&self) -> String {
        let mut out = String::new();
        for table in &self.tables {
            out.push_str(&table.name);
            out.push('\n');
            for col in &table.columns {
                out.push_str(&format!("  - {} {}", col.name, col.data_type));
                if !col.nullable {
                    out.push_str(" NOT NULL");
                }
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TableMetric {
    pub size_mb: f64,
    pub row_count: u64,
}

/// Snapshot of per-table size and row count
pub type TableMetrics = BTreeMap<String, TableMetric>;

/// Tabular output of a statement, exactly as produced by the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub row_count: usize,
}
