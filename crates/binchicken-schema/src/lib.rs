//! Backend-independent view of a relational data source
//!
//! A [`SchemaSource`] lists tables, executes statements, and implements some
//! subset of the optional introspection [`Capability`] set. Backends declare
//! exactly which capabilities they support; calling one they don't fails with
//! [`SourceError::NotSupported`] instead of returning empty data.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod types;
pub use types::*;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("{backend} does not support {capability}")]
    NotSupported {
        backend: &'static str,
        capability: Capability,
    },

    #[error("Query failed: {message}\nSQL: {sql}")]
    Query { sql: String, message: String },
}

impl SourceError {
    pub fn query(sql: impl Into<String>, err: impl fmt::Display) -> Self {
        SourceError::Query {
            sql: sql.into(),
            message: err.to_string(),
        }
    }
}

/// Optional introspection features a backend may implement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    DescribeTables,
    TableSizes,
    RowCounts,
    IndexUsage,
    QueryPerformance,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::DescribeTables,
        Capability::TableSizes,
        Capability::RowCounts,
        Capability::IndexUsage,
        Capability::QueryPerformance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::DescribeTables => "describe_tables",
            Capability::TableSizes => "table_sizes",
            Capability::RowCounts => "row_counts",
            Capability::IndexUsage => "index_usage",
            Capability::QueryPerformance => "query_performance",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A connected data backend that can be introspected and queried.
///
/// `list_tables` and `run` are mandatory. Every other method belongs to a
/// [`Capability`]; the default implementations fail with `NotSupported`, so a
/// backend overrides exactly the ones it lists in [`capabilities`].
///
/// [`capabilities`]: SchemaSource::capabilities
pub trait SchemaSource {
    /// Short backend name used in errors and logs (e.g. "sqlite")
    fn backend(&self) -> &'static str;

    /// Capabilities this backend implements
    fn capabilities(&self) -> &'static [Capability];

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Table names in the order the backend reports them
    fn list_tables(&self) -> Result<Vec<String>, SourceError>;

    /// Execute a statement and return its tabular output unmodified
    fn run(&self, sql: &str) -> Result<QueryResult, SourceError>;

    fn describe_tables(&self) -> Result<SchemaDescription, SourceError> {
        Err(self.unsupported(Capability::DescribeTables))
    }

    /// Storage size of each table in megabytes
    fn table_sizes(&self) -> Result<BTreeMap<String, f64>, SourceError> {
        Err(self.unsupported(Capability::TableSizes))
    }

    /// Exact row count of each table
    fn row_counts(&self) -> Result<BTreeMap<String, u64>, SourceError> {
        Err(self.unsupported(Capability::RowCounts))
    }

    /// Number of times each index has been used
    fn index_usage(&self) -> Result<BTreeMap<String, u64>, SourceError> {
        Err(self.unsupported(Capability::IndexUsage))
    }

    /// Execution time in milliseconds of recently observed statements
    fn query_performance(&self) -> Result<BTreeMap<String, f64>, SourceError> {
        Err(self.unsupported(Capability::QueryPerformance))
    }

    /// Join `table_sizes` and `row_counts` into one snapshot.
    ///
    /// Tables missing from either map are left out.
    fn table_metrics(&self) -> Result<TableMetrics, SourceError> {
        let sizes = self.table_sizes()?;
        let mut counts = self.row_counts()?;

        Ok(sizes
            .into_iter()
            .filter_map(|(table, size_mb)| {
                counts
                    .remove(&table)
                    .map(|row_count| (table, TableMetric { size_mb, row_count }))
            })
            .collect())
    }

    fn unsupported(&self, capability: Capability) -> SourceError {
        SourceError::NotSupported {
            backend: self.backend(),
            capability,
        }
    }
}

/// Quote an identifier for interpolation into SQL text
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
