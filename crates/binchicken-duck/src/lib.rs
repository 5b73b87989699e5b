//! DuckDB schema source
//!
//! Tables and columns are read from `information_schema`. DuckDB stores data
//! in shared row groups rather than per-table pages, so table sizes are not
//! reported.

use std::collections::BTreeMap;
use std::path::Path;

use binchicken_schema::{
    quote_identifier, Capability, ColumnInfo, QueryResult, SchemaDescription, SchemaSource,
    SourceError, TableSchema,
};
use duckdb::{types::ValueRef, Connection};

const CAPABILITIES: &[Capability] = &[Capability::DescribeTables, Capability::RowCounts];

const LIST_TABLES_SQL: &str = "SELECT table_name FROM information_schema.tables \
     WHERE table_schema = 'main' AND table_type = 'BASE TABLE' \
     ORDER BY table_name";

const COLUMNS_SQL: &str = "SELECT column_name, data_type, is_nullable \
     FROM information_schema.columns \
     WHERE table_schema = 'main' AND table_name = ? \
     ORDER BY ordinal_position";

pub struct DuckSource {
    conn: Connection,
}

impl DuckSource {
    /// Open an existing database file. The file must already exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SourceError::Connection(format!(
                "failed to open {}: no such database file",
                path.display()
            )));
        }
        let conn = Connection::open(path).map_err(|e| {
            SourceError::Connection(format!("failed to open {}: {}", path.display(), e))
        })?;
        tracing::debug!(path = %path.display(), "opened duckdb database");
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, SourceError> {
        let conn =
            Connection::open_in_memory().map_err(|e| SourceError::Connection(e.to_string()))?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>, SourceError> {
        let mut stmt = self
            .conn
            .prepare(COLUMNS_SQL)
            .map_err(|e| SourceError::query(COLUMNS_SQL, e))?;

        let columns = stmt
            .query_map([table], |row| {
                Ok(ColumnInfo {
                    name: row.get(0)?,
                    data_type: row.get(1)?,
                    nullable: row.get::<_, String>(2)? == "YES",
                })
            })
            .and_then(|rows| rows.collect::<duckdb::Result<Vec<_>>>())
            .map_err(|e| SourceError::query(COLUMNS_SQL, e))?;

        Ok(columns)
    }
}

impl SchemaSource for DuckSource {
    fn backend(&self) -> &'static str {
        "duckdb"
    }

    fn capabilities(&self) -> &'static [Capability] {
        CAPABILITIES
    }

    fn list_tables(&self) -> Result<Vec<String>, SourceError> {
        let mut stmt = self
            .conn
            .prepare(LIST_TABLES_SQL)
            .map_err(|e| SourceError::Connection(e.to_string()))?;

        let tables = stmt
            .query_map([], |row| row.get(0))
            .and_then(|rows| rows.collect::<duckdb::Result<Vec<String>>>())
            .map_err(|e| SourceError::Connection(e.to_string()))?;

        Ok(tables)
    }

    fn run(&self, sql: &str) -> Result<QueryResult, SourceError> {
        tracing::debug!(sql, "executing statement");

        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| SourceError::query(sql, e))?;

        let mut result_rows = Vec::new();
        {
            let mut rows = stmt.query([]).map_err(|e| SourceError::query(sql, e))?;

            while let Some(row) = rows.next().map_err(|e| SourceError::query(sql, e))? {
                let column_count = row.as_ref().column_count();
                let mut json_row = Vec::with_capacity(column_count);
                for i in 0..column_count {
                    let value = row.get_ref(i).map_err(|e| SourceError::query(sql, e))?;
                    json_row.push(value_to_json(value));
                }
                result_rows.push(json_row);
            }
        }

        // Column names are only available once the statement has executed
        let columns = stmt.column_names();
        let row_count = result_rows.len();

        Ok(QueryResult {
            columns,
            rows: result_rows,
            row_count,
        })
    }

    fn describe_tables(&self) -> Result<SchemaDescription, SourceError> {
        let mut tables = Vec::new();
        for name in self.list_tables()? {
            let columns = self.columns(&name)?;
            tables.push(TableSchema { name, columns });
        }
        Ok(SchemaDescription::new(tables))
    }

    fn row_counts(&self) -> Result<BTreeMap<String, u64>, SourceError> {
        let mut counts = BTreeMap::new();
        for table in self.list_tables()? {
            let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(&table));
            let count: i64 = self
                .conn
                .query_row(&sql, [], |row| row.get(0))
                .map_err(|e| SourceError::query(&sql, e))?;
            counts.insert(table, count as u64);
        }
        Ok(counts)
    }
}

fn value_to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Boolean(b) => serde_json::Value::Bool(b),
        ValueRef::TinyInt(i) => serde_json::json!(i),
        ValueRef::SmallInt(i) => serde_json::json!(i),
        ValueRef::Int(i) => serde_json::json!(i),
        ValueRef::BigInt(i) => serde_json::json!(i),
        ValueRef::HugeInt(i) => i64::try_from(i)
            .map(serde_json::Value::from)
            .unwrap_or_else(|_| serde_json::Value::String(i.to_string())),
        ValueRef::UTinyInt(i) => serde_json::json!(i),
        ValueRef::USmallInt(i) => serde_json::json!(i),
        ValueRef::UInt(i) => serde_json::json!(i),
        ValueRef::UBigInt(i) => serde_json::json!(i),
        ValueRef::Float(f) => serde_json::json!(f),
        ValueRef::Double(f) => serde_json::json!(f),
        ValueRef::Decimal(d) => serde_json::Value::String(d.to_string()),
        ValueRef::Text(s) => serde_json::Value::String(String::from_utf8_lossy(s).to_string()),
        ValueRef::Blob(b) => serde_json::Value::String(format!("<blob {} bytes>", b.len())),
        other => serde_json::Value::String(format!("{:?}", other)),
    }
}
