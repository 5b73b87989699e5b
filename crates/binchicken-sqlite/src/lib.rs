//! SQLite schema source
//!
//! Table sizes come from page accounting: the number of pages each table
//! occupies (read from the `dbstat` virtual table) times `PRAGMA page_size`.
//! No table data is scanned to compute a size.

use std::collections::BTreeMap;
use std::path::Path;

use binchicken_schema::{
    pages_to_megabytes, quote_identifier, Capability, ColumnInfo, QueryResult, SchemaDescription,
    SchemaSource, SourceError, TableSchema,
};
use rusqlite::{types::ValueRef, Connection, OpenFlags};

const CAPABILITIES: &[Capability] = &[
    Capability::DescribeTables,
    Capability::TableSizes,
    Capability::RowCounts,
];

const LIST_TABLES_SQL: &str = "SELECT name FROM sqlite_master \
     WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
     ORDER BY rowid";

pub struct SqliteSource {
    conn: Connection,
}

impl SqliteSource {
    /// Open an existing database file. The file must already exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI;
        let conn = Connection::open_with_flags(path, flags).map_err(|e| {
            SourceError::Connection(format!("failed to open {}: {}", path.display(), e))
        })?;
        tracing::debug!(path = %path.display(), "opened sqlite database");
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

    fn page_size(&self) -> Result<u64, SourceError> {
        let sql = "PRAGMA page_size";
        let size: i64 = self
            .conn
            .query_row(sql, [], |row| row.get(0))
            .map_err(|e| SourceError::query(sql, e))?;
        Ok(size as u64)
    }

    fn page_count(&self, table: &str) -> Result<u64, SourceError> {
        let sql = "SELECT COUNT(*) FROM dbstat WHERE name = ?1";
        let count: i64 = self
            .conn
            .query_row(sql, [table], |row| row.get(0))
            .map_err(|e| SourceError::query(sql, e))?;
        Ok(count as u64)
    }

    fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>, SourceError> {
        let sql = "SELECT name, type, \"notnull\" FROM pragma_table_info(?1) ORDER BY cid";
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| SourceError::query(sql, e))?;

        let columns = stmt
            .query_map([table], |row| {
                Ok(ColumnInfo {
                    name: row.get(0)?,
                    data_type: row.get(1)?,
                    nullable: row.get::<_, i64>(2)? == 0,
                })
            })
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|e| SourceError::query(sql, e))?;

        Ok(columns)
    }
}

impl SchemaSource for SqliteSource {
    fn backend(&self) -> &'static str {
        "sqlite"
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
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<String>>>())
            .map_err(|e| SourceError::Connection(e.to_string()))?;

        Ok(tables)
    }

    fn run(&self, sql: &str) -> Result<QueryResult, SourceError> {
        tracing::debug!(sql, "executing statement");

        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| SourceError::query(sql, e))?;

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let column_count = columns.len();

        let mut rows = stmt.query([]).map_err(|e| SourceError::query(sql, e))?;
        let mut result_rows = Vec::new();

        while let Some(row) = rows.next().map_err(|e| SourceError::query(sql, e))? {
            let mut json_row = Vec::with_capacity(column_count);
            for i in 0..column_count {
                let value = row.get_ref(i).map_err(|e| SourceError::query(sql, e))?;
                json_row.push(value_to_json(value));
            }
            result_rows.push(json_row);
        }

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

    fn table_sizes(&self) -> Result<BTreeMap<String, f64>, SourceError> {
        let tables = self.list_tables()?;
        let page_size = self.page_size()?;

        let mut sizes = BTreeMap::new();
        for table in tables {
            let pages = self.page_count(&table)?;
            sizes.insert(table, pages_to_megabytes(pages, page_size));
        }
        Ok(sizes)
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
        ValueRef::Integer(i) => serde_json::json!(i),
        ValueRef::Real(f) => serde_json::json!(f),
        ValueRef::Text(s) => serde_json::Value::String(String::from_utf8_lossy(s).to_string()),
        ValueRef::Blob(b) => serde_json::Value::String(format!("<blob {} bytes>", b.len())),
    }
}
