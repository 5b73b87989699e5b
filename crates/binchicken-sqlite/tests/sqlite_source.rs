//! Introspection and execution against a real in-memory SQLite database

use binchicken_schema::{pages_to_megabytes, Capability, SchemaSource, SourceError};
use binchicken_sqlite::SqliteSource;

fn sample_source() -> SqliteSource {
    let source = SqliteSource::open_in_memory().unwrap();
    source
        .connection()
        .execute_batch(
            "PRAGMA page_size = 4096;
             CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER);
             CREATE TABLE orders (id INTEGER PRIMARY KEY, user_id INTEGER, total REAL);
             CREATE TABLE empty (id INTEGER);
             INSERT INTO users (name, age) VALUES ('Alice', 30), ('Bob', 25), ('Carol', 41);
             INSERT INTO orders (user_id, total) VALUES (1, 9.5), (1, 20.0);",
        )
        .unwrap();
    source
}

#[test]
fn test_list_tables_in_creation_order() {
    let source = sample_source();
    assert_eq!(source.list_tables().unwrap(), vec!["users", "orders", "empty"]);
}

#[test]
fn test_internal_tables_are_hidden() {
    let source = SqliteSource::open_in_memory().unwrap();
    source
        .connection()
        .execute_batch("CREATE TABLE seq (id INTEGER PRIMARY KEY AUTOINCREMENT); INSERT INTO seq DEFAULT VALUES;")
        .unwrap();

    assert_eq!(source.list_tables().unwrap(), vec!["seq"]);
}

#[test]
fn test_row_counts_are_exact() {
    let counts = sample_source().row_counts().unwrap();
    assert_eq!(counts["users"], 3);
    assert_eq!(counts["orders"], 2);
    assert_eq!(counts["empty"], 0);
}

#[test]
fn test_table_sizes_use_page_accounting() {
    let source = sample_source();
    let sizes = source.table_sizes().unwrap();

    assert_eq!(sizes.len(), 3);
    // A table with no rows still owns its root page
    assert_eq!(sizes["empty"], pages_to_megabytes(1, 4096));

    let users_pages: i64 = source
        .connection()
        .query_row("SELECT COUNT(*) FROM dbstat WHERE name = 'users'", [], |row| row.get(0))
        .unwrap();
    assert_eq!(sizes["users"], pages_to_megabytes(users_pages as u64, 4096));
}

#[test]
fn test_table_metrics() {
    let metrics = sample_source().table_metrics().unwrap();
    assert_eq!(metrics["users"].row_count, 3);
    assert!(metrics["users"].size_mb > 0.0);
}

#[test]
fn test_describe_tables() {
    let schema = sample_source().describe_tables().unwrap();
    let users = &schema.tables()[0];

    assert_eq!(users.name, "users");
    let names: Vec<&str> = users.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "name", "age"]);
    assert_eq!(users.columns[1].data_type, "TEXT");
    assert!(!users.columns[1].nullable);
    assert!(users.columns[2].nullable);
}

#[test]
fn test_run_select_returns_rows() {
    let result = sample_source()
        .run("SELECT name, age FROM users WHERE age > 26 ORDER BY age")
        .unwrap();

    assert_eq!(result.columns, vec!["name", "age"]);
    assert_eq!(result.row_count, 2);
    assert_eq!(result.rows[0], vec![serde_json::json!("Alice"), serde_json::json!(30)]);
    assert_eq!(result.rows[1], vec![serde_json::json!("Carol"), serde_json::json!(41)]);
}

#[test]
fn test_run_mutating_statement() {
    let source = sample_source();
    let result = source.run("DELETE FROM orders").unwrap();
    assert_eq!(result.row_count, 0);
    assert_eq!(source.row_counts().unwrap()["orders"], 0);
}

#[test]
fn test_run_invalid_sql_reports_statement() {
    let err = sample_source().run("SELECT * FROM missing").unwrap_err();
    match err {
        SourceError::Query { sql, .. } => assert_eq!(sql, "SELECT * FROM missing"),
        other => panic!("expected Query error, got {other:?}"),
    }
}

#[test]
fn test_capabilities_match_behavior() {
    let source = sample_source();
    assert!(source.supports(Capability::TableSizes));
    assert!(source.supports(Capability::RowCounts));
    assert!(source.supports(Capability::DescribeTables));

    assert!(!source.supports(Capability::IndexUsage));
    assert!(matches!(
        source.index_usage(),
        Err(SourceError::NotSupported {
            capability: Capability::IndexUsage,
            ..
        })
    ));
    assert!(matches!(
        source.query_performance(),
        Err(SourceError::NotSupported {
            capability: Capability::QueryPerformance,
            ..
        })
    ));
}

#[test]
fn test_wraps_existing_connection() {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    conn.execute_batch("CREATE TABLE events (id INTEGER); INSERT INTO events VALUES (1), (2);")
        .unwrap();

    let source = SqliteSource::from_connection(conn);
    assert_eq!(source.list_tables().unwrap(), vec!["events"]);
    assert_eq!(source.row_counts().unwrap()["events"], 2);
}
