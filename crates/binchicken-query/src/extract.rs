//! Locate the SQL statement inside a model's free-text answer

use regex::Regex;
use std::sync::OnceLock;

/// Opening fence tagged `sql`, everything up to the next closing fence.
///
/// The tag is case-sensitive and must be followed by whitespace, so
/// ```` ```sqlite ```` or ```` ```SQL ```` blocks are not recognized. Single
/// backticks (quoted identifiers) may appear in the body.
const FENCED_SQL_PATTERN: &str = r"(?s)```sql\s(.*?)```";

fn fenced_sql() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(FENCED_SQL_PATTERN).expect("fenced SQL pattern is valid"))
}

/// Return the body of the first fenced `sql` block in `text`, trimmed.
///
/// Internal whitespace and newlines are kept as written. Returns `None` when
/// there is no such block, or when the first one is empty; callers decide
/// whether to retry or surface the raw text. Later blocks are ignored.
pub fn extract(text: &str) -> Option<String> {
    let captures = fenced_sql().captures(text)?;
    let body = captures.get(1)?.as_str().trim();
    if body.is_empty() {
        return None;
    }
    Some(body.to_string())
}

/// Wrap a statement in a fenced `sql` block
pub fn fence(sql: &str) -> String {
    format!("```sql\n{}\n```", sql)
}
