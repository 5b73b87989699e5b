//! Read-only vs. mutating classification of SQL text
//!
//! The check is a case-insensitive substring scan for a fixed set of
//! mutating keywords over the whole statement. It does not parse SQL: a
//! keyword inside a string literal, a comment or an identifier such as
//! `updated_at` also marks the statement unsafe. False positives are
//! accepted; a mutating statement must never be classified safe.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MutatingKeyword {
    Insert,
    Update,
    Delete,
    Drop,
    Alter,
}

impl MutatingKeyword {
    pub const ALL: [MutatingKeyword; 5] = [
        MutatingKeyword::Insert,
        MutatingKeyword::Update,
        MutatingKeyword::Delete,
        MutatingKeyword::Drop,
        MutatingKeyword::Alter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MutatingKeyword::Insert => "INSERT",
            MutatingKeyword::Update => "UPDATE",
            MutatingKeyword::Delete => "DELETE",
            MutatingKeyword::Drop => "DROP",
            MutatingKeyword::Alter => "ALTER",
        }
    }
}

impl fmt::Display for MutatingKeyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum SafetyVerdict {
    Safe,
    /// Matched keywords in [`MutatingKeyword::ALL`] order
    Unsafe { keywords: Vec<MutatingKeyword> },
}

impl SafetyVerdict {
    pub fn is_safe(&self) -> bool {
        matches!(self, SafetyVerdict::Safe)
    }

    pub fn keywords(&self) -> &[MutatingKeyword] {
        match self {
            SafetyVerdict::Safe => &[],
            SafetyVerdict::Unsafe { keywords } => keywords,
        }
    }
}

impl fmt::Display for SafetyVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyVerdict::Safe => f.write_str("safe"),
            SafetyVerdict::Unsafe { keywords } => {
                write!(f, "unsafe ({})", join_keywords(keywords))
            }
        }
    }
}

pub(crate) fn join_keywords(keywords: &[MutatingKeyword]) -> String {
    keywords
        .iter()
        .map(MutatingKeyword::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Classify a statement by the mutating keywords it contains
pub fn classify(sql: &str) -> SafetyVerdict {
    let upper = sql.to_ascii_uppercase();
    let keywords: Vec<MutatingKeyword> = MutatingKeyword::ALL
        .into_iter()
        .filter(|kw| upper.contains(kw.as_str()))
        .collect();

    if keywords.is_empty() {
        SafetyVerdict::Safe
    } else {
        SafetyVerdict::Unsafe { keywords }
    }
}
