//! Natural language to SQL pipeline with an execution gate
//!
//! `generate` runs strictly in sequence: read the schema, ask the model,
//! extract the fenced SQL, classify it, and only then decide whether to run
//! it. The safety decision is always taken before the source's `run` is
//! reached.

use binchicken_schema::{Capability, QueryResult, SchemaDescription, SchemaSource, SourceError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::extract::extract;
use crate::llm::{LanguageModel, ModelError};
use crate::prompt::{build_chat_request, GenerationRequest};
use crate::safety::{classify, join_keywords, MutatingKeyword, SafetyVerdict};

pub const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("No SQL block found in model response:\n{raw_response}")]
    NoSqlFound { raw_response: String },

    #[error(
        "Unsafe SQL query detected ({}): {sql}\nWill not execute as long as safe_mode is enabled",
        join_keywords(.keywords)
    )]
    UnsafeQuery {
        sql: String,
        keywords: Vec<MutatingKeyword>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Refuse to execute statements classified as unsafe
    pub safe_mode: bool,

    /// Upper bound on the model's response length
    pub max_tokens: u32,

    /// Send column lists with the table names when the source can describe them
    pub include_columns: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            safe_mode: true,
            max_tokens: DEFAULT_MAX_TOKENS,
            include_columns: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationResult {
    /// Statement returned without running it
    Statement { sql: String, verdict: SafetyVerdict },

    /// Statement run against the source
    Executed {
        sql: String,
        verdict: SafetyVerdict,
        result: QueryResult,
    },
}

impl GenerationResult {
    pub fn sql(&self) -> &str {
        match self {
            GenerationResult::Statement { sql, .. } | GenerationResult::Executed { sql, .. } => sql,
        }
    }

    pub fn verdict(&self) -> &SafetyVerdict {
        match self {
            GenerationResult::Statement { verdict, .. }
            | GenerationResult::Executed { verdict, .. } => verdict,
        }
    }

    pub fn result(&self) -> Option<&QueryResult> {
        match self {
            GenerationResult::Statement { .. } => None,
            GenerationResult::Executed { result, .. } => Some(result),
        }
    }
}

pub struct QueryGenerationService<M> {
    model: M,
    config: GenerationConfig,
}

impl<M: LanguageModel> QueryGenerationService<M> {
    pub fn new(model: M) -> Self {
        Self::with_config(model, GenerationConfig::default())
    }

    pub fn with_config(model: M, config: GenerationConfig) -> Self {
        Self { model, config }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn safe_mode(&self) -> bool {
        self.config.safe_mode
    }

    /// Turn `prompt` into SQL for `source` and, if `execute` is set, run it.
    ///
    /// With `execute == false` the source is only introspected, never run.
    /// With `execute == true` an unsafe statement fails with
    /// [`GenerateError::UnsafeQuery`] while `safe_mode` is on. With
    /// `safe_mode` off, any statement runs, including mutating ones.
    pub async fn generate<S>(
        &self,
        source: &S,
        prompt: &str,
        execute: bool,
    ) -> Result<GenerationResult, GenerateError>
    where
        S: SchemaSource + ?Sized,
    {
        let request = GenerationRequest {
            natural_language_prompt: prompt.to_string(),
            schema: self.schema_description(source)?,
            execute,
        };
        tracing::info!(
            backend = source.backend(),
            tables = request.schema.tables().len(),
            execute,
            "generating SQL"
        );

        let chat = build_chat_request(&request, self.config.max_tokens);
        let raw_response = self.model.complete(&chat).await?;
        tracing::debug!(response = %raw_response, "raw model response");

        let sql = extract(&raw_response).ok_or_else(|| GenerateError::NoSqlFound {
            raw_response: raw_response.clone(),
        })?;
        let verdict = classify(&sql);
        tracing::info!(%sql, %verdict, "generated SQL");

        if !request.execute {
            return Ok(GenerationResult::Statement { sql, verdict });
        }

        if let SafetyVerdict::Unsafe { keywords } = &verdict {
            if self.config.safe_mode {
                tracing::warn!(%sql, "refusing to execute unsafe statement");
                return Err(GenerateError::UnsafeQuery {
                    sql,
                    keywords: keywords.clone(),
                });
            }
            tracing::warn!(%sql, "safe_mode disabled, executing unsafe statement");
        }

        let result = source.run(&sql)?;
        tracing::info!(rows = result.row_count, "statement executed");

        Ok(GenerationResult::Executed {
            sql,
            verdict,
            result,
        })
    }

    fn schema_description<S>(&self, source: &S) -> Result<SchemaDescription, SourceError>
    where
        S: SchemaSource + ?Sized,
    {
        if self.config.include_columns && source.supports(Capability::DescribeTables) {
            source.describe_tables()
        } else {
            Ok(SchemaDescription::from_table_names(source.list_tables()?))
        }
    }
}
