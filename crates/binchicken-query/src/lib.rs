//! Natural-language to SQL generation gated by a safety check
//!
//! The pipeline asks a [`LanguageModel`] for a statement against a
//! [`SchemaSource`](binchicken_schema::SchemaSource), pulls the fenced SQL
//! out of the answer, classifies it as read-only or mutating, and executes it
//! only when allowed.

pub mod extract;
pub mod llm;
pub mod prompt;
pub mod safety;
pub mod service;

pub use extract::extract;
pub use llm::{ChatMessage, ChatRequest, LanguageModel, ModelError, OpenAiModel, Role};
pub use prompt::GenerationRequest;
pub use safety::{classify, MutatingKeyword, SafetyVerdict};
pub use service::{
    GenerateError, GenerationConfig, GenerationResult, QueryGenerationService, DEFAULT_MAX_TOKENS,
};
