//! Chat payload construction

use binchicken_schema::SchemaDescription;

use crate::llm::{ChatMessage, ChatRequest};

/// Formatting contract the extractor relies on
const FORMAT_INSTRUCTIONS: &str = "Translate the user's request into a single SQL query \
against the database described above. Respond with the query only, inside one fenced \
code block tagged sql (```sql ... ```), and say NOTHING else.";

/// One natural-language question against a given schema
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub natural_language_prompt: String,
    pub schema: SchemaDescription,
    pub execute: bool,
}

/// System message: schema context followed by the output format instructions
pub fn system_message(schema: &SchemaDescription) -> String {
    let mut content = String::from("Here is the DB structure:\n\n");
    if schema.is_empty() {
        content.push_str("(the database has no tables)\n\n");
    } else {
        content.push_str("The DB Schema is as follows:\n");
        content.push_str(&schema.to_prompt_text());
    }
    content.push_str(FORMAT_INSTRUCTIONS);
    content
}

/// Two-message exchange: schema and instructions as system, the literal request as user
pub fn build_chat_request(request: &GenerationRequest, max_tokens: u32) -> ChatRequest {
    ChatRequest {
        messages: vec![
            ChatMessage::system(system_message(&request.schema)),
            ChatMessage::user(request.natural_language_prompt.as_str()),
        ],
        max_tokens,
    }
}
