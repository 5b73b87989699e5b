//! Language-model chat interface and the OpenAI-backed implementation

use async_openai::{
    config::OpenAIConfig,
    error::{ApiError, OpenAIError},
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

#[derive(Debug, Error)]
pub enum ModelError {
    /// Network failure, timeout, malformed or empty response
    #[error("Language model unavailable: {0}")]
    Unavailable(String),

    /// Rate limit or billing quota exhausted
    #[error("Language model quota exceeded: {0}")]
    Quota(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

/// A chat endpoint: role-tagged messages in, one text completion out
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ModelError>;
}

#[async_trait]
impl<M: LanguageModel + ?Sized> LanguageModel for Box<M> {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ModelError> {
        (**self).complete(request).await
    }
}

#[async_trait]
impl<M: LanguageModel + ?Sized> LanguageModel for Arc<M> {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ModelError> {
        (**self).complete(request).await
    }
}

/// OpenAI chat completions (or any endpoint speaking the same protocol)
pub struct OpenAiModel {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
}

impl OpenAiModel {
    /// Wrap an existing client; its backoff policy is used as is
    pub fn new(client: Client<OpenAIConfig>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: 0.0,
        }
    }

    /// Build a client from an API key and an optional base URL
    ///
    /// The client never retries: rate limits surface as [`ModelError::Quota`].
    pub fn from_api_key(
        api_key: impl Into<String>,
        base_url: Option<&str>,
        model: impl Into<String>,
    ) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = base_url {
            config = config.with_api_base(base);
        }
        Self::new(Client::with_config(config).with_backoff(no_retry()), model)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ModelError> {
        let messages = request
            .messages
            .iter()
            .map(to_openai_message)
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_openai_error)?;

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .max_completion_tokens(request.max_tokens)
            .temperature(self.temperature)
            .build()
            .map_err(map_openai_error)?;

        tracing::debug!(model = %self.model, max_tokens = request.max_tokens, "calling chat completion");

        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(map_openai_error)?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ModelError::Unavailable("No response from OpenAI".to_string()))
    }
}

fn no_retry() -> backoff::ExponentialBackoff {
    backoff::ExponentialBackoffBuilder::new()
        .with_max_elapsed_time(Some(Duration::ZERO))
        .build()
}

fn to_openai_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage, OpenAIError> {
    Ok(match message.role {
        Role::System => ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(message.content.as_str())
                .build()?,
        ),
        Role::User => ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(message.content.as_str())
                .build()?,
        ),
    })
}

fn map_openai_error(err: OpenAIError) -> ModelError {
    match err {
        OpenAIError::ApiError(api) if is_quota_error(&api) => ModelError::Quota(api.message),
        other => ModelError::Unavailable(other.to_string()),
    }
}

fn is_quota_error(api: &ApiError) -> bool {
    let kind = api.r#type.as_deref().unwrap_or_default();
    let code = api.code.as_deref().unwrap_or_default();
    let message = api.message.to_ascii_lowercase();

    matches!(kind, "insufficient_quota" | "requests" | "tokens")
        || code.starts_with("rate_limit")
        || code == "insufficient_quota"
        || message.contains("rate limit")
        || message.contains("quota")
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn api_error(kind: Option<&str>, message: &str) -> OpenAIError {
        let api: ApiError = serde_json::from_value(serde_json::json!({
            "message": message,
            "type": kind,
        }))
        .unwrap();
        OpenAIError::ApiError(api)
    }

    /// Serve one HTTP response to every connection, counting requests
    async fn serve_status(status: &'static str, body: String) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let body = body.clone();
                tokio::spawn(async move {
                    read_request(&mut socket).await;
                    let response = format!(
                        "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        (format!("http://{addr}/v1"), hits)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let Ok(n) = socket.read(&mut chunk).await else {
                return;
            };
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let content_length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + content_length {
                    return;
                }
            }
        }
    }

    fn count_request() -> ChatRequest {
        ChatRequest {
            messages: vec![ChatMessage::user("count users")],
            max_tokens: 64,
        }
    }

    #[test]
    fn test_quota_errors() {
        let err = map_openai_error(api_error(
            Some("insufficient_quota"),
            "You exceeded your current quota",
        ));
        assert!(matches!(err, ModelError::Quota(_)));

        let err = map_openai_error(api_error(
            Some("requests"),
            "Rate limit reached for gpt-3.5-turbo",
        ));
        assert!(matches!(err, ModelError::Quota(_)));
    }

    #[test]
    fn test_rate_limit_code_is_quota() {
        let api: ApiError = serde_json::from_value(serde_json::json!({
            "message": "Please slow down",
            "code": "rate_limit_exceeded",
        }))
        .unwrap();
        let err = map_openai_error(OpenAIError::ApiError(api));
        assert!(matches!(err, ModelError::Quota(_)));
    }

    #[tokio::test]
    async fn test_rate_limited_response_is_not_retried() {
        let body = serde_json::json!({
            "error": {
                "message": "Too many requests",
                "type": "requests",
                "param": null,
                "code": "rate_limit_exceeded",
            }
        })
        .to_string();
        let (base_url, hits) = serve_status("429 Too Many Requests", body).await;

        let model = OpenAiModel::from_api_key("test-key", Some(&base_url), DEFAULT_MODEL);
        let result = tokio::time::timeout(Duration::from_secs(5), model.complete(&count_request()))
            .await
            .expect("rate limit should surface without retrying");

        assert!(matches!(result, Err(ModelError::Quota(_))), "got {result:?}");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable_without_retry() {
        let (base_url, hits) = serve_status("503 Service Unavailable", "overloaded".to_string()).await;

        let model = OpenAiModel::from_api_key("test-key", Some(&base_url), DEFAULT_MODEL);
        let result = tokio::time::timeout(Duration::from_secs(5), model.complete(&count_request()))
            .await
            .expect("server error should surface without retrying");

        assert!(matches!(result, Err(ModelError::Unavailable(_))), "got {result:?}");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_other_errors_are_unavailable() {
        let err = map_openai_error(api_error(
            Some("invalid_request_error"),
            "model does not exist",
        ));
        assert!(matches!(err, ModelError::Unavailable(_)));

        let err = map_openai_error(OpenAIError::InvalidArgument("bad".to_string()));
        assert!(matches!(err, ModelError::Unavailable(_)));
    }

    #[test]
    fn test_message_conversion() {
        let system = to_openai_message(&ChatMessage::system("schema")).unwrap();
        assert!(matches!(system, ChatCompletionRequestMessage::System(_)));

        let user = to_openai_message(&ChatMessage::user("count users")).unwrap();
        assert!(matches!(user, ChatCompletionRequestMessage::User(_)));
    }
}
