//! Provider contract (C3): the seam every LLM backend implements.

use async_trait::async_trait;
use thiserror::Error;

use ghostclaw_security::ToolSpec;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("authentication failed")]
    AuthError,
    #[error("model not found")]
    ModelNotFound,
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("provider returned status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("failed to parse provider response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::NetworkError(err.to_string())
        }
    }
}

impl From<ghostclaw_core::http::HttpError> for ProviderError {
    fn from(err: ghostclaw_core::http::HttpError) -> Self {
        match err {
            ghostclaw_core::http::HttpError::Timeout => ProviderError::Timeout,
            ghostclaw_core::http::HttpError::Network(msg) => ProviderError::NetworkError(msg),
            ghostclaw_core::http::HttpError::Status { status, body } => ProviderError::Api { status, message: body },
        }
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// One emitted chunk of a streaming response (§4.3).
#[derive(Debug, Clone)]
pub enum StreamChunk {
    Token(String),
    Done,
}

pub type OnChunk<'a> = Box<dyn FnMut(StreamChunk) + Send + 'a>;

/// An LLM backend (§4.1). Implementors only need `chat_with_system`/`name`;
/// every other method has a default built in terms of it.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    async fn chat(&self, message: &str, model: &str, temperature: f32) -> Result<String> {
        self.chat_with_system(None, message, model, temperature).await
    }

    async fn chat_with_system(
        &self,
        system: Option<&str>,
        message: &str,
        model: &str,
        temperature: f32,
    ) -> Result<String>;

    /// Default falls back to `chat_with_system`, ignoring tool definitions —
    /// override when the backend supports native tool calling.
    async fn chat_with_system_tools(
        &self,
        system: Option<&str>,
        message: &str,
        model: &str,
        temperature: f32,
        _tools: &[ToolSpec],
    ) -> Result<String> {
        self.chat_with_system(system, message, model, temperature).await
    }

    /// Default tokenizes the final response by whitespace and emits it as a
    /// sequence of chunks, then `StreamChunk::Done` — override for real SSE
    /// streaming.
    async fn chat_with_system_stream(
        &self,
        system: Option<&str>,
        message: &str,
        model: &str,
        temperature: f32,
        on_chunk: OnChunk<'_>,
    ) -> Result<String> {
        let text = self.chat_with_system(system, message, model, temperature).await?;
        let mut on_chunk = on_chunk;
        for word in text.split_inclusive(' ') {
            on_chunk(StreamChunk::Token(word.to_string()));
        }
        on_chunk(StreamChunk::Done);
        Ok(text)
    }

    /// Best-effort connectivity probe. Never fatal — callers only use this
    /// to populate health state, not to gate requests.
    async fn warmup(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Provider for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        async fn chat_with_system(
            &self,
            _system: Option<&str>,
            message: &str,
            _model: &str,
            _temperature: f32,
        ) -> Result<String> {
            Ok(message.to_string())
        }
    }

    #[tokio::test]
    async fn chat_falls_back_to_chat_with_system() {
        let p = Echo;
        let out = p.chat("hi", "m", 0.5).await.unwrap();
        assert_eq!(out, "hi");
    }

    #[tokio::test]
    async fn default_stream_tokenizes_by_whitespace() {
        let p = Echo;
        let mut seen = Vec::new();
        let out = p
            .chat_with_system_stream(
                None,
                "a b c",
                "m",
                0.5,
                Box::new(|chunk| {
                    if let StreamChunk::Token(t) = chunk {
                        seen.push(t);
                    }
                }),
            )
            .await
            .unwrap();
        assert_eq!(out, "a b c");
        assert_eq!(seen.join(""), "a b c");
    }

    #[tokio::test]
    async fn warmup_defaults_to_ok() {
        assert!(Echo.warmup().await.is_ok());
    }
}
