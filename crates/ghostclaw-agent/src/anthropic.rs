//! Anthropic Messages API provider (C3).

use async_trait::async_trait;
use tracing::debug;

use ghostclaw_core::http::HttpClient;
use ghostclaw_security::ToolSpec;

use crate::parsing::{parse_anthropic_content, parse_anthropic_sse_delta, SseDecoder};
use crate::provider::{OnChunk, Provider, ProviderError, Result, StreamChunk};

const API_VERSION: &str = "2023-06-01";
const OAUTH_BETA: &str = "oauth-2025-04-20";
const OAUTH_TOKEN_PREFIX: &str = "sk-ant-oat01-";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    http: HttpClient,
    api_key: String,
    base_url: String,
    is_oauth: bool,
    use_bearer_auth: bool,
}

impl AnthropicProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        let is_oauth = api_key.starts_with(OAUTH_TOKEN_PREFIX);
        Self {
            http: HttpClient::default(),
            is_oauth,
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.anthropic.com".to_string()),
            use_bearer_auth: false,
        }
    }

    pub fn with_bearer_auth(mut self, use_bearer_auth: bool) -> Self {
        self.use_bearer_auth = use_bearer_auth;
        self
    }

    fn auth_headers(&self) -> Vec<(&str, String)> {
        if self.is_oauth || self.use_bearer_auth {
            vec![
                ("authorization", format!("Bearer {}", self.api_key)),
                ("anthropic-beta", OAUTH_BETA.to_string()),
            ]
        } else {
            vec![("x-api-key", self.api_key.clone())]
        }
    }

    fn build_body(
        &self,
        system: Option<&str>,
        message: &str,
        model: &str,
        temperature: f32,
        tools: &[ToolSpec],
        stream: bool,
    ) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": model,
            "max_tokens": DEFAULT_MAX_TOKENS,
            "temperature": temperature,
            "messages": [{"role": "user", "content": message}],
            "stream": stream,
        });
        if let Some(system) = system {
            body["system"] = serde_json::Value::String(system.to_string());
        }
        if !tools.is_empty() {
            let tool_defs: Vec<serde_json::Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
            body["tools"] = serde_json::Value::Array(tool_defs);
        }
        body
    }

    async fn parse_error(status: u16, resp: reqwest::Response) -> ProviderError {
        if status == 401 || status == 403 {
            return ProviderError::AuthError;
        }
        if status == 404 {
            return ProviderError::ModelNotFound;
        }
        if status == 429 {
            let retry_after_ms = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(5000);
            return ProviderError::RateLimited { retry_after_ms };
        }
        let message = resp.text().await.unwrap_or_default();
        ProviderError::Api { status, message }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn chat_with_system(
        &self,
        system: Option<&str>,
        message: &str,
        model: &str,
        temperature: f32,
    ) -> Result<String> {
        self.chat_with_system_tools(system, message, model, temperature, &[]).await
    }

    async fn chat_with_system_tools(
        &self,
        system: Option<&str>,
        message: &str,
        model: &str,
        temperature: f32,
        tools: &[ToolSpec],
    ) -> Result<String> {
        let body = self.build_body(system, message, model, temperature, tools, false);
        debug!(model, "sending chat request to anthropic");

        let mut headers = self.auth_headers();
        headers.push(("anthropic-version", API_VERSION.to_string()));

        let resp = self.http.json_post(&format!("{}/v1/messages", self.base_url), headers, &body).await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            return Err(Self::parse_error(status, resp).await);
        }
        let text = resp.text().await?;
        parse_anthropic_content(&text)
    }

    async fn chat_with_system_stream(
        &self,
        system: Option<&str>,
        message: &str,
        model: &str,
        temperature: f32,
        mut on_chunk: OnChunk<'_>,
    ) -> Result<String> {
        let body = self.build_body(system, message, model, temperature, &[], true);
        let mut headers = self.auth_headers();
        headers.push(("anthropic-version", API_VERSION.to_string()));

        let mut resp = self.http.json_post(&format!("{}/v1/messages", self.base_url), headers, &body).await?;
        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(Self::parse_error(status, resp).await);
        }

        let mut decoder = SseDecoder::new();
        let mut full = String::new();
        while let Some(bytes) = resp.chunk().await? {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            for event in decoder.push(&text) {
                if let Some(payload) = event {
                    if let Some(delta) = parse_anthropic_sse_delta(&payload) {
                        full.push_str(&delta);
                        on_chunk(StreamChunk::Token(delta));
                    }
                }
            }
        }
        on_chunk(StreamChunk::Done);
        Ok(full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oauth_token_prefix_selects_bearer_auth() {
        let provider = AnthropicProvider::new("sk-ant-oat01-xyz".to_string(), None);
        assert!(provider.is_oauth);
        let headers = provider.auth_headers();
        assert!(headers.iter().any(|(k, _)| *k == "authorization"));
    }

    #[test]
    fn plain_api_key_uses_x_api_key_header() {
        let provider = AnthropicProvider::new("sk-ant-api03-xyz".to_string(), None);
        let headers = provider.auth_headers();
        assert!(headers.iter().any(|(k, _)| *k == "x-api-key"));
    }

    #[test]
    fn build_body_includes_system_and_tools() {
        let provider = AnthropicProvider::new("k".to_string(), None);
        let tools = vec![ToolSpec {
            name: "search".to_string(),
            description: "search the web".to_string(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let body = provider.build_body(Some("sys"), "hi", "claude-3-5-sonnet", 0.5, &tools, false);
        assert_eq!(body["system"], "sys");
        assert_eq!(body["tools"][0]["name"], "search");
    }
}
