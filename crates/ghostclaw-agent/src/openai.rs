//! OpenAI-compatible provider (C3): used for OpenAI itself and every
//! `Compatible` route resolved by the registry (Groq, DeepSeek, OpenRouter,
//! local servers, ...).

use async_trait::async_trait;
use tracing::debug;

use ghostclaw_core::http::HttpClient;
use ghostclaw_security::ToolSpec;

use crate::parsing::{parse_openai_content, parse_openai_sse_delta, SseDecoder};
use crate::provider::{OnChunk, Provider, ProviderError, Result, StreamChunk};

pub struct OpenAiProvider {
    http: HttpClient,
    api_key: Option<String>,
    base_url: String,
    chat_path: String,
    provider_name: String,
    extra_headers: Vec<(String, String)>,
}

impl OpenAiProvider {
    pub fn new(name: impl Into<String>, api_key: Option<String>, base_url: String) -> Self {
        Self::with_path(name, api_key, base_url, "/v1/chat/completions".to_string())
    }

    pub fn with_path(
        name: impl Into<String>,
        api_key: Option<String>,
        base_url: String,
        chat_path: String,
    ) -> Self {
        Self {
            http: HttpClient::default(),
            api_key,
            base_url,
            chat_path,
            provider_name: name.into(),
            extra_headers: Vec::new(),
        }
    }

    pub fn with_extra_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.extra_headers = headers;
        self
    }

    fn url(&self) -> String {
        format!("{}{}", self.base_url, self.chat_path)
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
        let mut messages = Vec::new();
        if let Some(system) = system {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        messages.push(serde_json::json!({"role": "user", "content": message}));

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "temperature": temperature,
            "stream": stream,
        });

        if !tools.is_empty() {
            let tool_defs: Vec<serde_json::Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = serde_json::Value::Array(tool_defs);
            body["tool_choice"] = serde_json::json!("auto");
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
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.provider_name
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
        debug!(provider = %self.provider_name, model, "sending chat request");

        let mut headers: Vec<(&str, String)> = Vec::new();
        if let Some(key) = &self.api_key {
            headers.push(("authorization", format!("Bearer {key}")));
        }
        for (k, v) in &self.extra_headers {
            headers.push((k.as_str(), v.clone()));
        }

        let resp = self.http.json_post(&self.url(), headers, &body).await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            return Err(Self::parse_error(status, resp).await);
        }

        let text = resp.text().await?;
        parse_openai_content(&text)
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

        let mut headers: Vec<(&str, String)> = Vec::new();
        if let Some(key) = &self.api_key {
            headers.push(("authorization", format!("Bearer {key}")));
        }
        for (k, v) in &self.extra_headers {
            headers.push((k.as_str(), v.clone()));
        }

        let mut resp = self.http.json_post(&self.url(), headers, &body).await?;
        let status = resp.status().as_u16();
        if !status_is_success(status) {
            return Err(Self::parse_error(status, resp).await);
        }

        let mut decoder = SseDecoder::new();
        let mut full = String::new();
        while let Some(bytes) = resp.chunk().await? {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            for event in decoder.push(&text) {
                handle_openai_event(event, &mut full, &mut on_chunk);
            }
        }
        on_chunk(StreamChunk::Done);
        Ok(full)
    }
}

fn status_is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

fn handle_openai_event(event: Option<String>, full: &mut String, on_chunk: &mut OnChunk<'_>) {
    match event {
        None => {}
        Some(payload) => {
            if let Some(delta) = parse_openai_sse_delta(&payload) {
                full.push_str(&delta);
                on_chunk(StreamChunk::Token(delta));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_body_includes_system_and_tools() {
        let provider = OpenAiProvider::new("openai", Some("k".to_string()), "https://api.openai.com".to_string());
        let tools = vec![ToolSpec {
            name: "search".to_string(),
            description: "search the web".to_string(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let body = provider.build_body(Some("sys"), "hi", "gpt-4o-mini", 0.5, &tools, false);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["tools"][0]["function"]["name"], "search");
    }

    #[test]
    fn url_joins_base_and_path() {
        let provider = OpenAiProvider::new("openai", None, "https://api.openai.com".to_string());
        assert_eq!(provider.url(), "https://api.openai.com/v1/chat/completions");
    }
}
