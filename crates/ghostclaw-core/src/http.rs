//! Thin HTTP client contract (C2): JSON POST, streaming POST, HEAD, with
//! timeouts surfaced as a distinct error variant rather than folded into a
//! generic network failure.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("http status {status}: {body}")]
    Status { status: u16, body: String },
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HttpError::Timeout
        } else {
            HttpError::Network(err.to_string())
        }
    }
}

/// A minimal JSON-oriented HTTP client used by the provider implementations.
/// Providers build their own request bodies/headers; this wrapper only
/// standardizes timeout handling and response decoding.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builder");
        Self { client }
    }

    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }

    pub async fn json_post(
        &self,
        url: &str,
        headers: Vec<(&str, String)>,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, HttpError> {
        let mut builder = self.client.post(url).json(body);
        for (k, v) in headers {
            builder = builder.header(k, v);
        }
        Ok(builder.send().await?)
    }

    pub async fn head(&self, url: &str) -> Result<u16, HttpError> {
        let resp = self.client.head(url).send().await?;
        Ok(resp.status().as_u16())
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}
