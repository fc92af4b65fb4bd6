//! Reliable provider (C4): wraps a primary provider plus an ordered list of
//! fallbacks, each retried with exponential backoff before moving on.

use async_trait::async_trait;
use tracing::warn;

use ghostclaw_security::ToolSpec;

use crate::provider::{OnChunk, Provider, ProviderError, Result};

pub struct ReliableProvider {
    primary: Box<dyn Provider>,
    fallbacks: Vec<Box<dyn Provider>>,
    max_retries: u32,
    backoff_ms: u64,
}

impl ReliableProvider {
    pub fn new(primary: Box<dyn Provider>, fallbacks: Vec<Box<dyn Provider>>, max_retries: u32, backoff_ms: u64) -> Self {
        Self {
            primary,
            fallbacks,
            max_retries,
            backoff_ms,
        }
    }

    /// Retry loop for a single provider: up to `max_retries + 1` attempts
    /// with exponential backoff between them.
    async fn execute_with_provider(
        &self,
        provider: &dyn Provider,
        system: Option<&str>,
        message: &str,
        model: &str,
        temperature: f32,
        tools: &[ToolSpec],
    ) -> Result<String> {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            match provider.chat_with_system_tools(system, message, model, temperature, tools).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    warn!(provider = provider.name(), attempt, error = %e, "provider attempt failed");
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        let delay_ms = self.backoff_ms << attempt;
                        tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                    }
                }
            }
        }
        Err(last_error.unwrap_or(ProviderError::NetworkError("no attempts made".to_string())))
    }
}

#[async_trait]
impl Provider for ReliableProvider {
    fn name(&self) -> &str {
        "reliable"
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
        match self.execute_with_provider(self.primary.as_ref(), system, message, model, temperature, tools).await {
            Ok(text) => return Ok(text),
            Err(primary_error) => {
                let mut last_error = primary_error;
                for fallback in &self.fallbacks {
                    match self
                        .execute_with_provider(fallback.as_ref(), system, message, model, temperature, tools)
                        .await
                    {
                        Ok(text) => return Ok(text),
                        Err(e) => last_error = e,
                    }
                }
                Err(last_error)
            }
        }
    }

    async fn chat_with_system_stream(
        &self,
        system: Option<&str>,
        message: &str,
        model: &str,
        temperature: f32,
        on_chunk: OnChunk<'_>,
    ) -> Result<String> {
        // Streaming is only attempted against the primary — fallbacks degrade
        // to a single non-streaming call surfaced as one final chunk.
        self.primary.chat_with_system_stream(system, message, model, temperature, on_chunk).await
    }

    /// Primary failure is surfaced immediately; fallback failures are
    /// swallowed (a down fallback shouldn't block startup).
    async fn warmup(&self) -> Result<()> {
        self.primary.warmup().await?;
        for fallback in &self.fallbacks {
            let _ = fallback.warmup().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct AlwaysFail {
        name: String,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Provider for AlwaysFail {
        fn name(&self) -> &str {
            &self.name
        }
        async fn chat_with_system(&self, _: Option<&str>, _: &str, _: &str, _: f32) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::NetworkError("down".to_string()))
        }
    }

    struct AlwaysOk {
        name: String,
    }

    #[async_trait]
    impl Provider for AlwaysOk {
        fn name(&self) -> &str {
            &self.name
        }
        async fn chat_with_system(&self, _: Option<&str>, message: &str, _: &str, _: f32) -> Result<String> {
            Ok(format!("ok:{message}"))
        }
    }

    #[tokio::test]
    async fn falls_back_to_second_provider() {
        let calls = Arc::new(AtomicU32::new(0));
        let primary = Box::new(AlwaysFail { name: "p".to_string(), calls: calls.clone() });
        let fallback = Box::new(AlwaysOk { name: "f".to_string() });
        let reliable = ReliableProvider::new(primary, vec![fallback], 0, 1);
        let out = reliable.chat("hi", "m", 0.5).await.unwrap();
        assert_eq!(out, "ok:hi");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn errors_when_all_exhausted() {
        let calls = Arc::new(AtomicU32::new(0));
        let primary = Box::new(AlwaysFail { name: "p".to_string(), calls: calls.clone() });
        let reliable = ReliableProvider::new(primary, vec![], 1, 1);
        let err = reliable.chat("hi", "m", 0.5).await.unwrap_err();
        assert!(matches!(err, ProviderError::NetworkError(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn name_is_reliable() {
        let primary = Box::new(AlwaysOk { name: "p".to_string() });
        let reliable = ReliableProvider::new(primary, vec![], 0, 1);
        assert_eq!(reliable.name(), "reliable");
    }
}
