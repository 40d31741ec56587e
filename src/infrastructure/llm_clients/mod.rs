pub mod gemini;
pub mod openai;

use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::{LLMConfig, LLMProvider};
use async_trait::async_trait;
use futures::stream::BoxStream;
use gemini::GeminiClient;
use openai::OpenAIClient;
use std::sync::Arc;

/// Text generation capability: prompt in, completion out.
///
/// Provider, model, temperature and token limits are fixed when the client is
/// built, so one client behaves the same for every call it serves.
#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Streams the completion as text chunks. Providers without a streaming
    /// endpoint yield the full completion as a single chunk.
    async fn generate_stream(&self, prompt: &str) -> Result<BoxStream<'static, Result<String>>> {
        let text = self.generate(prompt).await?;
        Ok(Box::pin(futures::stream::once(async move { Ok(text) })))
    }

    /// `provider/model`, for logs.
    fn describe(&self) -> String;
}

/// Picks the client implementation for the configured provider.
pub fn build_llm_client(config: &LLMConfig) -> Result<Arc<dyn LLMClient>> {
    if config.model.trim().is_empty() {
        return Err(AppError::ValidationError(
            "LLM model name is required".to_string(),
        ));
    }

    let client: Arc<dyn LLMClient> = match config.provider {
        LLMProvider::Gemini => Arc::new(GeminiClient::new(config.clone())?),
        LLMProvider::Local | LLMProvider::OpenAI | LLMProvider::OpenRouter => {
            Arc::new(OpenAIClient::new(config.clone()))
        }
    };

    tracing::info!("Using LLM {}", client.describe());
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    struct FixedClient;

    #[async_trait]
    impl LLMClient for FixedClient {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok("SELECT 1;".to_string())
        }

        fn describe(&self) -> String {
            "fixed/test".to_string()
        }
    }

    #[tokio::test]
    async fn test_default_stream_yields_single_chunk() {
        let client = FixedClient;
        let chunks: Vec<String> = client
            .generate_stream("anything")
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks, vec!["SELECT 1;".to_string()]);
    }

    #[test]
    fn test_build_rejects_empty_model() {
        let mut config = LLMConfig::default();
        config.model = "  ".to_string();
        assert!(build_llm_client(&config).is_err());
    }

    #[test]
    fn test_build_openai_compatible_for_local() {
        let client = build_llm_client(&LLMConfig::default()).unwrap();
        assert_eq!(client.describe(), "local/local-model");
    }
}
