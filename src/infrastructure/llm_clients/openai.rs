use super::LLMClient;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::json;
use std::collections::VecDeque;
use std::time::Duration;

/// Client for OpenAI-compatible `/chat/completions` endpoints
/// (OpenAI, OpenRouter, LM Studio and other local servers).
pub struct OpenAIClient {
    client: reqwest::Client,
    config: LLMConfig,
}

#[derive(Debug, PartialEq)]
enum SseEvent {
    Delta(String),
    Done,
    Skip,
}

impl OpenAIClient {
    pub fn new(config: LLMConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.request_timeout_secs))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            config,
        }
    }

    fn completions_url(&self) -> String {
        if self.config.base_url.ends_with('/') {
            format!("{}chat/completions", self.config.base_url)
        } else {
            format!("{}/chat/completions", self.config.base_url)
        }
    }

    async fn send(&self, prompt: &str, stream: bool) -> Result<reqwest::Response> {
        let body = json!({
            "model": self.config.model,
            "messages": [
                {
                    "role": "user",
                    "content": prompt
                }
            ],
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "stream": stream,
        });

        let mut request = self.client.post(self.completions_url()).json(&body);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::LLMError(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::LLMError(format!(
                "API error ({}): {}",
                status, text
            )));
        }

        Ok(response)
    }

    fn parse_sse_line(line: &str) -> SseEvent {
        let Some(data) = line.strip_prefix("data:") else {
            return SseEvent::Skip;
        };
        let data = data.trim();
        if data == "[DONE]" {
            return SseEvent::Done;
        }

        match serde_json::from_str::<serde_json::Value>(data) {
            Ok(json) => match json["choices"][0]["delta"]["content"].as_str() {
                Some(text) if !text.is_empty() => SseEvent::Delta(text.to_string()),
                _ => SseEvent::Skip,
            },
            Err(_) => SseEvent::Skip,
        }
    }

    /// Moves complete lines out of `buffer` into `pending`. With `at_eof` the
    /// unterminated tail is parsed as a final line. Returns true on `[DONE]`.
    fn drain_sse_lines(buffer: &mut Vec<u8>, pending: &mut VecDeque<String>, at_eof: bool) -> bool {
        while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=pos).collect();
            if Self::push_sse_line(&line, pending) {
                return true;
            }
        }
        if at_eof && !buffer.is_empty() {
            let line = std::mem::take(buffer);
            return Self::push_sse_line(&line, pending);
        }
        false
    }

    fn push_sse_line(line: &[u8], pending: &mut VecDeque<String>) -> bool {
        let line = String::from_utf8_lossy(line);
        match Self::parse_sse_line(line.trim()) {
            SseEvent::Delta(text) => pending.push_back(text),
            SseEvent::Done => return true,
            SseEvent::Skip => {}
        }
        false
    }
}

#[async_trait]
impl LLMClient for OpenAIClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let response = self.send(prompt, false).await?;

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::LLMError(format!("Failed to parse JSON: {}", e)))?;

        json["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| AppError::LLMError("Invalid response format".to_string()))
    }

    async fn generate_stream(&self, prompt: &str) -> Result<BoxStream<'static, Result<String>>> {
        let response = self.send(prompt, true).await?;
        let bytes = Box::pin(response.bytes_stream());

        let state = (bytes, Vec::<u8>::new(), VecDeque::<String>::new(), false);
        let stream = futures::stream::unfold(
            state,
            |(mut bytes, mut buffer, mut pending, mut done)| async move {
                loop {
                    if let Some(chunk) = pending.pop_front() {
                        return Some((Ok(chunk), (bytes, buffer, pending, done)));
                    }
                    if done {
                        return None;
                    }

                    match bytes.next().await {
                        Some(Ok(data)) => {
                            buffer.extend_from_slice(&data);
                            done = OpenAIClient::drain_sse_lines(&mut buffer, &mut pending, false);
                        }
                        Some(Err(e)) => {
                            done = true;
                            let err = AppError::LLMError(format!("Stream failed: {}", e));
                            return Some((Err(err), (bytes, buffer, pending, done)));
                        }
                        None => {
                            OpenAIClient::drain_sse_lines(&mut buffer, &mut pending, true);
                            done = true;
                        }
                    }
                }
            },
        );

        Ok(Box::pin(stream))
    }

    fn describe(&self) -> String {
        format!("{}/{}", self.config.provider.as_str(), self.config.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"SELECT"}}]}"#;
        assert_eq!(
            OpenAIClient::parse_sse_line(line),
            SseEvent::Delta("SELECT".to_string())
        );
    }

    #[test]
    fn test_parse_sse_done_and_noise() {
        assert_eq!(OpenAIClient::parse_sse_line("data: [DONE]"), SseEvent::Done);
        assert_eq!(OpenAIClient::parse_sse_line(": keep-alive"), SseEvent::Skip);
        assert_eq!(
            OpenAIClient::parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            SseEvent::Skip
        );
    }

    #[test]
    fn test_drain_keeps_partial_line_until_eof() {
        let mut buffer = b"data: {\"choices\":[{\"delta\":{\"content\":\"SELECT\"}}]}\n\
data: {\"choices\":[{\"delta\":{\"content\":\" 1;\"}}]}"
            .to_vec();
        let mut pending = VecDeque::new();

        assert!(!OpenAIClient::drain_sse_lines(&mut buffer, &mut pending, false));
        assert_eq!(pending, VecDeque::from(vec!["SELECT".to_string()]));
        assert!(!buffer.is_empty());

        assert!(!OpenAIClient::drain_sse_lines(&mut buffer, &mut pending, true));
        assert_eq!(
            pending,
            VecDeque::from(vec!["SELECT".to_string(), " 1;".to_string()])
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_drain_stops_at_done() {
        let mut buffer = b"data: [DONE]\ndata: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n".to_vec();
        let mut pending = VecDeque::new();
        assert!(OpenAIClient::drain_sse_lines(&mut buffer, &mut pending, false));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_completions_url_handles_trailing_slash() {
        let mut config = LLMConfig::default();
        config.base_url = "https://openrouter.ai/api/v1/".to_string();
        let client = OpenAIClient::new(config);
        assert_eq!(
            client.completions_url(),
            "https://openrouter.ai/api/v1/chat/completions"
        );
    }
}
