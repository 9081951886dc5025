//! # LLM Client
//!
//! The generation backend behind the RAG Assembler. [`HttpLlmClient`] speaks
//! the OpenAI-compatible chat completion wire format already defined in
//! [`crate::schemas`]; [`StubLlmClient`] is a deterministic stand-in so the
//! Assembler's prompt assembly and streaming envelope can be exercised end to
//! end without an API key.

use crate::error::ProxyError;
use crate::schemas::{ChatCompletionRequest, ChatCompletionResponse, Message};
use async_trait::async_trait;
use futures_util::stream::{self, Stream};
use std::pin::Pin;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn answer(&self, system_message: &str, user_message: &str) -> Result<String, crate::error::ProxyError>;

    async fn stream_answer(
        &self,
        system_message: &str,
        user_message: &str,
    ) -> Result<Pin<Box<dyn Stream<Item = String> + Send>>, crate::error::ProxyError>;
}

/// Speaks the OpenAI-compatible chat completion endpoint. The streaming
/// interface re-chunks the complete answer on the client side rather than
/// passing through the upstream's own SSE stream, matching the original
/// deployment's simulated-streaming behavior for non-streaming backends.
pub struct HttpLlmClient {
    http_client: reqwest::Client,
    base_url: String,
    model: String,
    token: Option<String>,
}

impl HttpLlmClient {
    pub fn new(http_client: reqwest::Client, base_url: impl Into<String>, model: impl Into<String>, token: Option<String>) -> Self {
        Self { http_client, base_url: base_url.into(), model: model.into(), token }
    }

    fn request_body(&self, system_message: &str, user_message: &str) -> ChatCompletionRequest {
        ChatCompletionRequest {
            messages: vec![
                Message { role: "system".to_string(), content: Some(system_message.to_string()), name: None, tool_calls: None, function_call: None, tool_call_id: None },
                Message { role: "user".to_string(), content: Some(user_message.to_string()), name: None, tool_calls: None, function_call: None, tool_call_id: None },
            ],
            model: Some(self.model.clone()),
            stream: Some(false),
            ..Default::default()
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn answer(&self, system_message: &str, user_message: &str) -> Result<String, ProxyError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let mut request = self.http_client.post(&url).json(&self.request_body(system_message, user_message));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let parsed: ChatCompletionResponse = response.error_for_status()?.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProxyError::Malformed("LLM backend returned no choices".to_string()))
    }

    async fn stream_answer(
        &self,
        system_message: &str,
        user_message: &str,
    ) -> Result<Pin<Box<dyn Stream<Item = String> + Send>>, ProxyError> {
        let full = self.answer(system_message, user_message).await?;
        let chunk_size = 24;
        let chunks: Vec<String> = full.as_bytes().chunks(chunk_size).map(|b| String::from_utf8_lossy(b).to_string()).collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}

/// Deterministic stand-in: echoes a templated acknowledgement of the
/// question rather than calling out to a real model.
pub struct StubLlmClient;

#[async_trait]
impl LlmClient for StubLlmClient {
    async fn answer(&self, _system_message: &str, user_message: &str) -> Result<String, crate::error::ProxyError> {
        Ok(format!(
            "Based on the retrieved context, here is what I found regarding: {}",
            summarize_question(user_message)
        ))
    }

    async fn stream_answer(
        &self,
        _system_message: &str,
        user_message: &str,
    ) -> Result<Pin<Box<dyn Stream<Item = String> + Send>>, crate::error::ProxyError> {
        let full = format!(
            "Based on the retrieved context, here is what I found regarding: {}",
            summarize_question(user_message)
        );
        let chunk_size = 12;
        let chunks: Vec<String> = full
            .as_bytes()
            .chunks(chunk_size)
            .map(|b| String::from_utf8_lossy(b).to_string())
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}

fn summarize_question(user_message: &str) -> String {
    user_message.lines().last().unwrap_or(user_message).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn stub_answer_references_the_question() {
        let client = StubLlmClient;
        let answer = client.answer("system", "Current Question: what is the deploy process?").await.unwrap();
        assert!(answer.contains("deploy process"));
    }

    #[tokio::test]
    async fn stub_stream_answer_reassembles_to_the_same_text() {
        let client = StubLlmClient;
        let full = client.answer("system", "question").await.unwrap();
        let mut stream = client.stream_answer("system", "question").await.unwrap();
        let mut reassembled = String::new();
        while let Some(chunk) = stream.next().await {
            reassembled.push_str(&chunk);
        }
        assert_eq!(reassembled, full);
    }
}
