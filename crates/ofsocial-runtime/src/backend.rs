//! Text generation backends.
//!
//! `TextGenerator` is the seam between the resource manager and whatever
//! actually runs the model. The production backend talks to one completion
//! server per accelerator; tests substitute scripted generators.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ofsocial_core::GenerationParams;

/// Chat-template control tokens that must never reach stored content.
const TEMPLATE_TOKENS: &[&str] = &["<|im_start|>", "<|im_end|>", "<|endoftext|>"];

/// Role headers a model may emit right after a stray `<|im_start|>`.
const ROLE_HEADERS: &[&str] = &["assistant\n", "assistant:", "system\n", "user\n"];

/// A stateful, non-reentrant text generator.
///
/// `generate` takes `&mut self`: callers must hold exclusive access, which
/// the resource manager guarantees by guarding every generator with its own
/// mutex.
#[async_trait]
pub trait TextGenerator: Send {
    /// Run one generation call and return the decoded continuation only.
    async fn generate(&mut self, prompt: &str, params: &GenerationParams)
    -> anyhow::Result<String>;
}

/// Strip an echoed prompt and chat-template tokens from raw model output.
///
/// Only the continuation after `prompt` is returned.
pub fn decode_continuation(prompt: &str, raw: &str) -> String {
    let continuation = raw.strip_prefix(prompt).unwrap_or(raw);
    let mut text = continuation.to_string();
    for token in TEMPLATE_TOKENS {
        text = text.replace(token, "");
    }
    let mut trimmed = text.trim_start();
    for header in ROLE_HEADERS {
        if let Some(rest) = trimmed.strip_prefix(header) {
            trimmed = rest.trim_start();
            break;
        }
    }
    trimmed.trim_end().to_string()
}

/// Request body for a llama.cpp-style `/completion` endpoint.
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    n_predict: u32,
    temperature: f32,
    top_p: f32,
    repeat_penalty: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    content: String,
}

/// Generator backed by a completion server serving one model replica.
pub struct CompletionBackend {
    endpoint: String,
    client: reqwest::Client,
}

impl CompletionBackend {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn completion_url(&self) -> String {
        format!("{}/completion", self.endpoint)
    }
}

#[async_trait]
impl TextGenerator for CompletionBackend {
    async fn generate(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
    ) -> anyhow::Result<String> {
        let body = CompletionRequest {
            prompt,
            n_predict: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            repeat_penalty: params.repetition_penalty,
            stream: false,
        };
        let response = self
            .client
            .post(self.completion_url())
            .json(&body)
            .send()
            .await
            .with_context(|| format!("completion request to {} failed", self.endpoint))?
            .error_for_status()
            .with_context(|| format!("completion server {} returned an error", self.endpoint))?;
        let completion: CompletionResponse = response
            .json()
            .await
            .context("malformed completion response")?;
        debug!(endpoint = %self.endpoint, chars = completion.content.len(), "completion received");
        Ok(decode_continuation(prompt, &completion.content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continuation_drops_echoed_prompt() {
        let prompt = "<|im_start|>user\nhi<|im_end|>\n<|im_start|>assistant\n";
        let raw = format!("{prompt}Hello there!<|im_end|>");
        assert_eq!(decode_continuation(prompt, &raw), "Hello there!");
    }

    #[test]
    fn continuation_without_echo_is_kept() {
        assert_eq!(
            decode_continuation("prompt", "Just the reply.<|endoftext|>"),
            "Just the reply."
        );
    }

    #[test]
    fn stray_role_header_is_removed() {
        let raw = "<|im_start|>assistant\nLooks great to me.";
        assert_eq!(decode_continuation("p", raw), "Looks great to me.");
    }

    #[test]
    fn role_word_inside_text_is_kept() {
        let raw = "My assistant is great.";
        assert_eq!(decode_continuation("p", raw), "My assistant is great.");
    }

    #[test]
    fn endpoint_trailing_slash_is_normalized() {
        let backend =
            CompletionBackend::new("http://gpu0:8080/", Duration::from_secs(5)).unwrap();
        assert_eq!(backend.endpoint(), "http://gpu0:8080");
        assert_eq!(backend.completion_url(), "http://gpu0:8080/completion");
    }

    #[test]
    fn request_body_uses_completion_field_names() {
        let params = GenerationParams::for_kind(ofsocial_core::ContentKind::Comment);
        let body = CompletionRequest {
            prompt: "p",
            n_predict: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            repeat_penalty: params.repetition_penalty,
            stream: false,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["n_predict"], 200);
        assert_eq!(json["stream"], false);
        assert!(json.get("repeat_penalty").is_some());
    }
}
