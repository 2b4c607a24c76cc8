//! Vision-model interaction: build the analysis request and make the call.
//!
//! This module is deliberately thin. The instruction text lives in
//! [`crate::prompts`], the wire format lives in the [`crate::backend`]
//! implementations, and the lifecycle (single flight, stale responses) lives
//! in [`crate::session`]. What remains here is the request shape and the
//! mapping of a raw reply onto [`AnalysisResult`] / [`AnalysisError`].
//!
//! There is no retry. A failure is reported once and the user re-triggers.

use crate::backend::{ModelReply, VisionBackend};
use crate::config::AnalyzerConfig;
use crate::error::AnalysisError;
use crate::pipeline::encode::EncodedPayload;
use crate::pipeline::postprocess::tidy_markdown;
use crate::prompts::{ANALYSIS_TEMPLATE, USER_IMAGE_LABEL};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One part of the user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    Image(EncodedPayload),
}

/// The outgoing structured prompt. Built per call, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    /// Rendered [`ANALYSIS_TEMPLATE`].
    pub system: String,
    /// Exactly two parts: the text label, then the image.
    pub user: Vec<ContentPart>,
}

impl AnalysisRequest {
    /// The image part of the user turn.
    pub fn image(&self) -> Option<&EncodedPayload> {
        self.user.iter().find_map(|p| match p {
            ContentPart::Image(img) => Some(img),
            ContentPart::Text(_) => None,
        })
    }

    /// The text label of the user turn.
    pub fn label(&self) -> Option<&str> {
        self.user.iter().find_map(|p| match p {
            ContentPart::Text(t) => Some(t.as_str()),
            ContentPart::Image(_) => None,
        })
    }
}

/// Parsed model response: tidied Markdown plus call statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    pub markdown: String,
    pub model: Option<String>,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
}

/// Builds requests and issues the single call through an injected backend.
#[derive(Clone)]
pub struct AnalysisClient {
    backend: Arc<dyn VisionBackend>,
    model: String,
    temperature: f32,
    max_tokens: usize,
    timeout: Duration,
}

impl std::fmt::Debug for AnalysisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisClient")
            .field("backend", &self.backend.name())
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl AnalysisClient {
    pub fn new(backend: Arc<dyn VisionBackend>, config: &AnalyzerConfig) -> Self {
        Self {
            backend,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Build the request for an encoded image. Deterministic.
    pub fn build_request(&self, payload: &EncodedPayload) -> AnalysisRequest {
        AnalysisRequest {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            system: ANALYSIS_TEMPLATE.render(),
            user: vec![
                ContentPart::Text(USER_IMAGE_LABEL.to_string()),
                ContentPart::Image(payload.clone()),
            ],
        }
    }

    /// Make the one network call and interpret the reply.
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        let start = Instant::now();
        info!(
            "Sending analysis request to {} (model {})",
            self.backend.name(),
            request.model
        );

        let reply = match tokio::time::timeout(self.timeout, self.backend.complete(request)).await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!("Analysis call failed: {}", e);
                return Err(e);
            }
            Err(_) => {
                warn!("Analysis call timed out after {:?}", self.timeout);
                return Err(AnalysisError::Network(format!(
                    "timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        interpret_reply(reply, duration_ms)
    }
}

fn interpret_reply(reply: ModelReply, duration_ms: u64) -> Result<AnalysisResult, AnalysisError> {
    let content = reply.content.unwrap_or_default();
    if content.trim().is_empty() {
        warn!("Vision service returned no content");
        return Err(AnalysisError::EmptyResponse);
    }

    debug!(
        "Reply: {} chars, {} input tokens, {} output tokens, {}ms",
        content.len(),
        reply.input_tokens,
        reply.output_tokens,
        duration_ms
    );

    Ok(AnalysisResult {
        markdown: tidy_markdown(&content),
        model: reply.model,
        input_tokens: reply.input_tokens,
        output_tokens: reply.output_tokens,
        duration_ms,
    })
}
