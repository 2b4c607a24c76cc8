//! Adapter from any `edgequake_llm` provider to [`VisionBackend`].
//!
//! Lets the analysis run against Anthropic, Gemini, Ollama, Mistral and the
//! other providers edgequake-llm knows about, with the provider's own API key
//! variable (`ANTHROPIC_API_KEY`, `GEMINI_API_KEY`, …).

use super::{ModelReply, VisionBackend};
use crate::error::{AnalysisError, AnalyzerError};
use crate::pipeline::llm::AnalysisRequest;
use async_trait::async_trait;
use edgequake_llm::{
    ChatMessage, CompletionOptions, ImageData, LLMProvider, LlmError, ProviderFactory,
};
use std::sync::Arc;
use tracing::debug;

/// A vision backend driven by an edgequake-llm provider.
pub struct ProviderBackend {
    provider: Arc<dyn LLMProvider>,
    label: String,
    model: String,
}

impl ProviderBackend {
    /// Wrap an already-constructed provider.
    pub fn new(provider: Arc<dyn LLMProvider>, name: &str, model: &str) -> Self {
        Self {
            provider,
            label: format!("edgequake:{name}"),
            model: model.to_string(),
        }
    }

    /// Create the named provider; its credential is read by edgequake-llm.
    pub fn create(name: &str, model: &str) -> Result<Self, AnalyzerError> {
        let provider = ProviderFactory::create_llm_provider(name, model).map_err(|e| {
            AnalyzerError::ProviderNotConfigured {
                provider: name.to_string(),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(provider, name, model))
    }
}

/// Transport failures and timeouts are `Network`; anything the service said is `Model`.
fn classify(error: LlmError) -> AnalysisError {
    match error {
        LlmError::NetworkError(_) | LlmError::Timeout => AnalysisError::Network(error.to_string()),
        other => AnalysisError::Model {
            status: None,
            detail: other.to_string(),
        },
    }
}

#[async_trait]
impl VisionBackend for ProviderBackend {
    fn name(&self) -> &str {
        &self.label
    }

    async fn complete(&self, request: &AnalysisRequest) -> Result<ModelReply, AnalysisError> {
        let images: Vec<ImageData> = request
            .image()
            .map(|p| ImageData::new(p.base64.clone(), p.mime.as_str()).with_detail("high"))
            .into_iter()
            .collect();

        let messages = vec![
            ChatMessage::system(request.system.as_str()),
            ChatMessage::user_with_images(request.label().unwrap_or(""), images),
        ];

        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(classify)?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.label, response.prompt_tokens, response.completion_tokens
        );

        Ok(ModelReply {
            content: Some(response.content),
            model: Some(self.model.clone()),
            input_tokens: response.prompt_tokens as usize,
            output_tokens: response.completion_tokens as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_are_network_errors() {
        for err in [
            LlmError::NetworkError("Connection failed: error sending request".into()),
            LlmError::Timeout,
        ] {
            assert!(matches!(classify(err), AnalysisError::Network(_)));
        }
    }

    #[test]
    fn service_failures_are_model_errors_whatever_their_text() {
        for err in [
            LlmError::AuthError("Invalid API key for this connection".into()),
            LlmError::ApiError("HTTP 504: upstream request timeout".into()),
            LlmError::RateLimited("too many concurrent connections".into()),
            LlmError::ProviderError("content_filter triggered".into()),
        ] {
            let msg = err.to_string();
            assert!(
                matches!(classify(err), AnalysisError::Model { .. }),
                "{msg}"
            );
        }
    }
}
