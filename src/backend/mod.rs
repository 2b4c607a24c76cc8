//! Backends that carry an [`AnalysisRequest`] to a vision model.
//!
//! The [`VisionBackend`] trait is the seam between request construction and
//! the network. A backend is constructed explicitly from the configuration and
//! injected into [`crate::pipeline::llm::AnalysisClient`]; there is no
//! process-wide client and no credential in global scope. Tests substitute
//! their own implementation.
//!
//! | Backend | Selected when | Transport |
//! |---------|---------------|-----------|
//! | [`http::ChatCompletionsBackend`] | no provider name (default) | reqwest, OpenAI chat-completions JSON |
//! | [`provider::ProviderBackend`] | `provider_name` is set | any `edgequake_llm` provider |

pub mod http;
pub mod provider;

use crate::config::AnalyzerConfig;
use crate::error::{AnalysisError, AnalyzerError};
use crate::pipeline::llm::AnalysisRequest;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Raw outcome of a successful service exchange, before interpretation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    /// First choice's message text, if any.
    pub content: Option<String>,
    pub model: Option<String>,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Something that can answer an analysis request.
///
/// Implementations perform exactly one exchange per call and must classify
/// failures: no HTTP response at all is [`AnalysisError::Network`], an error
/// response is [`AnalysisError::Model`]. Empty content is returned as a
/// `ModelReply` and classified by the caller.
#[async_trait]
pub trait VisionBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn complete(&self, request: &AnalysisRequest) -> Result<ModelReply, AnalysisError>;
}

/// Construct the backend the configuration asks for, failing fast when it
/// cannot work (missing credential, unknown provider).
pub fn resolve_backend(config: &AnalyzerConfig) -> Result<Arc<dyn VisionBackend>, AnalyzerError> {
    match config.provider_name.as_deref() {
        None | Some("") | Some("openai-compatible") => {
            let api_key = config.resolve_api_key()?;
            info!("Using chat-completions backend at {}", config.api_base);
            Ok(Arc::new(http::ChatCompletionsBackend::new(
                &config.api_base,
                api_key,
                config.request_timeout_secs,
            )?))
        }
        Some(name) => {
            info!("Using edgequake-llm provider '{}' ({})", name, config.model);
            Ok(Arc::new(provider::ProviderBackend::create(name, &config.model)?))
        }
    }
}
