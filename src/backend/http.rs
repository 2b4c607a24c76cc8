//! Built-in backend speaking the OpenAI chat-completions wire format.
//!
//! One `POST {api_base}/chat/completions` per analysis:
//!
//! ```text
//! messages[0]  system  ← rendered instruction template
//! messages[1]  user    ← [ {type: text, text: label},
//!                          {type: image_url, image_url: {url: data:<mime>;base64,…}} ]
//! ```
//!
//! The reply's `choices[0].message.content` is the analysis. Any server that
//! implements this endpoint (OpenAI, Azure-compatible proxies, vLLM, LiteLLM)
//! works by pointing `api_base` at it.

use super::{ModelReply, VisionBackend};
use crate::error::{AnalysisError, AnalyzerError};
use crate::pipeline::llm::{AnalysisRequest, ContentPart};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// reqwest client bound to one endpoint and credential.
pub struct ChatCompletionsBackend {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl ChatCompletionsBackend {
    pub fn new(
        api_base: &str,
        api_key: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, AnalyzerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AnalyzerError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            url: completions_url(api_base),
            api_key: api_key.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn completions_url(api_base: &str) -> String {
    format!("{}/chat/completions", api_base.trim_end_matches('/'))
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: MessageContent<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<Part<'a>>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Part<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn build_body(request: &AnalysisRequest) -> ChatBody<'_> {
    let parts = request
        .user
        .iter()
        .map(|part| match part {
            ContentPart::Text(text) => Part::Text {
                text: text.as_str(),
            },
            ContentPart::Image(payload) => Part::ImageUrl {
                image_url: ImageUrl {
                    url: payload.data_uri(),
                },
            },
        })
        .collect();

    ChatBody {
        model: request.model.as_str(),
        messages: vec![
            Message {
                role: "system",
                content: MessageContent::Text(request.system.as_str()),
            },
            Message {
                role: "user",
                content: MessageContent::Parts(parts),
            },
        ],
        temperature: request.temperature,
        max_tokens: request.max_tokens,
    }
}

/// Pull a readable message out of an error body, falling back to raw text.
fn error_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) => env.error.message,
        Err(_) => {
            let trimmed = body.trim();
            if trimmed.chars().count() > 300 {
                format!("{}…", trimmed.chars().take(299).collect::<String>())
            } else {
                trimmed.to_string()
            }
        }
    }
}

#[async_trait]
impl VisionBackend for ChatCompletionsBackend {
    fn name(&self) -> &str {
        "chat-completions"
    }

    async fn complete(&self, request: &AnalysisRequest) -> Result<ModelReply, AnalysisError> {
        let body = build_body(request);

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalysisError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AnalysisError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(AnalysisError::Model {
                status: Some(status.as_u16()),
                detail: error_detail(&text),
            });
        }

        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| AnalysisError::Model {
                status: Some(status.as_u16()),
                detail: format!("malformed response body: {e}"),
            })?;

        let usage = parsed.usage.unwrap_or(Usage {
            prompt_tokens: 0,
            completion_tokens: 0,
        });
        debug!(
            "HTTP {}: {} choices, {} prompt tokens",
            status,
            parsed.choices.len(),
            usage.prompt_tokens
        );

        Ok(ModelReply {
            content: parsed.choices.into_iter().next().and_then(|c| c.message.content),
            model: parsed.model,
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        })
    }
}
