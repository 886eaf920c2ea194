//! Gemini summarization client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SummarizerConfig;
use crate::error::StageError;
use crate::stage::Summarizer;

/// Client for the Generative Language API `generateContent` endpoint.
pub struct GeminiSummarizer {
    config: SummarizerConfig,
    client: reqwest::Client,
}

impl GeminiSummarizer {
    pub fn new(config: SummarizerConfig) -> Result<Self, StageError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("sightline/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| StageError::SummarizationFailed {
                reason: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Concatenate the text parts of the first candidate.
fn response_text(body: &str) -> Result<String, StageError> {
    let parsed: GenerateResponse =
        serde_json::from_str(body).map_err(|e| StageError::SummarizationFailed {
            reason: format!("unexpected response body: {e}"),
        })?;

    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(StageError::SummarizationFailed {
            reason: "response contained no text".to_string(),
        });
    }
    Ok(text)
}

#[async_trait]
impl Summarizer for GeminiSummarizer {
    async fn summarize(&self, prompt: &str) -> Result<String, StageError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(StageError::SummarizerNotConfigured)?;

        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
            },
        };

        debug!(model = %self.config.model, prompt_len = prompt.len(), "requesting summary");
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| StageError::SummarizationFailed {
                reason: if e.is_timeout() {
                    format!(
                        "request timed out after {}s",
                        self.config.timeout.as_secs()
                    )
                } else {
                    e.to_string()
                },
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| StageError::SummarizationFailed {
                reason: e.to_string(),
            })?;

        if !status.is_success() {
            return Err(StageError::SummarizationFailed {
                reason: format!("HTTP {}: {}", status.as_u16(), text.trim()),
            });
        }

        response_text(&text)
    }
}
