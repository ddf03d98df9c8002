//! Gemini `generateContent` wire types and client
//!
//! Both speech recognition and reply generation go through the same
//! endpoint, so the request/response schema lives here.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ProviderConfig;

/// Request body for `models/{model}:generateContent`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

impl GenerateContentRequest {
    /// Single-turn request with the given parts
    #[must_use]
    pub fn new(parts: Vec<Part>) -> Self {
        Self {
            contents: vec![Content { parts }],
            system_instruction: None,
            tools: Vec::new(),
            generation_config: None,
        }
    }
}

/// Ordered list of parts
#[derive(Debug, Clone, Serialize)]
pub struct Content {
    pub parts: Vec<Part>,
}

impl Content {
    /// Content holding one text part
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part::text(text)],
        }
    }
}

/// A text or inline media part
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Part {
    Text { text: String },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

impl Part {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Inline media, `data` already base64-encoded
    #[must_use]
    pub fn inline(mime_type: &str, data: String) -> Self {
        Self::InlineData {
            inline_data: InlineData {
                mime_type: mime_type.to_string(),
                data,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

/// Model-side capability switch
#[derive(Debug, Clone, Serialize)]
pub enum Tool {
    /// Let the model ground answers with web search
    #[serde(rename = "google_search")]
    GoogleSearch {},
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
}

/// Response body; every level is optional on the wire
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Candidate {
    pub content: Option<CandidateContent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponsePart {
    pub text: Option<String>,
}

/// Why a response could not yield text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseShapeError {
    #[error("response has no candidates")]
    NoCandidates,
    #[error("first candidate has no content")]
    NoContent,
    #[error("candidate content has no parts")]
    NoParts,
    #[error("first part has no text")]
    NoText,
}

impl GenerateContentResponse {
    /// Text of the first part of the first candidate
    ///
    /// # Errors
    ///
    /// Returns the first missing level of the response
    pub fn first_text(&self) -> Result<&str, ResponseShapeError> {
        let candidate = self
            .candidates
            .first()
            .ok_or(ResponseShapeError::NoCandidates)?;
        let content = candidate
            .content
            .as_ref()
            .ok_or(ResponseShapeError::NoContent)?;
        let part = content.parts.first().ok_or(ResponseShapeError::NoParts)?;
        part.text.as_deref().ok_or(ResponseShapeError::NoText)
    }
}

/// Failures talking to the provider, kept apart so callers can pick a fallback
#[derive(Debug, Error)]
pub enum GenerateError {
    /// Request never produced a response (connect, timeout, body read)
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// Provider answered with a non-success status
    #[error("provider returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    /// Body was not the expected JSON
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// JSON parsed but held no text
    #[error("unexpected response shape: {0}")]
    Shape(#[from] ResponseShapeError),
}

impl GenerateError {
    /// Whether the failure happened before a usable response arrived
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Status { .. })
    }
}

/// Client for one Gemini model
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model: String,
}

impl GeminiClient {
    /// Create a client for `model` using the shared provider settings
    #[must_use]
    pub fn new(provider: &ProviderConfig, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: provider.base_url.trim_end_matches('/').to_string(),
            api_key: SecretString::from(provider.api_key.expose_secret().to_owned()),
            model: model.to_string(),
        }
    }

    /// Model identifier requests are sent to
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a request and return the first text part
    ///
    /// # Errors
    ///
    /// Returns error on transport failure, timeout, non-success status or an
    /// unexpected response body
    pub async fn generate(
        &self,
        request: &GenerateContentRequest,
        timeout: Duration,
    ) -> Result<String, GenerateError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.expose_secret())])
            .timeout(timeout)
            .json(request)
            .send()
            .await
            .map_err(GenerateError::Transport)?;

        let status = response.status();
        tracing::debug!(status = %status, model = %self.model, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerateError::Status { status, body });
        }

        let body = response.bytes().await.map_err(GenerateError::Transport)?;
        let parsed: GenerateContentResponse = serde_json::from_slice(&body)?;
        Ok(parsed.first_text()?.to_string())
    }
}
