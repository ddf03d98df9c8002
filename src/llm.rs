//! Reply generation
//!
//! The language model never fails outward: transport problems and unusable
//! responses turn into canned fallback sentences so the device always has
//! something to say.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::config::{LlmConfig, ProviderConfig};
use crate::gemini::{Content, GeminiClient, GenerateContentRequest, GenerationConfig, Part, Tool};

/// Spoken when the model could not be reached
pub const CONNECTION_FALLBACK: &str = "Sorry, I failed to connect to the LLM server.";

/// Spoken when the model answered with something unusable
pub const MALFORMED_FALLBACK: &str = "Sorry, the LLM returned an invalid response.";

/// Everything the model sees for one utterance
#[derive(Debug, Clone)]
pub struct PromptContext {
    /// What the user said, or the clarification prompt
    pub utterance: String,

    /// Persona instruction
    pub system_instruction: String,

    /// Per-request token so identical utterances do not get cached replies
    pub decorrelation_token: String,
}

impl PromptContext {
    /// Build a context with a fresh decorrelation token
    #[must_use]
    pub fn new(utterance: impl Into<String>, system_instruction: impl Into<String>) -> Self {
        let token: u32 = rand::thread_rng().r#gen();
        Self {
            utterance: utterance.into(),
            system_instruction: system_instruction.into(),
            decorrelation_token: format!("{token:08x}"),
        }
    }

    /// User turn text sent to the model
    #[must_use]
    pub fn user_text(&self) -> String {
        format!("{} [request {}]", self.utterance, self.decorrelation_token)
    }
}

/// Why a fallback sentence replaced the model's answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// Transport error, timeout or non-success status
    Connection,
    /// Response body had no usable text
    MalformedResponse,
}

impl FallbackReason {
    /// Canned sentence for this reason
    #[must_use]
    pub const fn text(self) -> &'static str {
        match self {
            Self::Connection => CONNECTION_FALLBACK,
            Self::MalformedResponse => MALFORMED_FALLBACK,
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => write!(f, "connection"),
            Self::MalformedResponse => write!(f, "malformed_response"),
        }
    }
}

/// Text to speak, tagged with where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The model's own answer
    Generated(String),
    /// A canned sentence used in place of an answer
    Fallback { text: String, reason: FallbackReason },
}

impl Reply {
    /// Fallback reply for `reason`
    #[must_use]
    pub fn fallback(reason: FallbackReason) -> Self {
        Self::Fallback {
            text: reason.text().to_string(),
            reason,
        }
    }

    /// Text to speak
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Generated(text) | Self::Fallback { text, .. } => text,
        }
    }

    /// Reason for the fallback, if this is one
    #[must_use]
    pub const fn fallback_reason(&self) -> Option<FallbackReason> {
        match self {
            Self::Generated(_) => None,
            Self::Fallback { reason, .. } => Some(*reason),
        }
    }
}

/// Produces a reply for an utterance
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a reply; failures become [`Reply::Fallback`]
    async fn generate_reply(&self, ctx: &PromptContext) -> Reply;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Reply generation through a Gemini model
pub struct GeminiResponder {
    client: GeminiClient,
    temperature: f32,
    search_grounding: bool,
    timeout: Duration,
}

impl GeminiResponder {
    /// Create a responder from LLM settings
    #[must_use]
    pub fn new(provider: &ProviderConfig, config: &LlmConfig) -> Self {
        Self {
            client: GeminiClient::new(provider, &config.model),
            temperature: config.temperature,
            search_grounding: config.search_grounding,
            timeout: config.timeout,
        }
    }

    fn request(&self, ctx: &PromptContext) -> GenerateContentRequest {
        let mut request = GenerateContentRequest::new(vec![Part::text(ctx.user_text())]);
        request.system_instruction = Some(Content::text(ctx.system_instruction.clone()));
        if self.search_grounding {
            request.tools.push(Tool::GoogleSearch {});
        }
        request.generation_config = Some(GenerationConfig {
            temperature: self.temperature,
        });
        request
    }
}

#[async_trait]
impl LanguageModel for GeminiResponder {
    async fn generate_reply(&self, ctx: &PromptContext) -> Reply {
        tracing::debug!(
            model = %self.client.model(),
            utterance = %ctx.utterance,
            token = %ctx.decorrelation_token,
            search = self.search_grounding,
            "requesting reply"
        );

        match self.client.generate(&self.request(ctx), self.timeout).await {
            Ok(text) => {
                tracing::info!(chars = text.len(), "reply generated");
                Reply::Generated(text)
            }
            Err(e) if e.is_connection() => {
                tracing::error!(error = %e, "LLM request failed");
                Reply::fallback(FallbackReason::Connection)
            }
            Err(e) => {
                tracing::error!(error = %e, "LLM response unusable");
                Reply::fallback(FallbackReason::MalformedResponse)
            }
        }
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}
