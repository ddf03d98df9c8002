//! Persona configuration
//!
//! A persona supplies the system instruction sent with every reply request,
//! the prompt used when nothing intelligible was heard, and voice settings.
//! Personas are read from JSON (preferred) or TOML files, with a default
//! compiled into the binary.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Prompt sent to the model when transcription yields nothing
pub const DEFAULT_CLARIFICATION_PROMPT: &str =
    "I couldn't understand that. Please try speaking again.";

/// System instruction used when a persona sets none
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful voice assistant. Respond concisely to the user's query.";

/// Embedded default persona
const EMBEDDED_DEFAULT: &str = include_str!("../personas/relay.json");

/// Identity and voice behavior of the assistant
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Persona {
    /// Schema URL (optional, for validation)
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Semantic version of this persona file
    pub version: String,

    /// Core identity (required)
    pub identity: Identity,

    /// Voice and audio configuration
    pub voice: Option<Voice>,

    /// Behavior and communication style
    pub personality: Option<Personality>,

    /// Model capabilities
    pub capabilities: Option<Capabilities>,
}

/// Core identity of the entity
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Unique identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Short descriptive phrase
    pub tagline: Option<String>,
}

/// Voice and audio configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Voice {
    /// Text-to-speech configuration
    pub tts: Option<TtsConfig>,
}

/// TTS configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsConfig {
    /// Voice identifier (`OpenAI` backend)
    pub voice: Option<String>,

    /// Language code (Google backend)
    pub language: Option<String>,

    /// Speech rate multiplier
    #[serde(default = "default_tts_speed")]
    pub speed: f32,
}

/// Behavior and communication style
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Personality {
    /// Base system prompt
    pub system_prompt: Option<String>,

    /// Prompt sent in place of an empty transcript
    pub clarification_prompt: Option<String>,
}

/// Model capabilities
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    /// Ground answers with web search
    #[serde(default)]
    pub search_grounding: bool,
}

const fn default_tts_speed() -> f32 {
    1.0
}

impl Persona {
    /// Load the persona compiled into the binary
    ///
    /// # Errors
    ///
    /// Returns error if the embedded JSON is invalid
    pub fn embedded_default() -> Result<Self> {
        serde_json::from_str(EMBEDDED_DEFAULT)
            .map_err(|e| Error::Config(format!("invalid embedded persona: {e}")))
    }

    /// Load a persona from a `.json` or `.toml` file
    ///
    /// # Errors
    ///
    /// Returns error if the file is missing or cannot be parsed
    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::PersonaNotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)?;
        let persona: Self = if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&content)?
        } else {
            serde_json::from_str(&content)
                .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))?
        };

        tracing::info!(
            persona_id = %persona.id(),
            path = %path.display(),
            "loaded persona"
        );
        Ok(persona)
    }

    /// Get the unique identifier
    #[must_use]
    pub fn id(&self) -> &str {
        &self.identity.id
    }

    /// Get the display name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.identity.name
    }

    /// System instruction for reply generation
    #[must_use]
    pub fn system_prompt(&self) -> &str {
        self.personality
            .as_ref()
            .and_then(|p| p.system_prompt.as_deref())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }

    /// Prompt used when nothing intelligible was heard
    #[must_use]
    pub fn clarification_prompt(&self) -> &str {
        self.personality
            .as_ref()
            .and_then(|p| p.clarification_prompt.as_deref())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_CLARIFICATION_PROMPT)
    }

    /// Get the TTS voice identifier
    #[must_use]
    pub fn tts_voice(&self) -> Option<&str> {
        self.voice.as_ref()?.tts.as_ref()?.voice.as_deref()
    }

    /// Get the TTS language, defaulting to English
    #[must_use]
    pub fn tts_language(&self) -> &str {
        self.voice
            .as_ref()
            .and_then(|v| v.tts.as_ref())
            .and_then(|tts| tts.language.as_deref())
            .unwrap_or("en")
    }

    /// Get the TTS speech rate
    #[must_use]
    pub fn tts_speed(&self) -> f32 {
        self.voice
            .as_ref()
            .and_then(|v| v.tts.as_ref())
            .map_or(1.0, |tts| tts.speed)
    }

    /// Whether replies may use web search grounding
    #[must_use]
    pub fn search_grounding(&self) -> bool {
        self.capabilities
            .as_ref()
            .is_some_and(|c| c.search_grounding)
    }
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            schema: None,
            version: "1.0.0".to_string(),
            identity: Identity {
                id: "assistant".to_string(),
                name: "Assistant".to_string(),
                tagline: None,
            },
            voice: None,
            personality: None,
            capabilities: None,
        }
    }
}
