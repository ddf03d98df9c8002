//! Configuration management for Beacon relay

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use crate::{Error, Persona, Result};

/// Default Gemini REST endpoint
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model for both transcription and replies
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-lite";

/// Default Google Translate speech endpoint
pub const DEFAULT_GOOGLE_TTS_URL: &str = "https://translate.google.com/translate_tts";

/// Default `OpenAI` REST endpoint
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Beacon relay configuration
///
/// Built once at startup and shared read-only between requests.
#[derive(Debug)]
pub struct Config {
    /// Active persona
    pub persona: Persona,

    /// Gemini credentials and endpoint (STT and LLM)
    pub provider: ProviderConfig,

    /// `OpenAI` credentials, present when `OPENAI_API_KEY` is set
    pub openai: Option<ProviderConfig>,

    /// Reply generation settings
    pub llm: LlmConfig,

    /// Speech-to-text settings
    pub stt: SttConfig,

    /// Text-to-speech settings
    pub tts: TtsConfig,

    /// HTTP API server configuration
    pub api_server: ApiServerConfig,

    /// Request/response audio dumps
    pub debug: DebugConfig,
}

/// Credentials for a remote provider
#[derive(Debug)]
pub struct ProviderConfig {
    /// API key, sent as the provider requires
    pub api_key: SecretString,

    /// Base URL without trailing slash
    pub base_url: String,
}

/// Reply generation settings
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Model identifier (e.g. "gemini-2.5-flash-lite")
    pub model: String,

    /// Sampling temperature; high values keep replies varied
    pub temperature: f32,

    /// Allow the model to ground answers with web search
    pub search_grounding: bool,

    /// Request timeout
    pub timeout: Duration,
}

/// Which service transcribes audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SttBackend {
    /// Gemini multimodal transcription
    #[default]
    Gemini,
    /// `OpenAI` Whisper
    Whisper,
}

/// Speech-to-text settings
#[derive(Debug, Clone)]
pub struct SttConfig {
    pub backend: SttBackend,

    /// Model identifier (Gemini model or e.g. "whisper-1")
    pub model: String,

    /// Request timeout
    pub timeout: Duration,
}

/// Which service synthesizes speech
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TtsBackend {
    /// Google Translate speech (MP3, language-selected voice)
    #[default]
    Google,
    /// `OpenAI` speech
    OpenAI,
}

/// Text-to-speech settings
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub backend: TtsBackend,

    /// Language/locale for the Google voice (e.g. "en")
    pub language: String,

    /// Endpoint for the Google voice
    pub google_url: String,

    /// `OpenAI` model (e.g. "tts-1")
    pub model: String,

    /// `OpenAI` voice identifier
    pub voice: String,

    /// `OpenAI` speed multiplier (0.25 to 4.0)
    pub speed: f32,

    /// Request timeout
    pub timeout: Duration,
}

/// HTTP API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Largest accepted request body
    pub max_body_bytes: usize,
}

/// Debug audio persistence
#[derive(Debug, Clone, Default)]
pub struct DebugConfig {
    /// Write request/response audio to disk
    pub enabled: bool,

    /// Directory for debug files
    pub dir: PathBuf,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.9,
            search_grounding: false,
            timeout: Duration::from_secs(15),
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            backend: SttBackend::Gemini,
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            backend: TtsBackend::Google,
            language: "en".to_string(),
            google_url: DEFAULT_GOOGLE_TTS_URL.to_string(),
            model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            speed: 1.0,
            timeout: Duration::from_secs(30),
        }
    }
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            port: 5002,
            max_body_bytes: 4 * 1024 * 1024,
        }
    }
}

impl std::str::FromStr for SttBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "whisper" | "openai" => Ok(Self::Whisper),
            other => Err(Error::Config(format!("unknown STT backend: {other}"))),
        }
    }
}

impl std::str::FromStr for TtsBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" | "gtts" => Ok(Self::Google),
            "openai" => Ok(Self::OpenAI),
            other => Err(Error::Config(format!("unknown TTS backend: {other}"))),
        }
    }
}

/// Return the data directory, e.g. `~/.local/share/omni/beacon-relay` on Linux
#[must_use]
pub fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("dev", "omni", "omni")
        .map_or_else(|| PathBuf::from("."), |d| d.data_dir().join("beacon-relay"))
}

impl Config {
    /// Load configuration from the environment
    ///
    /// # Errors
    ///
    /// Returns error if `GEMINI_API_KEY` is missing, a numeric setting is
    /// malformed, a backend needs an `OpenAI` key that is not set, or the
    /// persona cannot be loaded
    pub fn load(persona_path: Option<&Path>) -> Result<Self> {
        let persona = match persona_path {
            Some(path) => Persona::load_file(path)?,
            None => Persona::embedded_default()?,
        };

        let api_key = env_non_empty("GEMINI_API_KEY")
            .ok_or_else(|| Error::Config("GEMINI_API_KEY not set".to_string()))?;
        let provider = ProviderConfig {
            api_key: SecretString::from(api_key),
            base_url: env_or("GEMINI_BASE_URL", DEFAULT_GEMINI_BASE_URL),
        };

        let openai = env_non_empty("OPENAI_API_KEY").map(|key| ProviderConfig {
            api_key: SecretString::from(key),
            base_url: env_or("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
        });

        let llm_defaults = LlmConfig::default();
        let llm = LlmConfig {
            model: env_or("BEACON_LLM_MODEL", &llm_defaults.model),
            temperature: env_parse("BEACON_LLM_TEMPERATURE")?.unwrap_or(llm_defaults.temperature),
            search_grounding: env_flag("BEACON_SEARCH_GROUNDING")
                .unwrap_or_else(|| persona.search_grounding()),
            timeout: env_secs("BEACON_LLM_TIMEOUT_SECS")?.unwrap_or(llm_defaults.timeout),
        };

        let stt_backend = std::env::var("BEACON_STT_BACKEND")
            .ok()
            .map(|s| s.parse::<SttBackend>())
            .transpose()?
            .unwrap_or_default();
        let stt_default_model = match stt_backend {
            SttBackend::Gemini => llm.model.clone(),
            SttBackend::Whisper => "whisper-1".to_string(),
        };
        let stt = SttConfig {
            backend: stt_backend,
            model: env_or("BEACON_STT_MODEL", &stt_default_model),
            timeout: env_secs("BEACON_STT_TIMEOUT_SECS")?.unwrap_or_else(|| SttConfig::default().timeout),
        };

        let tts_defaults = TtsConfig::default();
        let tts = TtsConfig {
            backend: std::env::var("BEACON_TTS_BACKEND")
                .ok()
                .map(|s| s.parse::<TtsBackend>())
                .transpose()?
                .unwrap_or_default(),
            language: env_non_empty("BEACON_TTS_LANGUAGE")
                .unwrap_or_else(|| persona.tts_language().to_string()),
            google_url: env_or("BEACON_GOOGLE_TTS_URL", DEFAULT_GOOGLE_TTS_URL),
            model: env_or("BEACON_TTS_MODEL", &tts_defaults.model),
            voice: env_non_empty("BEACON_TTS_VOICE")
                .or_else(|| persona.tts_voice().map(ToString::to_string))
                .unwrap_or(tts_defaults.voice),
            speed: persona.tts_speed(),
            timeout: env_secs("BEACON_TTS_TIMEOUT_SECS")?.unwrap_or(tts_defaults.timeout),
        };

        if openai.is_none()
            && (stt.backend == SttBackend::Whisper || tts.backend == TtsBackend::OpenAI)
        {
            return Err(Error::Config(
                "OPENAI_API_KEY required for the OpenAI STT/TTS backends".to_string(),
            ));
        }

        let server_defaults = ApiServerConfig::default();
        let api_server = ApiServerConfig {
            port: match env_parse("BEACON_PORT")? {
                Some(port) => port,
                None => env_parse("PORT")?.unwrap_or(server_defaults.port),
            },
            max_body_bytes: env_parse("BEACON_MAX_BODY_BYTES")?
                .unwrap_or(server_defaults.max_body_bytes),
        };

        let debug = DebugConfig {
            enabled: env_flag("BEACON_DEBUG_AUDIO").unwrap_or(false),
            dir: std::env::var("BEACON_DEBUG_DIR")
                .map_or_else(|_| data_dir().join("debug"), PathBuf::from),
        };

        Ok(Self {
            persona,
            provider,
            openai,
            llm,
            stt,
            tts,
            api_server,
            debug,
        })
    }

    /// `OpenAI` credentials, required by the Whisper and `OpenAI` speech backends
    ///
    /// # Errors
    ///
    /// Returns error if `OPENAI_API_KEY` was not configured
    pub fn openai(&self) -> Result<&ProviderConfig> {
        self.openai
            .as_ref()
            .ok_or_else(|| Error::Config("OPENAI_API_KEY not set".to_string()))
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(name: &str, default: &str) -> String {
    env_non_empty(name).unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    env_non_empty(name)
        .map(|v| parse_setting(name, &v))
        .transpose()
}

/// Parse one setting, naming the variable when the value is malformed
fn parse_setting<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid value for {name}: {value:?}")))
}

fn env_flag(name: &str) -> Option<bool> {
    env_non_empty(name).map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

fn env_secs(name: &str) -> Result<Option<Duration>> {
    Ok(env_parse::<u64>(name)?.map(Duration::from_secs))
}
