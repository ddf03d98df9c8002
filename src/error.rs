//! Error types for Beacon relay

use thiserror::Error;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the relay
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Persona not found
    #[error("persona not found: {0}")]
    PersonaNotFound(String),

    /// Request rejected before entering the pipeline
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Audio container or codec error
    #[error("audio conversion error: {0}")]
    AudioConversion(#[from] AudioConversionError),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Language model error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Failures while packing, unpacking or transcoding audio
#[derive(Debug, Error)]
pub enum AudioConversionError {
    /// Sample width outside 1, 2 or 4 bytes
    #[error("unsupported sample width: {0} bytes")]
    UnsupportedSampleWidth(u16),

    /// Zero channels or zero sample rate
    #[error("invalid audio profile: {0}")]
    InvalidProfile(String),

    /// Payload is not a whole number of frames
    #[error("payload of {len} bytes is not a multiple of the {frame} byte frame size")]
    MisalignedPayload { len: usize, frame: usize },

    /// Container shorter than its fixed header
    #[error("container truncated: {len} bytes, header needs {header}")]
    Truncated { len: usize, header: usize },

    /// WAV parsing failed
    #[error("WAV decode error: {0}")]
    Wav(#[from] hound::Error),

    /// MP3 decoding failed
    #[error("MP3 decode error: {0}")]
    Mp3(String),

    /// Decoder produced no samples
    #[error("no audio frames found in {0} stream")]
    Empty(&'static str),

    /// Resampler construction or processing failed
    #[error("resample error: {0}")]
    Resample(String),
}
