//! Beacon Relay - Voice relay between small devices and AI providers
//!
//! A device records an utterance and posts it as raw PCM; the relay turns it
//! into a spoken reply in the same format:
//!
//! ```text
//! ┌──────────┐  PCM   ┌─────────────────────────────────────────────┐
//! │  Device  │───────▶│                Beacon Relay                 │
//! │          │◀───────│  STT ─▶ LLM ─▶ Sanitize ─▶ TTS ─▶ Decode    │
//! └──────────┘  PCM   └──────┬────────┬──────────────┬──────────────┘
//!                            │        │              │
//!                      Gemini/Whisper Gemini   Google/OpenAI speech
//! ```
//!
//! Provider failures degrade into spoken fallback sentences; only a failure
//! to produce audio fails the request.

pub mod api;
pub mod config;
pub mod debug;
pub mod error;
pub mod gemini;
pub mod llm;
pub mod persona;
pub mod pipeline;
pub mod sanitize;
pub mod voice;

pub use api::{ApiServer, ApiServerBuilder, ServiceInfo};
pub use config::Config;
pub use debug::DebugRecorder;
pub use error::{AudioConversionError, Error, Result};
pub use llm::{FallbackReason, LanguageModel, PromptContext, Reply};
pub use persona::Persona;
pub use pipeline::{OutcomeStatus, Pipeline, PipelineOutcome, PipelineStage};
pub use sanitize::sanitize;
