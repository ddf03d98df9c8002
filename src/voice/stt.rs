//! Speech-to-text (STT) processing
//!
//! Transcription is best effort: every failure collapses into an empty
//! result, because an unintelligible utterance and a provider outage are
//! handled the same way downstream (ask the user to try again).

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use secrecy::{ExposeSecret, SecretString};

use super::codec::{AudioBuffer, ContainerFormat, wrap_pcm_as_wav};
use crate::config::{Config, ProviderConfig, SttBackend};
use crate::gemini::{GeminiClient, GenerateContentRequest, GenerateError, Part};
use crate::{Error, Result};

/// Instruction sent alongside the audio
const TRANSCRIBE_INSTRUCTION: &str = "Transcribe the speech in this audio exactly as spoken. \
     Ignore background noise and music. Respond with only the transcript, or with nothing \
     if no speech is present.";

/// Which backend produced a transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptSource {
    Gemini,
    Whisper,
}

impl TranscriptSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Whisper => "whisper",
        }
    }
}

/// Best-effort transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionResult {
    /// Trimmed transcript; `None` means no speech was recognized
    pub text: Option<String>,

    /// Backend that produced it
    pub source: TranscriptSource,
}

impl TranscriptionResult {
    /// Build a result, treating blank text as no speech
    #[must_use]
    pub fn from_text(text: &str, source: TranscriptSource) -> Self {
        let trimmed = text.trim();
        Self {
            text: (!trimmed.is_empty()).then(|| trimmed.to_string()),
            source,
        }
    }

    /// Result for audio with no recognizable speech
    #[must_use]
    pub const fn empty(source: TranscriptSource) -> Self {
        Self { text: None, source }
    }

    /// Transcript text, if any speech was recognized
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

/// Transcribes device audio
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe PCM audio; never fails, returns an empty result instead
    async fn transcribe(&self, audio: &AudioBuffer) -> TranscriptionResult;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Build the configured STT backend
///
/// # Errors
///
/// Returns error if the backend needs credentials that are not configured
pub fn from_config(config: &Config) -> Result<Box<dyn SpeechToText>> {
    let backend: Box<dyn SpeechToText> = match config.stt.backend {
        SttBackend::Gemini => Box::new(GeminiTranscriber::new(
            &config.provider,
            &config.stt.model,
            config.stt.timeout,
        )),
        SttBackend::Whisper => Box::new(WhisperTranscriber::new(
            config.openai()?,
            &config.stt.model,
            config.stt.timeout,
        )?),
    };
    Ok(backend)
}

/// Transcription through a multimodal Gemini model
pub struct GeminiTranscriber {
    client: GeminiClient,
    timeout: Duration,
}

impl GeminiTranscriber {
    /// Create a transcriber for `model`
    #[must_use]
    pub fn new(provider: &ProviderConfig, model: &str, timeout: Duration) -> Self {
        Self {
            client: GeminiClient::new(provider, model),
            timeout,
        }
    }

    fn request(audio: &AudioBuffer) -> GenerateContentRequest {
        let wav = wrap_pcm_as_wav(audio);
        GenerateContentRequest::new(vec![
            Part::text(TRANSCRIBE_INSTRUCTION),
            Part::inline(ContainerFormat::Wav.mime_type(), BASE64.encode(wav)),
        ])
    }
}

#[async_trait]
impl SpeechToText for GeminiTranscriber {
    async fn transcribe(&self, audio: &AudioBuffer) -> TranscriptionResult {
        tracing::debug!(
            audio_bytes = audio.as_bytes().len(),
            duration_ms = audio.duration_ms(),
            model = %self.client.model(),
            "starting Gemini transcription"
        );

        match self.client.generate(&Self::request(audio), self.timeout).await {
            Ok(text) => {
                let result = TranscriptionResult::from_text(&text, TranscriptSource::Gemini);
                tracing::info!(transcript = ?result.text(), "transcription complete");
                result
            }
            Err(e @ (GenerateError::Transport(_) | GenerateError::Status { .. })) => {
                tracing::error!(error = %e, "Gemini transcription request failed");
                TranscriptionResult::empty(TranscriptSource::Gemini)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Gemini transcription response unusable");
                TranscriptionResult::empty(TranscriptSource::Gemini)
            }
        }
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

/// Response from `OpenAI` Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Transcription through `OpenAI` Whisper
pub struct WhisperTranscriber {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl WhisperTranscriber {
    /// Create a Whisper transcriber
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(provider: &ProviderConfig, model: &str, timeout: Duration) -> Result<Self> {
        if provider.api_key.expose_secret().is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for Whisper".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key: SecretString::from(provider.api_key.expose_secret().to_owned()),
            base_url: provider.base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout,
        })
    }

    async fn request(&self, audio: &AudioBuffer) -> Result<String> {
        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wrap_pcm_as_wav(audio))
                    .file_name("audio.wav")
                    .mime_str(ContainerFormat::Wav.mime_type())
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Stt(format!("Whisper API error {status}: {body}")));
        }

        let body = response.bytes().await?;
        let result: WhisperResponse = serde_json::from_slice(&body)?;
        Ok(result.text)
    }
}

#[async_trait]
impl SpeechToText for WhisperTranscriber {
    async fn transcribe(&self, audio: &AudioBuffer) -> TranscriptionResult {
        tracing::debug!(audio_bytes = audio.as_bytes().len(), "starting Whisper transcription");

        match self.request(audio).await {
            Ok(text) => {
                let result = TranscriptionResult::from_text(&text, TranscriptSource::Whisper);
                tracing::info!(transcript = ?result.text(), "transcription complete");
                result
            }
            Err(e) => {
                tracing::error!(error = %e, "Whisper transcription failed");
                TranscriptionResult::empty(TranscriptSource::Whisper)
            }
        }
    }

    fn name(&self) -> &'static str {
        "whisper"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::AudioProfile;

    fn provider(url: &str) -> ProviderConfig {
        ProviderConfig {
            api_key: SecretString::from("test-key".to_string()),
            base_url: url.to_string(),
        }
    }

    fn speech() -> AudioBuffer {
        AudioBuffer::new(vec![1, 0, 2, 0, 3, 0, 4, 0], AudioProfile::DEVICE).unwrap()
    }

    fn gemini(url: &str) -> GeminiTranscriber {
        GeminiTranscriber::new(&provider(url), "test-model", Duration::from_secs(5))
    }

    #[test]
    fn test_from_text_trims_and_blanks() {
        let r = TranscriptionResult::from_text("  turn on the light \n", TranscriptSource::Gemini);
        assert_eq!(r.text(), Some("turn on the light"));

        let r = TranscriptionResult::from_text(" \n ", TranscriptSource::Whisper);
        assert_eq!(r.text(), None);
        assert_eq!(r.source, TranscriptSource::Whisper);
    }

    #[test]
    fn test_request_carries_wav_audio() {
        let request = GeminiTranscriber::request(&speech());
        let json = serde_json::to_value(&request).unwrap();

        let encoded = json["contents"][0]["parts"][1]["inlineData"]["data"]
            .as_str()
            .unwrap();
        let wav = BASE64.decode(encoded).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(wav.len(), 44 + 8);
        assert!(
            json["contents"][0]["parts"][0]["text"]
                .as_str()
                .unwrap()
                .contains("background noise")
        );
    }

    #[tokio::test]
    async fn test_gemini_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/test-model:generateContent")
            .match_query(mockito::Matcher::UrlEncoded("key".into(), "test-key".into()))
            .match_body(mockito::Matcher::Regex(r#""mimeType":"audio/wav""#.to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"candidates":[{"content":{"parts":[{"text":" What time is it? "}]}}]}"#)
            .create_async()
            .await;

        let result = gemini(&server.url()).transcribe(&speech()).await;

        mock.assert_async().await;
        assert_eq!(result.text(), Some("What time is it?"));
        assert_eq!(result.source, TranscriptSource::Gemini);
    }

    #[tokio::test]
    async fn test_gemini_server_error_is_empty() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", mockito::Matcher::Any)
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let result = gemini(&server.url()).transcribe(&speech()).await;

        mock.assert_async().await;
        assert_eq!(result.text(), None);
    }

    #[tokio::test]
    async fn test_gemini_malformed_is_empty() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"candidates":[]}"#)
            .create_async()
            .await;

        let result = gemini(&server.url()).transcribe(&speech()).await;

        mock.assert_async().await;
        assert_eq!(result.text(), None);
    }

    #[tokio::test]
    async fn test_gemini_unreachable_is_empty() {
        // Nothing listens on the discard port
        let result = gemini("http://127.0.0.1:9").transcribe(&speech()).await;
        assert_eq!(result.text(), None);
    }

    #[tokio::test]
    async fn test_whisper_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/audio/transcriptions")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"text": "Hello from the device"}"#)
            .create_async()
            .await;

        let stt = WhisperTranscriber::new(&provider(&server.url()), "whisper-1", Duration::from_secs(5)).unwrap();
        let result = stt.transcribe(&speech()).await;

        mock.assert_async().await;
        assert_eq!(result.text(), Some("Hello from the device"));
        assert_eq!(result.source, TranscriptSource::Whisper);
    }

    #[tokio::test]
    async fn test_whisper_unauthorized_is_empty() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/audio/transcriptions")
            .with_status(401)
            .with_body(r#"{"error": "Invalid API key"}"#)
            .create_async()
            .await;

        let stt = WhisperTranscriber::new(&provider(&server.url()), "whisper-1", Duration::from_secs(5)).unwrap();
        let result = stt.transcribe(&speech()).await;

        mock.assert_async().await;
        assert_eq!(result.text(), None);
    }

    #[test]
    fn test_whisper_requires_key() {
        let mut p = provider("http://localhost");
        p.api_key = SecretString::from(String::new());
        assert!(WhisperTranscriber::new(&p, "whisper-1", Duration::from_secs(1)).is_err());
    }
}
