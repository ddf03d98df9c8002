//! Text-to-speech (TTS) processing

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::codec::ContainerFormat;
use crate::config::{Config, ProviderConfig, TtsBackend, TtsConfig};
use crate::{Error, Result};

/// Longest text the Google speech endpoint accepts per request
pub const GOOGLE_MAX_CHUNK_CHARS: usize = 100;

/// Compressed speech plus the container it arrived in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    pub data: Vec<u8>,
    pub format: ContainerFormat,
}

/// Synthesizes speech from text
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Synthesize `text` into compressed audio
    ///
    /// # Errors
    ///
    /// Returns error if the text is empty or the provider fails
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Build the configured TTS backend
///
/// # Errors
///
/// Returns error if the backend needs credentials that are not configured
pub fn from_config(config: &Config) -> Result<Box<dyn TextToSpeech>> {
    let backend: Box<dyn TextToSpeech> = match config.tts.backend {
        TtsBackend::Google => Box::new(GoogleTts::new(&config.tts)),
        TtsBackend::OpenAI => Box::new(OpenAiTts::new(config.openai()?, &config.tts)?),
    };
    Ok(backend)
}

/// Split text into pieces of at most `max_chars` characters on word boundaries
///
/// Words longer than `max_chars` are cut at character boundaries.
#[must_use]
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;

    for word in text.split_whitespace() {
        let word_chars = word.chars().count();

        if word_chars > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_chars = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        let needed = if current.is_empty() { word_chars } else { current_chars + 1 + word_chars };
        if needed > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_chars = 0;
        }

        if !current.is_empty() {
            current.push(' ');
            current_chars += 1;
        }
        current.push_str(word);
        current_chars += word_chars;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Google Translate speech, the voice the `gTTS` library uses
pub struct GoogleTts {
    client: reqwest::Client,
    url: String,
    language: String,
    timeout: Duration,
}

impl GoogleTts {
    /// Create a Google speech client
    #[must_use]
    pub fn new(config: &TtsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.google_url.clone(),
            language: config.language.clone(),
            timeout: config.timeout,
        }
    }

    fn chunk_url(&self, chunk: &str, idx: usize, total: usize) -> String {
        format!(
            "{}?ie=UTF-8&client=tw-ob&tl={}&q={}&total={total}&idx={idx}&textlen={}",
            self.url,
            urlencoding::encode(&self.language),
            urlencoding::encode(chunk),
            chunk.chars().count(),
        )
    }
}

#[async_trait]
impl TextToSpeech for GoogleTts {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio> {
        let chunks = chunk_text(text, GOOGLE_MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Err(Error::Tts("no text to synthesize".to_string()));
        }

        tracing::debug!(
            chars = text.len(),
            chunks = chunks.len(),
            language = %self.language,
            "synthesizing with Google speech"
        );

        // MP3 frames are self-delimiting, so segments concatenate cleanly
        let mut data = Vec::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            let response = self
                .client
                .get(self.chunk_url(chunk, idx, chunks.len()))
                .header(reqwest::header::USER_AGENT, "Mozilla/5.0")
                .timeout(self.timeout)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                tracing::error!(status = %status, body = %body, chunk = idx, "Google speech error");
                return Err(Error::Tts(format!("Google speech error {status}: {body}")));
            }

            data.extend_from_slice(&response.bytes().await?);
        }

        Ok(SynthesizedAudio {
            data,
            format: ContainerFormat::Mp3,
        })
    }

    fn name(&self) -> &'static str {
        "google"
    }
}

/// `OpenAI` speech
pub struct OpenAiTts {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    voice: String,
    speed: f32,
    timeout: Duration,
}

impl OpenAiTts {
    /// Create an `OpenAI` speech client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(provider: &ProviderConfig, config: &TtsConfig) -> Result<Self> {
        if provider.api_key.expose_secret().is_empty() {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key: SecretString::from(provider.api_key.expose_secret().to_owned()),
            base_url: provider.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            voice: config.voice.clone(),
            speed: config.speed,
            timeout: config.timeout,
        })
    }
}

#[async_trait]
impl TextToSpeech for OpenAiTts {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
            response_format: &'a str,
        }

        if text.trim().is_empty() {
            return Err(Error::Tts("no text to synthesize".to_string()));
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
            response_format: "mp3",
        };

        tracing::debug!(chars = text.len(), voice = %self.voice, "synthesizing with OpenAI");

        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "OpenAI TTS error");
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(SynthesizedAudio {
            data: audio.to_vec(),
            format: ContainerFormat::Mp3,
        })
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn google(url: &str) -> GoogleTts {
        GoogleTts::new(&TtsConfig {
            google_url: url.to_string(),
            timeout: Duration::from_secs(5),
            ..TtsConfig::default()
        })
    }

    fn openai(url: &str) -> OpenAiTts {
        let provider = ProviderConfig {
            api_key: SecretString::from("test-key".to_string()),
            base_url: url.to_string(),
        };
        OpenAiTts::new(&provider, &TtsConfig::default()).unwrap()
    }

    #[test]
    fn test_chunk_short_text() {
        assert_eq!(chunk_text("Hello world", 100), vec!["Hello world"]);
        assert!(chunk_text("  \n ", 100).is_empty());
    }

    #[test]
    fn test_chunk_on_word_boundaries() {
        let text = "one two three four five six";
        let chunks = chunk_text(text, 9);
        assert_eq!(chunks, vec!["one two", "three", "four five", "six"]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 9));
        assert_eq!(chunks.join(" "), text);
    }

    #[test]
    fn test_chunk_long_word() {
        let chunks = chunk_text("ab abcdefgh cd", 3);
        assert_eq!(chunks, vec!["ab", "abc", "def", "gh", "cd"]);
    }

    #[test]
    fn test_chunk_counts_chars_not_bytes() {
        let text = "héllo wörld";
        assert_eq!(chunk_text(text, 11), vec![text]);
    }

    #[test]
    fn test_chunk_url_encodes_text() {
        let url = google("http://tts.local/translate_tts").chunk_url("Hi there & bye", 0, 1);
        assert!(url.starts_with("http://tts.local/translate_tts?ie=UTF-8&client=tw-ob&tl=en&q=Hi%20there%20%26%20bye"));
        assert!(url.ends_with("&total=1&idx=0&textlen=14"));
    }

    #[tokio::test]
    async fn test_google_concatenates_segments() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/translate_tts")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("tl".into(), "en".into()),
                mockito::Matcher::UrlEncoded("client".into(), "tw-ob".into()),
                mockito::Matcher::UrlEncoded("idx".into(), "0".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "audio/mpeg")
            .with_body([1u8, 2, 3])
            .create_async()
            .await;
        let second = server
            .mock("GET", "/translate_tts")
            .match_query(mockito::Matcher::UrlEncoded("idx".into(), "1".into()))
            .with_status(200)
            .with_body([4u8, 5])
            .create_async()
            .await;

        let text = format!("{} {}", "a".repeat(60), "b".repeat(60));
        let audio = google(&format!("{}/translate_tts", server.url()))
            .synthesize(&text)
            .await
            .unwrap();

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(audio.data, vec![1, 2, 3, 4, 5]);
        assert_eq!(audio.format, ContainerFormat::Mp3);
    }

    #[tokio::test]
    async fn test_google_error_status() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let err = google(&format!("{}/translate_tts", server.url()))
            .synthesize("hello")
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, Error::Tts(_)));
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        assert!(google("http://127.0.0.1:9").synthesize(" ").await.is_err());
        assert!(openai("http://127.0.0.1:9").synthesize("").await.is_err());
    }

    #[tokio::test]
    async fn test_openai_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/audio/speech")
            .match_header("authorization", "Bearer test-key")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"input":"Hello","voice":"alloy","model":"tts-1"}"#.to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "audio/mpeg")
            .with_body([0xFFu8, 0xFB, 0x14, 0xC0])
            .create_async()
            .await;

        let audio = openai(&server.url()).synthesize("Hello").await.unwrap();

        mock.assert_async().await;
        assert_eq!(audio.data, vec![0xFF, 0xFB, 0x14, 0xC0]);
    }

    #[tokio::test]
    async fn test_openai_error_status() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/audio/speech")
            .with_status(401)
            .with_body(r#"{"error":"bad key"}"#)
            .create_async()
            .await;

        let err = openai(&server.url()).synthesize("Hello").await.unwrap_err();

        mock.assert_async().await;
        assert!(err.to_string().contains("401"));
    }
}
