//! Voice request orchestration
//!
//! One utterance in, one spoken reply out: STT, then the language model,
//! then sanitization, then TTS, then decoding to device PCM. Every stage
//! runs exactly once. Only TTS and audio decoding can fail the request;
//! earlier problems degrade into fallback text.

use std::fmt;
use std::sync::Arc;

use crate::llm::{FallbackReason, GeminiResponder, LanguageModel, MALFORMED_FALLBACK, PromptContext, Reply};
use crate::sanitize::sanitize;
use crate::voice::{self, AudioBuffer, SpeechToText, TextToSpeech, decode_to_target_pcm};
use crate::{Config, Error, Persona, Result};

/// Where a request is in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    ReceivingAudio,
    Transcribing,
    AwaitingReply,
    Synthesizing,
    Emitting,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReceivingAudio => "receiving_audio",
            Self::Transcribing => "transcribing",
            Self::AwaitingReply => "awaiting_reply",
            Self::Synthesizing => "synthesizing",
            Self::Emitting => "emitting",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How a request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// The model's own answer was spoken
    Ok,
    /// A fallback sentence was spoken
    Degraded(FallbackReason),
    /// No audio could be produced
    Failed,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("ok"),
            Self::Degraded(reason) => write!(f, "degraded({reason})"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// What happened along the way, for logs and debug dumps
#[derive(Debug, Clone, Default)]
pub struct StageTrace {
    /// Stages entered, in order
    pub stages: Vec<PipelineStage>,

    /// Recognized speech, `None` if nothing intelligible was heard
    pub transcript: Option<String>,

    /// Raw model reply
    pub reply: Option<Reply>,

    /// Sanitized text handed to TTS
    pub spoken: Option<String>,

    /// Error that failed the request
    pub error: Option<String>,
}

impl StageTrace {
    fn enter(&mut self, stage: PipelineStage) {
        tracing::debug!(stage = %stage, "pipeline stage");
        self.stages.push(stage);
    }

    /// Last stage entered
    #[must_use]
    pub fn last_stage(&self) -> Option<PipelineStage> {
        self.stages.last().copied()
    }
}

/// Result of one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub status: OutcomeStatus,

    /// Device PCM; present unless `status` is `Failed`
    pub audio: Option<AudioBuffer>,

    pub trace: StageTrace,
}

/// Runs utterances through STT, the language model and TTS
pub struct Pipeline {
    stt: Arc<dyn SpeechToText>,
    llm: Arc<dyn LanguageModel>,
    tts: Arc<dyn TextToSpeech>,
    persona: Persona,
}

impl Pipeline {
    /// Assemble a pipeline from its stages
    #[must_use]
    pub fn new(
        stt: Arc<dyn SpeechToText>,
        llm: Arc<dyn LanguageModel>,
        tts: Arc<dyn TextToSpeech>,
        persona: Persona,
    ) -> Self {
        Self {
            stt,
            llm,
            tts,
            persona,
        }
    }

    /// Build the configured backends
    ///
    /// # Errors
    ///
    /// Returns error if a backend cannot be created from the configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let stt: Arc<dyn SpeechToText> = Arc::from(voice::stt::from_config(config)?);
        let tts: Arc<dyn TextToSpeech> = Arc::from(voice::tts::from_config(config)?);
        let llm = Arc::new(GeminiResponder::new(&config.provider, &config.llm));

        tracing::info!(
            stt = stt.name(),
            llm = llm.name(),
            tts = tts.name(),
            persona = %config.persona.id(),
            "pipeline ready"
        );

        Ok(Self::new(stt, llm, tts, config.persona.clone()))
    }

    /// Active persona
    #[must_use]
    pub const fn persona(&self) -> &Persona {
        &self.persona
    }

    /// Speech recognizer, for transcription without a reply
    #[must_use]
    pub fn stt(&self) -> &dyn SpeechToText {
        self.stt.as_ref()
    }

    /// Answer one utterance with spoken audio
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `input` holds no audio. Provider
    /// failures never surface as errors; they show up in the outcome status.
    pub async fn process(&self, input: &AudioBuffer) -> Result<PipelineOutcome> {
        if input.is_empty() {
            return Err(Error::InvalidInput("no audio data received".to_string()));
        }

        let mut trace = StageTrace::default();
        trace.enter(PipelineStage::ReceivingAudio);
        tracing::info!(
            bytes = input.as_bytes().len(),
            duration_ms = input.duration_ms(),
            "received audio"
        );

        trace.enter(PipelineStage::Transcribing);
        let transcription = self.stt.transcribe(input).await;
        trace.transcript = transcription.text().map(ToString::to_string);

        let utterance = if let Some(text) = transcription.text() {
            text.to_string()
        } else {
            tracing::info!(source = transcription.source.as_str(), "no speech recognized, asking to repeat");
            self.persona.clarification_prompt().to_string()
        };

        Ok(self.answer(utterance, trace).await)
    }

    /// Answer typed text with spoken audio, skipping transcription
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `text` is blank
    pub async fn respond_to_text(&self, text: &str) -> Result<PipelineOutcome> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("no text received".to_string()));
        }

        let trace = StageTrace {
            transcript: Some(text.trim().to_string()),
            ..StageTrace::default()
        };
        Ok(self.answer(text.trim().to_string(), trace).await)
    }

    async fn answer(&self, utterance: String, mut trace: StageTrace) -> PipelineOutcome {
        trace.enter(PipelineStage::AwaitingReply);
        let ctx = PromptContext::new(utterance, self.persona.system_prompt());
        let reply = self.llm.generate_reply(&ctx).await;

        let mut degraded = reply.fallback_reason();
        let mut spoken = sanitize(reply.text());
        if spoken.is_empty() {
            tracing::warn!(raw = %reply.text(), "reply empty after sanitization");
            spoken = MALFORMED_FALLBACK.to_string();
            degraded = Some(FallbackReason::MalformedResponse);
        }
        trace.reply = Some(reply);
        trace.spoken = Some(spoken.clone());

        trace.enter(PipelineStage::Synthesizing);
        let audio = match self.synthesize(&spoken).await {
            Ok(audio) => audio,
            Err(e) => {
                tracing::error!(error = %e, backend = self.tts.name(), "speech synthesis failed");
                trace.enter(PipelineStage::Failed);
                trace.error = Some(e.to_string());
                return PipelineOutcome {
                    status: OutcomeStatus::Failed,
                    audio: None,
                    trace,
                };
            }
        };

        trace.enter(PipelineStage::Emitting);
        let status = degraded.map_or(OutcomeStatus::Ok, OutcomeStatus::Degraded);
        tracing::info!(
            status = %status,
            frames = audio.frames(),
            duration_ms = audio.duration_ms(),
            "reply ready"
        );

        PipelineOutcome {
            status,
            audio: Some(audio),
            trace,
        }
    }

    async fn synthesize(&self, text: &str) -> Result<AudioBuffer> {
        let synthesized = self.tts.synthesize(text).await?;
        Ok(decode_to_target_pcm(&synthesized.data, synthesized.format)?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::voice::{AudioProfile, ContainerFormat, SynthesizedAudio, TranscriptSource, TranscriptionResult, wrap_pcm_as_wav};

    struct FixedStt(Option<&'static str>);

    #[async_trait]
    impl SpeechToText for FixedStt {
        async fn transcribe(&self, _audio: &AudioBuffer) -> TranscriptionResult {
            TranscriptionResult::from_text(self.0.unwrap_or(""), TranscriptSource::Gemini)
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    /// Echoes a canned reply and remembers what it was asked
    struct RecordingLlm {
        reply: Reply,
        seen: Mutex<Vec<PromptContext>>,
    }

    #[async_trait]
    impl LanguageModel for RecordingLlm {
        async fn generate_reply(&self, ctx: &PromptContext) -> Reply {
            self.seen.lock().unwrap().push(ctx.clone());
            self.reply.clone()
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    /// Speaks 100 ms of 24 kHz WAV and remembers the text
    #[derive(Default)]
    struct WavTts {
        spoken: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextToSpeech for WavTts {
        async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio> {
            self.spoken.lock().unwrap().push(text.to_string());
            let buffer = AudioBuffer::from_i16_samples(&[0; 2400], 24000, 1);
            Ok(SynthesizedAudio {
                data: wrap_pcm_as_wav(&buffer),
                format: ContainerFormat::Wav,
            })
        }

        fn name(&self) -> &'static str {
            "wav"
        }
    }

    fn pipeline(
        transcript: Option<&'static str>,
        reply: Reply,
    ) -> (Pipeline, Arc<RecordingLlm>, Arc<WavTts>) {
        let llm = Arc::new(RecordingLlm {
            reply,
            seen: Mutex::new(Vec::new()),
        });
        let tts = Arc::new(WavTts::default());
        let pipeline = Pipeline::new(
            Arc::new(FixedStt(transcript)),
            llm.clone(),
            tts.clone(),
            Persona::default(),
        );
        (pipeline, llm, tts)
    }

    fn speech() -> AudioBuffer {
        AudioBuffer::from_i16_samples(&[100; 1600], 16000, 1)
    }

    #[tokio::test]
    async fn test_stages_in_order() {
        let (pipeline, _, _) = pipeline(Some("hello"), Reply::Generated("Hi there.".into()));
        let outcome = pipeline.process(&speech()).await.unwrap();

        assert_eq!(outcome.status, OutcomeStatus::Ok);
        assert_eq!(
            outcome.trace.stages,
            vec![
                PipelineStage::ReceivingAudio,
                PipelineStage::Transcribing,
                PipelineStage::AwaitingReply,
                PipelineStage::Synthesizing,
                PipelineStage::Emitting,
            ]
        );
        let audio = outcome.audio.unwrap();
        assert_eq!(audio.profile(), AudioProfile::DEVICE);
        assert_eq!(audio.frames(), 1600);
    }

    #[tokio::test]
    async fn test_reply_is_sanitized_before_tts() {
        let (pipeline, llm, tts) =
            pipeline(Some("weather?"), Reply::Generated("**Sunny** [1] today\n".into()));
        let outcome = pipeline.process(&speech()).await.unwrap();

        assert_eq!(tts.spoken.lock().unwrap().as_slice(), ["Sunny today"]);
        assert_eq!(outcome.trace.spoken.as_deref(), Some("Sunny today"));
        assert_eq!(llm.seen.lock().unwrap()[0].utterance, "weather?");
    }

    #[tokio::test]
    async fn test_empty_after_sanitize_speaks_fallback() {
        let (pipeline, _, tts) = pipeline(Some("hi"), Reply::Generated("[citation] **".into()));
        let outcome = pipeline.process(&speech()).await.unwrap();

        assert_eq!(
            outcome.status,
            OutcomeStatus::Degraded(FallbackReason::MalformedResponse)
        );
        assert_eq!(tts.spoken.lock().unwrap().as_slice(), [MALFORMED_FALLBACK]);
        assert!(outcome.audio.is_some());
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let (pipeline, llm, _) = pipeline(Some("hi"), Reply::Generated("x".into()));
        let empty = AudioBuffer::from_device(Vec::new()).unwrap();

        let err = pipeline.process(&empty).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(llm.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_respond_to_text_skips_stt() {
        let (pipeline, llm, _) = pipeline(None, Reply::Generated("Done.".into()));
        let outcome = pipeline.respond_to_text("  lights off ").await.unwrap();

        assert_eq!(outcome.status, OutcomeStatus::Ok);
        assert_eq!(outcome.trace.stages[0], PipelineStage::AwaitingReply);
        assert_eq!(llm.seen.lock().unwrap()[0].utterance, "lights off");
        assert!(pipeline.respond_to_text(" ").await.is_err());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(OutcomeStatus::Ok.to_string(), "ok");
        assert_eq!(
            OutcomeStatus::Degraded(FallbackReason::Connection).to_string(),
            "degraded(connection)"
        );
        assert_eq!(PipelineStage::AwaitingReply.to_string(), "awaiting_reply");
    }
}
