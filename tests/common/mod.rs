//! Shared test utilities
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use beacon_relay::llm::{LanguageModel, PromptContext, Reply};
use beacon_relay::voice::{
    AudioBuffer, ContainerFormat, SpeechToText, SynthesizedAudio, TextToSpeech, TranscriptSource,
    TranscriptionResult, wrap_pcm_as_wav,
};
use beacon_relay::{Error, Persona, Pipeline, Result};

/// Silent MPEG-1 Layer III frames: 48 kHz, 32 kbps, mono, 96 bytes each
#[must_use]
pub fn silent_mp3(frames: usize) -> Vec<u8> {
    let mut frame = vec![0u8; 96];
    frame[..4].copy_from_slice(&[0xFF, 0xFB, 0x14, 0xC0]);
    frame.repeat(frames)
}

/// Device PCM holding a quiet square wave
#[must_use]
pub fn device_audio(ms: usize) -> AudioBuffer {
    let samples: Vec<i16> = (0..ms * 16)
        .map(|i| if (i / 20) % 2 == 0 { 800 } else { -800 })
        .collect();
    AudioBuffer::from_i16_samples(&samples, 16000, 1)
}

/// STT returning a fixed transcript
pub struct StubStt(pub Option<String>);

impl StubStt {
    pub fn heard(text: &str) -> Arc<Self> {
        Arc::new(Self(Some(text.to_string())))
    }

    pub fn silence() -> Arc<Self> {
        Arc::new(Self(None))
    }
}

#[async_trait]
impl SpeechToText for StubStt {
    async fn transcribe(&self, _audio: &AudioBuffer) -> TranscriptionResult {
        match &self.0 {
            Some(text) => TranscriptionResult::from_text(text, TranscriptSource::Gemini),
            None => TranscriptionResult::empty(TranscriptSource::Gemini),
        }
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// Language model returning a fixed reply and recording prompts
pub struct StubLlm {
    reply: Reply,
    pub prompts: Mutex<Vec<PromptContext>>,
}

impl StubLlm {
    pub fn replying(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn utterances(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.utterance.clone())
            .collect()
    }
}

#[async_trait]
impl LanguageModel for StubLlm {
    async fn generate_reply(&self, ctx: &PromptContext) -> Reply {
        self.prompts.lock().unwrap().push(ctx.clone());
        self.reply.clone()
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// What the stub TTS hands back
pub enum TtsBehavior {
    /// Silent MP3 that decodes cleanly
    SilentMp3,
    /// Bytes no decoder accepts
    Garbage,
    /// Valid WAV whose single 48 kHz sample does not survive resampling
    OneSampleWav,
    /// Provider error
    Fail,
}

/// TTS with scripted behavior, recording what it was asked to say
pub struct StubTts {
    behavior: TtsBehavior,
    pub spoken: Mutex<Vec<String>>,
}

impl StubTts {
    pub fn new(behavior: TtsBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            spoken: Mutex::new(Vec::new()),
        })
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextToSpeech for StubTts {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio> {
        self.spoken.lock().unwrap().push(text.to_string());
        match self.behavior {
            TtsBehavior::SilentMp3 => Ok(SynthesizedAudio {
                data: silent_mp3(8),
                format: ContainerFormat::Mp3,
            }),
            TtsBehavior::Garbage => Ok(SynthesizedAudio {
                data: vec![0x42; 512],
                format: ContainerFormat::Mp3,
            }),
            TtsBehavior::OneSampleWav => Ok(SynthesizedAudio {
                data: wrap_pcm_as_wav(&AudioBuffer::from_i16_samples(&[1000], 48000, 1)),
                format: ContainerFormat::Wav,
            }),
            TtsBehavior::Fail => Err(Error::Tts("stub failure".to_string())),
        }
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// Pipeline with the default persona
pub fn pipeline(
    stt: Arc<dyn SpeechToText>,
    llm: Arc<dyn LanguageModel>,
    tts: Arc<dyn TextToSpeech>,
) -> Pipeline {
    Pipeline::new(stt, llm, tts, Persona::default())
}
