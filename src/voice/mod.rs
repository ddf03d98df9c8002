//! Voice processing module
//!
//! Audio containers and transcoding, plus the speech providers on either
//! side of the language model.

mod codec;
mod decode;
pub mod stt;
pub mod tts;

pub use codec::{
    AudioBuffer, AudioProfile, ContainerFormat, SAMPLE_RATE, WAV_HEADER_LEN, encode_to_container,
    strip_container_header, unwrap_wav, wrap_pcm_as_wav,
};
pub use decode::decode_to_target_pcm;
pub use stt::{SpeechToText, TranscriptSource, TranscriptionResult};
pub use tts::{SynthesizedAudio, TextToSpeech};
