//! Decoding provider audio into device PCM
//!
//! Compressed TTS output is decoded, downmixed to mono, resampled to
//! [`SAMPLE_RATE`] and requantized to 16-bit signed samples.

use std::io::Cursor;

use rubato::{FftFixedIn, Resampler};

use super::codec::{AudioBuffer, AudioProfile, ContainerFormat, SAMPLE_RATE, unwrap_wav};
use crate::error::AudioConversionError;

/// Resampler input chunk size
const CHUNK_SIZE: usize = 1024;

/// Decoded mono samples in [-1.0, 1.0] at their native rate
struct MonoSamples {
    samples: Vec<f32>,
    sample_rate: u32,
}

/// Decode a provider container into 16 kHz, 16-bit, mono PCM
///
/// # Errors
///
/// Returns error if the container cannot be decoded, holds no audio, or
/// resampling fails
pub fn decode_to_target_pcm(
    data: &[u8],
    hint: ContainerFormat,
) -> Result<AudioBuffer, AudioConversionError> {
    let decoded = match hint {
        ContainerFormat::Mp3 => decode_mp3(data)?,
        ContainerFormat::Wav => wav_to_mono(&unwrap_wav(data)?),
        ContainerFormat::RawPcm => wav_to_mono(&AudioBuffer::from_device(data.to_vec())?),
    };

    let resampled = if decoded.sample_rate == SAMPLE_RATE {
        decoded.samples
    } else {
        resample(&decoded.samples, decoded.sample_rate, SAMPLE_RATE)?
    };

    // Too short to survive the rate change counts as no audio
    if resampled.is_empty() {
        return Err(AudioConversionError::Empty(stream_label(hint)));
    }

    tracing::debug!(
        source_rate = decoded.sample_rate,
        frames = resampled.len(),
        "decoded provider audio"
    );

    Ok(AudioBuffer::from_i16_samples(
        &requantize(&resampled),
        AudioProfile::DEVICE.sample_rate,
        AudioProfile::DEVICE.channels,
    ))
}

const fn stream_label(format: ContainerFormat) -> &'static str {
    match format {
        ContainerFormat::RawPcm => "PCM",
        ContainerFormat::Wav => "WAV",
        ContainerFormat::Mp3 => "MP3",
    }
}

/// Decode MP3 bytes to mono f32 samples
#[allow(clippy::cast_sign_loss)]
fn decode_mp3(mp3_data: &[u8]) -> Result<MonoSamples, AudioConversionError> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = None;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                let rate = frame.sample_rate as u32;
                match sample_rate {
                    None => sample_rate = Some(rate),
                    Some(r) if r != rate => {
                        return Err(AudioConversionError::Mp3(format!(
                            "sample rate changed mid-stream ({r} -> {rate})"
                        )));
                    }
                    Some(_) => {}
                }
                downmix_into(&mut samples, &frame.data, frame.channels.max(1), |s| {
                    f32::from(s) / 32768.0
                });
            }
            Err(minimp3::Error::Eof) => break,
            // ID3 tags and Xing headers decode to no samples
            Err(minimp3::Error::SkippedData) => {}
            Err(e) => return Err(AudioConversionError::Mp3(e.to_string())),
        }
    }

    match sample_rate {
        Some(sample_rate) if !samples.is_empty() => Ok(MonoSamples {
            samples,
            sample_rate,
        }),
        _ => Err(AudioConversionError::Empty("MP3")),
    }
}

/// Convert an arbitrary PCM buffer to mono f32 samples
#[allow(clippy::cast_precision_loss)]
fn wav_to_mono(buffer: &AudioBuffer) -> MonoSamples {
    let profile = buffer.profile();
    let channels = usize::from(profile.channels);
    let width = usize::from(profile.sample_width);

    let normalized: Vec<f32> = buffer
        .as_bytes()
        .chunks_exact(width)
        .map(|b| match width {
            1 => (f32::from(b[0]) - 128.0) / 128.0,
            2 => f32::from(i16::from_le_bytes([b[0], b[1]])) / 32768.0,
            _ => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32 / 2_147_483_648.0,
        })
        .collect();

    let mut samples = Vec::with_capacity(normalized.len() / channels);
    downmix_into(&mut samples, &normalized, channels, |s| s);

    MonoSamples {
        samples,
        sample_rate: profile.sample_rate,
    }
}

/// Average interleaved frames down to one channel
#[allow(clippy::cast_precision_loss)]
fn downmix_into<T: Copy>(out: &mut Vec<f32>, data: &[T], channels: usize, to_f32: impl Fn(T) -> f32) {
    if channels == 1 {
        out.extend(data.iter().map(|&s| to_f32(s)));
        return;
    }
    out.extend(
        data.chunks(channels)
            .map(|frame| frame.iter().map(|&s| to_f32(s)).sum::<f32>() / frame.len() as f32),
    );
}

/// Number of output frames for a rate change, rounded to nearest
const fn target_len(input_len: usize, from_rate: u32, to_rate: u32) -> usize {
    let from = from_rate as usize;
    (input_len * to_rate as usize + from / 2) / from
}

/// Resample mono audio using rubato
///
/// The input is zero-padded to whole chunks and the resampler delay is
/// trimmed, so the output always holds exactly `target_len` frames.
#[allow(clippy::cast_possible_truncation)]
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, AudioConversionError> {
    let expected = target_len(samples.len(), from_rate, to_rate);
    if expected == 0 {
        return Ok(Vec::new());
    }

    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, CHUNK_SIZE, 2, 1)
            .map_err(|e| AudioConversionError::Resample(format!("init failed: {e}")))?;

    let delay = resampler.output_delay();
    let input: Vec<f64> = samples.iter().map(|&s| f64::from(s)).collect();
    let mut output: Vec<f64> = Vec::with_capacity(expected + delay + CHUNK_SIZE);
    let mut position = 0;

    while output.len() < expected + delay {
        let needed = resampler.input_frames_next();
        let mut chunk = vec![0.0; needed];
        if position < input.len() {
            let end = (position + needed).min(input.len());
            chunk[..end - position].copy_from_slice(&input[position..end]);
        }
        position += needed;

        let produced = resampler
            .process(&[chunk], None)
            .map_err(|e| AudioConversionError::Resample(e.to_string()))?;
        let Some(channel) = produced.into_iter().next().filter(|c| !c.is_empty()) else {
            return Err(AudioConversionError::Resample(
                "resampler produced no output".to_string(),
            ));
        };
        output.extend(channel);
    }

    Ok(output
        .into_iter()
        .skip(delay)
        .take(expected)
        .map(|s| s as f32)
        .collect())
}

/// Convert f32 [-1.0, 1.0] samples to i16
///
/// Uses the same 32768 scale as decoding so native-rate audio is unchanged.
#[allow(clippy::cast_possible_truncation)]
fn requantize(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s * 32768.0).round().clamp(-32768.0, 32767.0) as i16)
        .collect()
}
