//! PCM buffers and the WAV container

use std::io::Cursor;

use crate::error::AudioConversionError;

/// Size of the canonical RIFF/WAVE header written by [`wrap_pcm_as_wav`]
pub const WAV_HEADER_LEN: usize = 44;

/// Sample rate the device records and plays at
pub const SAMPLE_RATE: u32 = 16000;

/// Shape of a PCM stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioProfile {
    /// Frames per second
    pub sample_rate: u32,
    /// Bytes per sample (1, 2 or 4)
    pub sample_width: u16,
    /// Interleaved channel count
    pub channels: u16,
}

impl AudioProfile {
    /// 16 kHz, 16-bit signed, mono: what the device records and plays
    pub const DEVICE: Self = Self {
        sample_rate: SAMPLE_RATE,
        sample_width: 2,
        channels: 1,
    };

    /// Check the width and channel invariants
    ///
    /// # Errors
    ///
    /// Returns error if the width is not 1, 2 or 4 bytes, or if the rate or
    /// channel count is zero
    pub fn validate(self) -> Result<Self, AudioConversionError> {
        if !matches!(self.sample_width, 1 | 2 | 4) {
            return Err(AudioConversionError::UnsupportedSampleWidth(
                self.sample_width,
            ));
        }
        if self.channels == 0 {
            return Err(AudioConversionError::InvalidProfile(
                "channel count must be at least 1".to_string(),
            ));
        }
        if self.sample_rate == 0 {
            return Err(AudioConversionError::InvalidProfile(
                "sample rate must be non-zero".to_string(),
            ));
        }
        Ok(self)
    }

    /// Bytes in one interleaved frame
    #[must_use]
    pub const fn frame_len(self) -> usize {
        self.sample_width as usize * self.channels as usize
    }

    /// Bytes per second of audio
    #[must_use]
    pub const fn byte_rate(self) -> u32 {
        self.sample_rate * self.frame_len() as u32
    }
}

/// Immutable PCM payload with its profile
///
/// Samples are little-endian; 8-bit audio is unsigned as in WAV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBuffer {
    data: Vec<u8>,
    profile: AudioProfile,
}

impl AudioBuffer {
    /// Create a buffer from raw PCM bytes
    ///
    /// # Errors
    ///
    /// Returns error if the profile is invalid or the payload is not a whole
    /// number of frames
    pub fn new(data: Vec<u8>, profile: AudioProfile) -> Result<Self, AudioConversionError> {
        let profile = profile.validate()?;
        let frame = profile.frame_len();
        if data.len() % frame != 0 {
            return Err(AudioConversionError::MisalignedPayload {
                len: data.len(),
                frame,
            });
        }
        Ok(Self { data, profile })
    }

    /// Wrap bytes received from the device (16 kHz, 16-bit, mono)
    ///
    /// # Errors
    ///
    /// Returns error if the payload has an odd length
    pub fn from_device(data: Vec<u8>) -> Result<Self, AudioConversionError> {
        Self::new(data, AudioProfile::DEVICE)
    }

    /// Build a 16-bit buffer from signed samples
    #[must_use]
    pub fn from_i16_samples(samples: &[i16], sample_rate: u32, channels: u16) -> Self {
        let data = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self {
            data,
            profile: AudioProfile {
                sample_rate,
                sample_width: 2,
                channels: channels.max(1),
            },
        }
    }

    /// Raw sample bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the buffer, returning the sample bytes
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    #[must_use]
    pub const fn profile(&self) -> AudioProfile {
        self.profile
    }

    /// Number of frames (samples per channel)
    #[must_use]
    pub const fn frames(&self) -> usize {
        self.data.len() / self.profile.frame_len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Playback length in milliseconds
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        (self.frames() as u64 * 1000) / u64::from(self.profile.sample_rate)
    }
}

/// Container a provider expects or returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    /// Headerless PCM
    RawPcm,
    /// RIFF/WAVE with PCM samples
    Wav,
    /// MPEG-1/2 Layer III
    Mp3,
}

impl ContainerFormat {
    /// MIME type used when uploading this container
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::RawPcm => "application/octet-stream",
            Self::Wav => "audio/wav",
            Self::Mp3 => "audio/mpeg",
        }
    }
}

/// Wrap a PCM buffer in a canonical 44-byte WAV header
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn wrap_pcm_as_wav(pcm: &AudioBuffer) -> Vec<u8> {
    let profile = pcm.profile();
    let data_len = pcm.as_bytes().len() as u32;
    let block_align = profile.frame_len() as u16;

    let mut out = Vec::with_capacity(WAV_HEADER_LEN + pcm.as_bytes().len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    // WAVE_FORMAT_PCM
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&profile.channels.to_le_bytes());
    out.extend_from_slice(&profile.sample_rate.to_le_bytes());
    out.extend_from_slice(&profile.byte_rate().to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&(profile.sample_width * 8).to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(pcm.as_bytes());
    out
}

/// Parse a WAV stream back into a PCM buffer
///
/// Accepts any integer PCM WAV hound can read, not just the canonical layout.
///
/// # Errors
///
/// Returns error if the stream is not a readable integer PCM WAV with 8, 16
/// or 32 bits per sample
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn unwrap_wav(wav: &[u8]) -> Result<AudioBuffer, AudioConversionError> {
    let mut reader = hound::WavReader::new(Cursor::new(wav))?;
    let spec = reader.spec();

    if spec.sample_format != hound::SampleFormat::Int {
        return Err(AudioConversionError::InvalidProfile(
            "floating point WAV is not supported".to_string(),
        ));
    }

    let profile = AudioProfile {
        sample_rate: spec.sample_rate,
        sample_width: spec.bits_per_sample / 8,
        channels: spec.channels,
    }
    .validate()?;

    let mut data = Vec::with_capacity(reader.len() as usize * usize::from(profile.sample_width));
    for sample in reader.samples::<i32>() {
        let sample = sample?;
        match profile.sample_width {
            // hound hands 8-bit samples back signed; WAV stores them offset
            1 => data.push((sample as i8 as u8) ^ 0x80),
            2 => data.extend_from_slice(&(sample as i16).to_le_bytes()),
            _ => data.extend_from_slice(&sample.to_le_bytes()),
        }
    }

    AudioBuffer::new(data, profile)
}

/// Package bare PCM bytes in the container a provider expects
///
/// # Errors
///
/// Returns error if the profile is invalid, the payload is misaligned, or the
/// target is a compressed container this relay cannot encode
pub fn encode_to_container(
    pcm: &[u8],
    profile: AudioProfile,
    target: ContainerFormat,
) -> Result<Vec<u8>, AudioConversionError> {
    let buffer = AudioBuffer::new(pcm.to_vec(), profile)?;
    match target {
        ContainerFormat::RawPcm => Ok(buffer.into_bytes()),
        ContainerFormat::Wav => Ok(wrap_pcm_as_wav(&buffer)),
        ContainerFormat::Mp3 => Err(AudioConversionError::Mp3(
            "MP3 encoding is not supported".to_string(),
        )),
    }
}

/// Drop the canonical WAV header, leaving the sample payload
///
/// # Errors
///
/// Returns error if the input is shorter than the header
pub fn strip_container_header(wav: &[u8]) -> Result<Vec<u8>, AudioConversionError> {
    if wav.len() < WAV_HEADER_LEN {
        return Err(AudioConversionError::Truncated {
            len: wav.len(),
            header: WAV_HEADER_LEN,
        });
    }
    Ok(wav[WAV_HEADER_LEN..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(profile: AudioProfile, frames: usize) -> AudioBuffer {
        let len = frames * profile.frame_len();
        #[allow(clippy::cast_possible_truncation)]
        let data = (0..len).map(|i| (i * 7 % 251) as u8).collect();
        AudioBuffer::new(data, profile).unwrap()
    }

    #[test]
    fn test_wav_header_is_canonical() {
        let buf = ramp(AudioProfile::DEVICE, 100);
        let wav = wrap_pcm_as_wav(&buf);

        assert_eq!(wav.len(), WAV_HEADER_LEN + 200);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]), 200);

        let reader = hound::WavReader::new(Cursor::new(&wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.spec().bits_per_sample, 16);
        assert_eq!(reader.spec().channels, 1);
    }

    #[test]
    fn test_round_trip_all_widths() {
        for (width, channels, rate) in [(1, 1, 8000), (2, 1, 16000), (2, 2, 44100), (4, 1, 48000), (4, 2, 22050)] {
            let profile = AudioProfile {
                sample_rate: rate,
                sample_width: width,
                channels,
            };
            let buf = ramp(profile, 64);
            let back = unwrap_wav(&wrap_pcm_as_wav(&buf)).unwrap();
            assert_eq!(back, buf, "width={width} channels={channels}");
        }
    }

    #[test]
    fn test_round_trip_empty_buffer() {
        let buf = AudioBuffer::from_device(Vec::new()).unwrap();
        let back = unwrap_wav(&wrap_pcm_as_wav(&buf)).unwrap();
        assert!(back.is_empty());
        assert_eq!(back.profile(), AudioProfile::DEVICE);
    }

    #[test]
    fn test_invalid_profiles_rejected() {
        let bad_width = AudioProfile {
            sample_width: 3,
            ..AudioProfile::DEVICE
        };
        assert!(matches!(
            AudioBuffer::new(vec![0; 6], bad_width),
            Err(AudioConversionError::UnsupportedSampleWidth(3))
        ));

        let no_channels = AudioProfile {
            channels: 0,
            ..AudioProfile::DEVICE
        };
        assert!(AudioBuffer::new(vec![0; 4], no_channels).is_err());
    }

    #[test]
    fn test_misaligned_payload_rejected() {
        let err = AudioBuffer::from_device(vec![0; 3]).unwrap_err();
        assert!(matches!(
            err,
            AudioConversionError::MisalignedPayload { len: 3, frame: 2 }
        ));
    }

    #[test]
    fn test_strip_header() {
        let buf = ramp(AudioProfile::DEVICE, 10);
        let stripped = strip_container_header(&wrap_pcm_as_wav(&buf)).unwrap();
        assert_eq!(stripped, buf.as_bytes());

        let header_only = strip_container_header(&[0u8; WAV_HEADER_LEN]).unwrap();
        assert!(header_only.is_empty());
    }

    #[test]
    fn test_strip_header_too_short() {
        let err = strip_container_header(&[0u8; 43]).unwrap_err();
        assert!(matches!(
            err,
            AudioConversionError::Truncated { len: 43, header: 44 }
        ));
    }

    #[test]
    fn test_encode_to_container() {
        let pcm = vec![1, 0, 2, 0];
        let wav = encode_to_container(&pcm, AudioProfile::DEVICE, ContainerFormat::Wav).unwrap();
        assert_eq!(&wav[WAV_HEADER_LEN..], &pcm[..]);

        let raw = encode_to_container(&pcm, AudioProfile::DEVICE, ContainerFormat::RawPcm).unwrap();
        assert_eq!(raw, pcm);

        assert!(encode_to_container(&pcm, AudioProfile::DEVICE, ContainerFormat::Mp3).is_err());
    }

    #[test]
    fn test_duration() {
        let one_second = AudioBuffer::from_device(vec![0; 32000]).unwrap();
        assert_eq!(one_second.frames(), 16000);
        assert_eq!(one_second.duration_ms(), 1000);
    }

    #[test]
    fn test_unwrap_garbage() {
        assert!(matches!(
            unwrap_wav(b"definitely not a wav file at all"),
            Err(AudioConversionError::Wav(_))
        ));
    }
}
