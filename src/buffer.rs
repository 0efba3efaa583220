//! Decoded audio buffers and the decode primitive.
//!
//! An [`AudioBuffer`] holds planar f32 channels at their native sample rate.
//! The engine reads buffers with linear interpolation when their rate
//! differs from the processing context, the same way a WebAudio
//! `AudioBufferSourceNode` resamples on playback.

use std::f64::consts::PI;

use crate::config::FALLBACK_ASSET_ID;
use crate::error::{EngineError, Result};

/// A fully decoded, in-memory audio buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: f64,
}

impl AudioBuffer {
    /// Build a buffer from planar channels. Channels are truncated to the
    /// shortest one so every channel has the same frame count.
    pub fn new(mut channels: Vec<Vec<f32>>, sample_rate: f64) -> Result<Self> {
        if channels.is_empty() {
            return Err(EngineError::Decode("buffer has no channels".into()));
        }
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(EngineError::Decode(format!(
                "invalid sample rate {sample_rate}"
            )));
        }
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        for ch in &mut channels {
            ch.truncate(frames);
        }
        Ok(AudioBuffer {
            channels,
            sample_rate,
        })
    }

    /// Mono buffer from a single channel of samples.
    pub fn mono(samples: Vec<f32>, sample_rate: f64) -> Result<Self> {
        Self::new(vec![samples], sample_rate)
    }

    /// Create from interleaved samples.
    pub fn from_interleaved(samples: &[f32], channels: usize, sample_rate: f64) -> Result<Self> {
        if channels == 0 {
            return Err(EngineError::Decode("zero channels".into()));
        }
        let mut planar = vec![Vec::with_capacity(samples.len() / channels); channels];
        for frame in samples.chunks_exact(channels) {
            for (ch, &s) in planar.iter_mut().zip(frame) {
                ch.push(s);
            }
        }
        Self::new(planar, sample_rate)
    }

    /// Synthetic sine tone, used as the stand-in for the bundled demo asset.
    pub fn sine(frequency: f64, seconds: f64, sample_rate: f64) -> Self {
        let frames = (seconds.max(0.0) * sample_rate) as usize;
        let samples = (0..frames)
            .map(|i| (0.5 * (2.0 * PI * frequency * i as f64 / sample_rate).sin()) as f32)
            .collect::<Vec<_>>();
        AudioBuffer {
            channels: vec![samples.clone(), samples],
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Frames per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate
    }

    /// Average of all channels at one frame.
    pub fn mono_frame(&self, index: usize) -> f32 {
        let sum: f32 = self
            .channels
            .iter()
            .map(|ch| ch.get(index).copied().unwrap_or(0.0))
            .sum();
        sum / self.channels.len() as f32
    }

    /// Read a stereo frame with linear interpolation at a fractional
    /// position. Mono buffers feed both sides; extra channels are ignored.
    pub fn read_stereo(&self, position: f64) -> (f32, f32) {
        let left = read_interpolated(&self.channels[0], position);
        let right = match self.channels.get(1) {
            Some(ch) => read_interpolated(ch, position),
            None => left,
        };
        (left, right)
    }
}

/// Read a sample with linear interpolation at a fractional position.
fn read_interpolated(data: &[f32], position: f64) -> f32 {
    if data.is_empty() || position < 0.0 {
        return 0.0;
    }

    let idx = position as usize;
    if idx >= data.len() - 1 {
        return if idx < data.len() { data[idx] } else { 0.0 };
    }

    let frac = (position - idx as f64) as f32;
    data[idx] * (1.0 - frac) + data[idx + 1] * frac
}

/// Decode an encoded payload into a buffer.
///
/// WAV (PCM integer or IEEE float) is decoded in-crate; other encodings are
/// the host's job and should arrive as an [`AudioBuffer`] directly.
#[cfg(feature = "wav")]
pub fn decode_audio(bytes: &[u8]) -> Result<AudioBuffer> {
    use hound::{SampleFormat, WavReader};

    let reader = WavReader::new(std::io::Cursor::new(bytes))
        .map_err(|e| EngineError::Decode(e.to_string()))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| EngineError::Decode(e.to_string()))?,
        SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| EngineError::Decode(e.to_string()))?
        }
    };
    log::debug!(
        "decoded WAV: {} Hz, {} ch, {} samples",
        spec.sample_rate,
        channels,
        samples.len()
    );
    AudioBuffer::from_interleaved(&samples, channels, spec.sample_rate as f64)
}

#[cfg(not(feature = "wav"))]
pub fn decode_audio(_bytes: &[u8]) -> Result<AudioBuffer> {
    Err(EngineError::Decode(
        "no in-crate decoder; enable the `wav` feature or decode on the host".into(),
    ))
}

/// Decode a payload, substituting a synthetic tone only for the bundled
/// fallback asset. Every other failure is surfaced.
pub fn decode_with_fallback(
    bytes: &[u8],
    asset_id: Option<&str>,
    sample_rate: f64,
) -> Result<AudioBuffer> {
    match decode_audio(bytes) {
        Ok(buffer) => Ok(buffer),
        Err(err) if asset_id == Some(FALLBACK_ASSET_ID) => {
            log::warn!("fallback asset failed to decode ({err}); substituting a sine tone");
            Ok(AudioBuffer::sine(440.0, 5.0, sample_rate))
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_truncated_to_shortest() {
        let buf = AudioBuffer::new(vec![vec![0.0; 10], vec![0.0; 7]], 100.0).unwrap();
        assert_eq!(buf.frames(), 7);
        assert!((buf.duration() - 0.07).abs() < 1e-9);
    }

    #[test]
    fn rejects_empty_and_bad_rate() {
        assert!(AudioBuffer::new(vec![], 44100.0).is_err());
        assert!(AudioBuffer::mono(vec![0.0], 0.0).is_err());
    }

    #[test]
    fn interleaved_split() {
        let buf = AudioBuffer::from_interleaved(&[1.0, -1.0, 0.5, -0.5], 2, 8000.0).unwrap();
        assert_eq!(buf.channel(0).unwrap(), &[1.0, 0.5]);
        assert_eq!(buf.channel(1).unwrap(), &[-1.0, -0.5]);
        assert_eq!(buf.mono_frame(0), 0.0);
    }

    #[test]
    fn interpolated_read() {
        let buf = AudioBuffer::mono(vec![0.0, 1.0, 0.0], 100.0).unwrap();
        let (l, r) = buf.read_stereo(0.5);
        assert!((l - 0.5).abs() < 1e-6);
        assert_eq!(l, r);
        assert_eq!(buf.read_stereo(10.0), (0.0, 0.0));
    }

    #[test]
    fn sine_has_expected_length_and_level() {
        let buf = AudioBuffer::sine(440.0, 1.0, 8000.0);
        assert_eq!(buf.frames(), 8000);
        assert_eq!(buf.channel_count(), 2);
        let peak = buf.channel(0).unwrap().iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.45 && peak <= 0.5, "peak {peak}");
    }

    #[cfg(feature = "wav")]
    #[test]
    fn decodes_wav_bytes() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..100 {
                writer.write_sample((i * 100) as i16).unwrap();
                writer.write_sample(-(i * 100) as i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        let buf = decode_audio(cursor.get_ref()).expect("decodes");
        assert_eq!(buf.sample_rate(), 22050.0);
        assert_eq!(buf.channel_count(), 2);
        assert_eq!(buf.frames(), 100);
        assert!((buf.channel(0).unwrap()[1] - 100.0 / 32768.0).abs() < 1e-6);
    }

    #[test]
    fn garbage_fails_to_decode() {
        let err = decode_audio(b"definitely not audio").unwrap_err();
        assert!(matches!(err, EngineError::Decode(_)));
    }

    #[test]
    fn fallback_only_for_bundled_asset() {
        let ok = decode_with_fallback(b"junk", Some(FALLBACK_ASSET_ID), 8000.0).unwrap();
        assert!(!ok.is_empty());
        assert!(decode_with_fallback(b"junk", Some("user-upload.mp3"), 8000.0).is_err());
        assert!(decode_with_fallback(b"junk", None, 8000.0).is_err());
    }
}
