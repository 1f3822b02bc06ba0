// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Decoding of click assets into interleaved 16-bit PCM.
//!
//! The container is chosen by file extension. Linear PCM WAV files are parsed
//! directly, while the compressed containers go through symphonia and are
//! quantized from float.

use std::fmt;
use std::path::Path;
use std::time::Duration;

mod compressed;
mod error;
mod pcm;

pub use error::DecodeError;

/// File extensions the codec layer can decode, lower case.
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["wav", "mp3", "ogg"];

/// The containers understood by the codec layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Container {
    /// RIFF/WAVE linear PCM.
    Wav,
    /// MPEG layer 3, a short-frame compressed stream.
    Mp3,
    /// Ogg bitstream (Vorbis).
    Ogg,
}

impl Container {
    /// Picks the container from the path's extension, ignoring case.
    pub fn from_path(path: &Path) -> Result<Container, DecodeError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some("wav") => Ok(Container::Wav),
            Some("mp3") => Ok(Container::Mp3),
            Some("ogg") => Ok(Container::Ogg),
            _ => Err(DecodeError::UnsupportedContainer(path.to_path_buf())),
        }
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Container::Wav => "wav",
            Container::Mp3 => "mp3",
            Container::Ogg => "ogg",
        };
        write!(f, "{}", name)
    }
}

/// Returns true if the path has an extension the codec layer can decode.
pub fn is_supported(path: &Path) -> bool {
    Container::from_path(path).is_ok()
}

/// A decoded asset. The samples are interleaved 16-bit PCM and may be dropped
/// once the output owns its own copy, leaving only the metadata behind.
pub struct DecodedBuffer {
    samples: Option<Vec<i16>>,
    sample_count: usize,
    sample_rate: u32,
    channels: u16,
}

impl DecodedBuffer {
    /// Creates a new decoded buffer.
    pub fn new(samples: Vec<i16>, sample_rate: u32, channels: u16) -> DecodedBuffer {
        DecodedBuffer {
            sample_count: samples.len(),
            samples: Some(samples),
            sample_rate,
            channels,
        }
    }

    /// The interleaved samples. Empty once the samples have been discarded.
    pub fn samples(&self) -> &[i16] {
        self.samples.as_deref().unwrap_or(&[])
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// The number of interleaved samples decoded, kept after discarding.
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Whether the sample data is still held in memory.
    pub fn is_resident(&self) -> bool {
        self.samples.is_some()
    }

    /// Drops the sample data. Called after the output has taken its own copy.
    pub fn discard_samples(&mut self) {
        self.samples = None;
    }

    /// The playback length of the buffer.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 || self.channels == 0 {
            return Duration::ZERO;
        }
        let frames = self.sample_count / self.channels as usize;
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }
}

impl fmt::Debug for DecodedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedBuffer")
            .field("sample_count", &self.sample_count)
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("resident", &self.is_resident())
            .finish()
    }
}

/// A full-length float decode. Only used to slice sprite sources, and dropped
/// as soon as the slices have been quantized.
#[derive(Debug)]
pub struct RawAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Decodes the given file into 16-bit PCM.
pub fn decode(path: &Path) -> Result<DecodedBuffer, DecodeError> {
    let (samples, sample_rate, channels) = match Container::from_path(path)? {
        Container::Wav => pcm::read(path)?,
        Container::Mp3 | Container::Ogg => {
            let raw = compressed::read(path)?;
            let samples = raw.samples.iter().map(|sample| quantize(*sample)).collect();
            (samples, raw.sample_rate, raw.channels)
        }
    };
    check_channels(channels)?;

    Ok(DecodedBuffer::new(samples, sample_rate, channels))
}

/// Decodes the given file into float samples in [-1, 1].
pub fn decode_raw(path: &Path) -> Result<RawAudio, DecodeError> {
    let raw = match Container::from_path(path)? {
        Container::Wav => {
            let (samples, sample_rate, channels) = pcm::read(path)?;
            RawAudio {
                samples: samples
                    .into_iter()
                    .map(|sample| sample as f32 / 32768.0)
                    .collect(),
                sample_rate,
                channels,
            }
        }
        Container::Mp3 | Container::Ogg => compressed::read(path)?,
    };
    check_channels(raw.channels)?;

    Ok(raw)
}

/// Quantizes a float sample to 16 bits. No dither and no explicit clamp: the
/// float to integer cast saturates, which is the only bound applied.
#[inline]
pub fn quantize(sample: f32) -> i16 {
    (sample * i16::MAX as f32) as i16
}

/// Quantizes a float sample after clamping it to [-1, 1].
#[inline]
pub fn quantize_clamped(sample: f32) -> i16 {
    quantize(sample.clamp(-1.0, 1.0))
}

fn check_channels(channels: u16) -> Result<(), DecodeError> {
    match channels {
        1 | 2 => Ok(()),
        other => Err(DecodeError::UnsupportedChannels(other)),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::testutil::{write_wav_f32, write_wav_i16, write_wav_u8};

    #[test]
    fn test_container_from_extension() {
        assert_eq!(
            Container::from_path(Path::new("a/b/click.WAV")).unwrap(),
            Container::Wav
        );
        assert_eq!(
            Container::from_path(Path::new("click.Mp3")).unwrap(),
            Container::Mp3
        );
        assert_eq!(
            Container::from_path(Path::new("click.ogg")).unwrap(),
            Container::Ogg
        );
        assert!(matches!(
            Container::from_path(Path::new("click.flac")),
            Err(DecodeError::UnsupportedContainer(_))
        ));
        assert!(!is_supported(Path::new("click")));
    }

    #[test]
    fn test_decode_16_bit_sample_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("click.wav");
        let samples: Vec<i16> = (0..1000).map(|i| (i * 7) as i16).collect();
        write_wav_i16(&path, &samples, 22050, 2).unwrap();

        // 2000 bytes of data make 1000 samples.
        let decoded = decode(&path).unwrap();
        assert_eq!(decoded.sample_count(), 1000);
        assert_eq!(decoded.samples(), samples.as_slice());
        assert_eq!(decoded.sample_rate(), 22050);
        assert_eq!(decoded.channels(), 2);
    }

    #[test]
    fn test_decode_8_bit_rescale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("click.wav");
        let bytes: Vec<u8> = (0..=255).collect();
        write_wav_u8(&path, &bytes, 8000).unwrap();

        let decoded = decode(&path).unwrap();
        assert_eq!(decoded.samples().len(), 256);
        for (b, sample) in bytes.iter().zip(decoded.samples()) {
            assert_eq!(i32::from(*sample), (i32::from(*b) - 128) * 256, "byte {b}");
        }
        assert_eq!(decoded.samples()[0], i16::MIN);
        assert_eq!(decoded.samples()[255], 32512);
    }

    #[test]
    fn test_decode_rejects_float_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("click.wav");
        write_wav_f32(&path, &[0.0, 0.5], 44100, 1).unwrap();

        assert!(matches!(decode(&path), Err(DecodeError::UnsupportedFormat)));
    }

    #[test]
    fn test_decode_missing_file() {
        let path = PathBuf::from("/nonexistent/keyclack/click.wav");
        assert!(matches!(decode(&path), Err(DecodeError::Io { .. })));
    }

    #[test]
    fn test_discard_samples_keeps_metadata() {
        let mut buffer = DecodedBuffer::new(vec![1; 4410], 44100, 1);
        assert!(buffer.is_resident());
        buffer.discard_samples();
        assert!(!buffer.is_resident());
        assert!(buffer.samples().is_empty());
        assert_eq!(buffer.sample_count(), 4410);
        assert_eq!(buffer.duration(), Duration::from_millis(100));
    }

    #[test]
    fn test_decode_raw_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sprite.wav");
        write_wav_i16(&path, &[0, 16384, -32768], 44100, 1).unwrap();

        let raw = decode_raw(&path).unwrap();
        assert_eq!(raw.samples, vec![0.0, 0.5, -1.0]);
        assert_eq!(raw.sample_rate, 44100);
        assert_eq!(raw.channels, 1);
    }

    #[test]
    fn test_quantize() {
        assert_eq!(quantize(1.0), i16::MAX);
        assert_eq!(quantize(0.0), 0);
        assert_eq!(quantize(-1.0), -i16::MAX);
        assert_eq!(quantize(2.0), i16::MAX);
        assert_eq!(quantize_clamped(1.5), i16::MAX);
        assert_eq!(quantize_clamped(-1.5), -i16::MAX);
        assert_eq!(quantize_clamped(0.5), 16383);
    }
}
