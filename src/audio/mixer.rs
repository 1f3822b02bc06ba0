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
// Voice mixing shared by the cpal output and its tests.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use super::{BufferId, OutputError};
use crate::codec::DecodedBuffer;

/// A voice slot. Holds its own reference to the samples so releasing a buffer
/// never pulls data out from under a playing voice.
#[derive(Default)]
struct VoiceSlot {
    samples: Option<Arc<[f32]>>,
    position: usize,
    gain: f32,
}

struct MixerState {
    /// Uploaded buffers, already converted to the output's rate and layout.
    buffers: HashMap<BufferId, Arc<[f32]>>,
    voices: Vec<VoiceSlot>,
}

/// Sums a fixed set of voices into the output's interleaved float format.
#[derive(Clone)]
pub struct VoiceMixer {
    state: Arc<Mutex<MixerState>>,
    next_id: Arc<AtomicU64>,
    num_channels: u16,
    sample_rate: u32,
}

impl VoiceMixer {
    /// Creates a new mixer for the given output format.
    pub fn new(voices: usize, num_channels: u16, sample_rate: u32) -> VoiceMixer {
        VoiceMixer {
            state: Arc::new(Mutex::new(MixerState {
                buffers: HashMap::new(),
                voices: (0..voices).map(|_| VoiceSlot::default()).collect(),
            })),
            next_id: Arc::new(AtomicU64::new(1)),
            num_channels,
            sample_rate,
        }
    }

    /// Converts the buffer to the output format and stores it.
    pub fn add_buffer(&self, buffer: &DecodedBuffer) -> Result<BufferId, OutputError> {
        if buffer.samples().is_empty() || buffer.channels() == 0 || buffer.sample_rate() == 0 {
            return Err(OutputError::EmptyBuffer {
                channels: buffer.channels(),
                sample_rate: buffer.sample_rate(),
            });
        }

        let source: Vec<f32> = buffer
            .samples()
            .iter()
            .map(|sample| *sample as f32 / 32768.0)
            .collect();
        let source_channels = buffer.channels() as usize;
        let source = if buffer.sample_rate() != self.sample_rate {
            resample(
                &source,
                source_channels,
                buffer.sample_rate(),
                self.sample_rate,
            )?
        } else {
            source
        };
        let converted = map_channels(&source, source_channels, self.num_channels as usize);

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.state.lock().buffers.insert(id, converted.into());
        Ok(id)
    }

    /// Forgets the buffer. Voices still playing it run to the end.
    pub fn remove_buffer(&self, id: BufferId) {
        self.state.lock().buffers.remove(&id);
    }

    /// Starts the buffer on the voice. Unknown voices or buffers are ignored.
    pub fn start(&self, voice: usize, id: BufferId, gain: f32) {
        let mut state = self.state.lock();
        let Some(samples) = state.buffers.get(&id).cloned() else {
            return;
        };
        if let Some(slot) = state.voices.get_mut(voice) {
            slot.samples = Some(samples);
            slot.position = 0;
            slot.gain = gain;
        }
    }

    pub fn stop(&self, voice: usize) {
        if let Some(slot) = self.state.lock().voices.get_mut(voice) {
            slot.samples = None;
            slot.position = 0;
        }
    }

    pub fn is_active(&self, voice: usize) -> bool {
        self.state
            .lock()
            .voices
            .get(voice)
            .is_some_and(|slot| slot.samples.is_some())
    }

    pub fn voice_count(&self) -> usize {
        self.state.lock().voices.len()
    }

    /// Mixes the active voices into the interleaved output block, overwriting it.
    /// Voices that reach the end of their buffer go idle.
    pub fn process_into_output(&self, output: &mut [f32]) {
        output.fill(0.0);

        let mut state = self.state.lock();
        for slot in state.voices.iter_mut() {
            let Some(samples) = slot.samples.as_ref() else {
                continue;
            };

            let remaining = &samples[slot.position..];
            let count = remaining.len().min(output.len());
            for (out, sample) in output.iter_mut().zip(&remaining[..count]) {
                *out += sample * slot.gain;
            }

            slot.position += count;
            if slot.position >= samples.len() {
                slot.samples = None;
                slot.position = 0;
            }
        }
    }

    pub fn num_channels(&self) -> u16 {
        self.num_channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Input block size for the sinc resampler.
const RESAMPLE_CHUNK: usize = 1024;

/// Converts interleaved samples between sample rates. The whole buffer is run
/// through a sinc resampler, the filter delay is trimmed from the front and
/// the result is cut to the expected frame count.
fn resample(
    samples: &[f32],
    channels: usize,
    source_rate: u32,
    target_rate: u32,
) -> Result<Vec<f32>, OutputError> {
    let resample_error = |reason: String| OutputError::Resample {
        source_rate,
        target_rate,
        reason,
    };

    let ratio = target_rate as f64 / source_rate as f64;
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        oversampling_factor: 128,
        interpolation: SincInterpolationType::Linear,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, RESAMPLE_CHUNK, channels)
        .map_err(|e| resample_error(e.to_string()))?;

    // rubato works on planar channels.
    let planar: Vec<Vec<f32>> = (0..channels)
        .map(|channel| {
            samples
                .iter()
                .skip(channel)
                .step_by(channels)
                .copied()
                .collect()
        })
        .collect();
    let frames = planar.first().map_or(0, Vec::len);
    let expected = (frames as f64 * ratio).ceil() as usize;
    let delay = resampler.output_delay();

    let mut scratch = resampler.output_buffer_allocate(true);
    let mut resampled: Vec<Vec<f32>> = vec![Vec::with_capacity(expected + delay); channels];
    let mut position = 0;
    while resampled[0].len() < expected + delay {
        let needed = resampler.input_frames_next();
        let produced = if position + needed <= frames {
            let chunk: Vec<&[f32]> = planar
                .iter()
                .map(|channel| &channel[position..position + needed])
                .collect();
            let (consumed, produced) = resampler
                .process_into_buffer(chunk.as_slice(), scratch.as_mut_slice(), None)
                .map_err(|e| resample_error(e.to_string()))?;
            position += consumed;
            produced
        } else if position < frames {
            let chunk: Vec<&[f32]> = planar.iter().map(|channel| &channel[position..]).collect();
            let (_, produced) = resampler
                .process_partial_into_buffer(
                    Some(chunk.as_slice()),
                    scratch.as_mut_slice(),
                    None,
                )
                .map_err(|e| resample_error(e.to_string()))?;
            position = frames;
            produced
        } else {
            // Flush the filter tail with silence.
            let (_, produced) = resampler
                .process_partial_into_buffer(None::<&[Vec<f32>]>, scratch.as_mut_slice(), None)
                .map_err(|e| resample_error(e.to_string()))?;
            produced
        };

        for (out, chunk) in resampled.iter_mut().zip(&scratch) {
            out.extend_from_slice(&chunk[..produced]);
        }
    }

    let mut output = Vec::with_capacity(expected * channels);
    for frame in delay..delay + expected {
        for channel in &resampled {
            output.push(channel[frame]);
        }
    }
    Ok(output)
}

/// Maps mono or stereo frames onto the output's channel layout. Mono is copied
/// to every output channel, stereo fills the first two channels and is folded
/// down when the output is mono.
fn map_channels(samples: &[f32], source_channels: usize, output_channels: usize) -> Vec<f32> {
    if source_channels == output_channels {
        return samples.to_vec();
    }

    let frames = samples.len() / source_channels;
    let mut output = vec![0.0f32; frames * output_channels];
    for (frame, out) in samples
        .chunks_exact(source_channels)
        .zip(output.chunks_exact_mut(output_channels))
    {
        match (source_channels, output_channels) {
            (1, _) => out.fill(frame[0]),
            (_, 1) => out[0] = frame.iter().sum::<f32>() / source_channels as f32,
            _ => {
                let n = source_channels.min(output_channels);
                out[..n].copy_from_slice(&frame[..n]);
            }
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mix_two_voices() {
        let mixer = VoiceMixer::new(4, 1, 44100);
        let a = mixer
            .add_buffer(&DecodedBuffer::new(vec![16384, 16384], 44100, 1))
            .unwrap();
        let b = mixer
            .add_buffer(&DecodedBuffer::new(vec![8192, 8192, 8192], 44100, 1))
            .unwrap();

        mixer.start(0, a, 1.0);
        mixer.start(3, b, 0.5);
        assert!(mixer.is_active(0));
        assert!(mixer.is_active(3));

        let mut block = vec![1.0f32; 4];
        mixer.process_into_output(&mut block);
        assert_eq!(block, vec![0.625, 0.625, 0.125, 0.0]);

        // Both voices ran out during the block.
        assert!(!mixer.is_active(0));
        assert!(!mixer.is_active(3));
    }

    #[test]
    fn test_voice_spans_blocks() {
        let mixer = VoiceMixer::new(1, 1, 44100);
        let id = mixer
            .add_buffer(&DecodedBuffer::new(vec![16384; 6], 44100, 1))
            .unwrap();
        mixer.start(0, id, 1.0);

        let mut block = vec![0.0f32; 4];
        mixer.process_into_output(&mut block);
        assert!(mixer.is_active(0));
        mixer.process_into_output(&mut block);
        assert_eq!(block, vec![0.5, 0.5, 0.0, 0.0]);
        assert!(!mixer.is_active(0));
    }

    #[test]
    fn test_stop_and_unknown_buffer() {
        let mixer = VoiceMixer::new(2, 2, 48000);
        mixer.start(0, 42, 1.0);
        assert!(!mixer.is_active(0));

        let id = mixer
            .add_buffer(&DecodedBuffer::new(vec![1, 2, 3, 4], 48000, 2))
            .unwrap();
        mixer.start(1, id, 1.0);
        mixer.stop(1);
        assert!(!mixer.is_active(1));

        // Out of range voices are ignored.
        mixer.start(7, id, 1.0);
        mixer.stop(7);
        assert!(!mixer.is_active(7));
    }

    #[test]
    fn test_released_buffer_keeps_playing() {
        let mixer = VoiceMixer::new(1, 1, 44100);
        let id = mixer
            .add_buffer(&DecodedBuffer::new(vec![16384; 8], 44100, 1))
            .unwrap();
        mixer.start(0, id, 1.0);
        mixer.remove_buffer(id);

        let mut block = vec![0.0f32; 2];
        mixer.process_into_output(&mut block);
        assert_eq!(block, vec![0.5, 0.5]);

        // New plays of the released buffer are ignored.
        mixer.stop(0);
        mixer.start(0, id, 1.0);
        assert!(!mixer.is_active(0));
    }

    #[test]
    fn test_empty_buffer_rejected() {
        let mixer = VoiceMixer::new(1, 2, 44100);
        let mut buffer = DecodedBuffer::new(vec![1, 2], 44100, 2);
        buffer.discard_samples();
        assert!(matches!(
            mixer.add_buffer(&buffer),
            Err(OutputError::EmptyBuffer { .. })
        ));
    }

    #[test]
    fn test_channel_mapping() {
        assert_eq!(map_channels(&[0.5, 0.25], 1, 2), vec![0.5, 0.5, 0.25, 0.25]);
        assert_eq!(map_channels(&[0.5, 0.25], 2, 1), vec![0.375]);
        assert_eq!(
            map_channels(&[0.5, 0.25], 2, 4),
            vec![0.5, 0.25, 0.0, 0.0]
        );
    }

    #[test]
    fn test_resample_length() {
        let source: Vec<f32> = (0..4410)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44100.0).sin())
            .collect();
        let result = resample(&source, 1, 44100, 48000).unwrap();
        assert_eq!(result.len(), 4800);
    }

    #[test]
    fn test_resample_keeps_level() {
        // A 440 Hz tone keeps its level through the filter, away from the edges.
        let source: Vec<f32> = (0..4410)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44100.0).sin())
            .collect();
        let result = resample(&source, 1, 44100, 48000).unwrap();

        let middle = &result[800..4000];
        let rms = (middle.iter().map(|s| s * s).sum::<f32>() / middle.len() as f32).sqrt();
        assert!((rms - 0.5 / 2.0_f32.sqrt()).abs() < 0.01, "rms {rms}");
        assert!(middle.iter().all(|s| s.abs() < 0.52));
    }

    #[test]
    fn test_resample_stereo_keeps_channels() {
        let source: Vec<f32> = (0..2048).flat_map(|_| [0.5f32, -0.25]).collect();
        let result = resample(&source, 2, 48000, 44100).unwrap();
        assert_eq!(result.len(), 2 * (2048.0_f64 * 44100.0 / 48000.0).ceil() as usize);

        let middle = result.len() / 2 & !1;
        assert!((result[middle] - 0.5).abs() < 0.01);
        assert!((result[middle + 1] + 0.25).abs() < 0.01);
    }

    #[test]
    fn test_add_buffer_converts_rate() {
        let mixer = VoiceMixer::new(1, 2, 48000);
        let id = mixer
            .add_buffer(&DecodedBuffer::new(vec![8192; 441], 44100, 1))
            .unwrap();
        mixer.start(0, id, 1.0);

        // 441 frames at 44.1 kHz become 480 stereo frames at 48 kHz.
        let mut block = vec![0.0f32; 960];
        mixer.process_into_output(&mut block);
        assert!(!mixer.is_active(0));
        assert!((block[480] - 0.25).abs() < 0.01);
        assert_eq!(block[480], block[481]);
    }
}
