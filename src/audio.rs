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
use std::{any::Any, fmt, sync::Arc};

#[cfg(test)]
use std::error::Error;

use crate::codec::DecodedBuffer;
use crate::config;

pub mod cpal;
pub mod mixer;
pub mod mock;
pub mod thread_priority;

/// Identifies a buffer owned by an output.
pub type BufferId = u64;

/// Errors raised by audio outputs. Only opening an output is fatal; playback
/// itself never fails.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("No output device found with name {0}")]
    DeviceNotFound(String),

    #[error("No default output device available")]
    NoDefaultDevice,

    #[error("Unable to list output devices: {0}")]
    Devices(#[from] ::cpal::DevicesError),

    #[error("Unable to query the device's output config: {0}")]
    DefaultConfig(#[from] ::cpal::DefaultStreamConfigError),

    #[error("Unable to build output stream: {0}")]
    BuildStream(#[from] ::cpal::BuildStreamError),

    #[error("Unable to start output stream: {0}")]
    PlayStream(#[from] ::cpal::PlayStreamError),

    #[error("Unsupported output sample format {0}")]
    UnsupportedSampleFormat(String),

    #[error("Output thread exited before the stream started")]
    ThreadExited,

    #[error("Buffer has no sample data (channels={channels}, sample_rate={sample_rate})")]
    EmptyBuffer { channels: u16, sample_rate: u32 },

    #[error("Unable to resample from {source_rate} Hz to {target_rate} Hz: {reason}")]
    Resample {
        source_rate: u32,
        target_rate: u32,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A platform audio output with a fixed number of voices. Each voice plays one
/// buffer at a time; buffers are uploaded once and referenced by id.
pub trait Output: Any + fmt::Display + Send + Sync {
    /// The number of voices the output was opened with.
    fn voice_count(&self) -> usize;

    /// Copies the buffer into the output. The caller may drop its samples afterwards.
    fn upload(&self, buffer: &DecodedBuffer) -> Result<BufferId, OutputError>;

    /// Releases a previously uploaded buffer.
    fn release(&self, buffer: BufferId);

    /// Whether the voice is currently producing sound. Always live, never cached.
    fn is_playing(&self, voice: usize) -> bool;

    /// Attaches the buffer to the voice at the given gain and starts it from
    /// the beginning, cutting off whatever the voice was playing.
    fn play(&self, voice: usize, buffer: BufferId, gain: f32);

    /// Stops the voice and detaches its buffer.
    fn stop(&self, voice: usize);

    /// Whether voices must be detached before their buffers can be released.
    fn requires_detach(&self) -> bool {
        true
    }

    /// Shuts the output down. Further calls are ignored.
    fn close(&self);

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<mock::Output>, Box<dyn Error>>;
}

/// Lists the output device names known to cpal.
pub fn list_devices() -> Result<Vec<String>, OutputError> {
    cpal::Output::list()
}

/// Opens the output named in the configuration. Device names starting with
/// "mock" open the in-process mock output.
pub fn open_output(config: &config::Audio) -> Result<Arc<dyn Output>, OutputError> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Output::get(device, config.voices())));
    }

    Ok(Arc::new(cpal::Output::open(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_mock_output() {
        let output = open_output(&config::Audio::new("mock-device")).unwrap();
        assert_eq!(output.voice_count(), 32);
        assert_eq!(output.to_string(), "mock-device (Mock)");
        assert!(output.to_mock().is_ok());
    }
}
