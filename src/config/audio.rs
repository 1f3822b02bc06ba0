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
use serde::{Deserialize, Serialize};

const DEFAULT_DEVICE: &str = "default";
const DEFAULT_VOICES: usize = 32;
const DEFAULT_DECODE_WORKERS: usize = 4;

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Audio {
    /// The output device: a cpal device name, "default", or a name starting
    /// with "mock".
    #[serde(default = "default_device")]
    device: String,

    /// The number of voices that can sound at once (default: 32).
    voices: Option<usize>,

    /// The number of threads decoding a pack's assets (default: 4).
    decode_workers: Option<usize>,
}

fn default_device() -> String {
    DEFAULT_DEVICE.to_string()
}

impl Default for Audio {
    fn default() -> Audio {
        Audio::new(DEFAULT_DEVICE)
    }
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: device.to_string(),
            voices: None,
            decode_workers: None,
        }
    }

    /// Overrides the number of voices.
    pub fn with_voices(mut self, voices: usize) -> Audio {
        self.voices = Some(voices);
        self
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the number of voices (default: 32, at least 1).
    pub fn voices(&self) -> usize {
        self.voices.unwrap_or(DEFAULT_VOICES).max(1)
    }

    /// Returns the number of decode workers (default: 4, at least 1).
    pub fn decode_workers(&self) -> usize {
        self.decode_workers.unwrap_or(DEFAULT_DECODE_WORKERS).max(1)
    }
}
