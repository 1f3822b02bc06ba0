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
use std::path::{Path, PathBuf};

use config::{Config, File};
use serde::{Deserialize, Serialize};

mod audio;
mod error;
mod input;

pub use self::audio::Audio;
pub use self::error::ConfigError;
pub use self::input::Input;

const DEFAULT_MASTER_VOLUME: f32 = 0.5;

/// The settings for a keyclack instance.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Settings {
    /// The audio output configuration.
    #[serde(default)]
    audio: Audio,

    /// The input device configuration.
    #[serde(default)]
    input: Input,

    /// Volume applied to every sound, 0 to 1 (default: 0.5).
    master_volume: Option<f32>,

    /// Whether sounds are silenced.
    muted: Option<bool>,

    /// Whether keyboard keys make sounds (default: true).
    keyboard_sounds: Option<bool>,

    /// Whether mouse buttons make sounds (default: false).
    mouse_sounds: Option<bool>,

    /// The directory of the sound pack to load at start.
    sound_pack: Option<PathBuf>,
}

/// A single settings change.
#[derive(Clone, Debug, PartialEq)]
pub enum Setting {
    MasterVolume(f32),
    Muted(bool),
    KeyboardSounds(bool),
    MouseSounds(bool),
    SoundPack(Option<PathBuf>),
}

impl Settings {
    /// Parse settings from a YAML file.
    pub fn load(path: &Path) -> Result<Settings, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Settings>()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks values the types alone do not constrain.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(volume) = self.master_volume {
            check_volume(volume)?;
        }
        self.input.stop_timeout()?;
        Ok(())
    }

    /// Applies a settings change.
    pub fn apply(&mut self, setting: Setting) -> Result<(), ConfigError> {
        match setting {
            Setting::MasterVolume(volume) => {
                check_volume(volume)?;
                self.master_volume = Some(volume);
            }
            Setting::Muted(muted) => self.muted = Some(muted),
            Setting::KeyboardSounds(enabled) => self.keyboard_sounds = Some(enabled),
            Setting::MouseSounds(enabled) => self.mouse_sounds = Some(enabled),
            Setting::SoundPack(path) => self.sound_pack = path,
        }
        Ok(())
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    pub fn input(&self) -> &Input {
        &self.input
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume.unwrap_or(DEFAULT_MASTER_VOLUME)
    }

    pub fn muted(&self) -> bool {
        self.muted.unwrap_or(false)
    }

    pub fn keyboard_sounds(&self) -> bool {
        self.keyboard_sounds.unwrap_or(true)
    }

    pub fn mouse_sounds(&self) -> bool {
        self.mouse_sounds.unwrap_or(false)
    }

    pub fn sound_pack(&self) -> Option<&Path> {
        self.sound_pack.as_deref()
    }

    /// Builds settings around the given audio and input configuration.
    pub fn new(audio: Audio, input: Input) -> Settings {
        Settings {
            audio,
            input,
            ..Default::default()
        }
    }
}

fn check_volume(volume: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&volume) {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            key: "master_volume",
            reason: format!("{} is outside 0 to 1", volume),
        })
    }
}
