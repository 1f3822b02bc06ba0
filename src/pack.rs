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

//! Sound pack descriptors.
//!
//! A pack maps key-codes to click assets. It is either a set of individual
//! files, or a single sprite file sliced by per-key millisecond offsets.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::codec;

mod legacy;

/// The file name of a native pack descriptor.
pub const NATIVE_FILE: &str = "soundpack.json";

/// The file name of a legacy community pack descriptor.
pub const LEGACY_FILE: &str = "config.json";

#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("No soundpack.json or config.json found in {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO error reading {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Error parsing {}: {}", .path.display(), .source)]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The sound for a single key or mouse button.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SoundDefinition {
    pub key_code: u16,
    /// The key-down asset. For sprite packs this is the shared sprite source.
    pub down: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up: Option<String>,
    /// Gain applied on top of the master volume.
    #[serde(default = "default_volume")]
    pub volume: f32,
    /// Sprite offset in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprite_start: Option<i64>,
    /// Sprite length in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprite_duration: Option<i64>,
}

fn default_volume() -> f32 {
    1.0
}

impl SoundDefinition {
    /// A key with a down sound and an optional up sound.
    pub fn file(key_code: u16, down: &str, up: Option<&str>) -> SoundDefinition {
        SoundDefinition {
            key_code,
            down: down.to_string(),
            up: up.map(str::to_string),
            volume: default_volume(),
            sprite_start: None,
            sprite_duration: None,
        }
    }

    /// A key that plays a slice of a shared sprite source.
    pub fn sprite(key_code: u16, source: &str, start_ms: i64, duration_ms: i64) -> SoundDefinition {
        SoundDefinition {
            key_code,
            down: source.to_string(),
            up: None,
            volume: default_volume(),
            sprite_start: Some(start_ms),
            sprite_duration: Some(duration_ms),
        }
    }
}

/// A normalized sound pack.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SoundPack {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub version: String,
    /// Base folder that relative asset paths are resolved against.
    #[serde(skip)]
    pub folder: PathBuf,
    #[serde(default, with = "definition_list")]
    pub definitions: BTreeMap<u16, SoundDefinition>,
    #[serde(default)]
    pub default_down: Vec<String>,
    #[serde(default)]
    pub default_up: Vec<String>,
    #[serde(skip, default = "default_supported")]
    pub supported: bool,
    #[serde(skip)]
    pub unsupported_reason: Option<String>,
}

fn default_supported() -> bool {
    true
}

impl SoundPack {
    /// Creates an empty pack rooted at the given folder.
    pub fn new(id: &str, name: &str, folder: &Path) -> SoundPack {
        SoundPack {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            author: String::new(),
            version: String::new(),
            folder: folder.to_path_buf(),
            definitions: BTreeMap::new(),
            default_down: Vec::new(),
            default_up: Vec::new(),
            supported: true,
            unsupported_reason: None,
        }
    }

    /// Adds or replaces the definition for its key-code.
    pub fn insert(&mut self, definition: SoundDefinition) {
        self.definitions.insert(definition.key_code, definition);
    }

    /// A pack is a sprite pack when any definition carries a sprite offset.
    pub fn is_sprite(&self) -> bool {
        self.definitions
            .values()
            .any(|definition| definition.sprite_start.is_some())
    }

    /// The shared sprite source: the asset of the first sprite-bearing definition.
    pub fn sprite_source(&self) -> Option<&str> {
        self.definitions
            .values()
            .find(|definition| definition.sprite_start.is_some())
            .map(|definition| definition.down.as_str())
    }

    /// Resolves an asset path against the pack folder.
    pub fn resolve(&self, asset: &str) -> PathBuf {
        let path = Path::new(asset);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.folder.join(path)
        }
    }

    /// Every asset the pack refers to, without duplicates.
    pub fn assets(&self) -> BTreeSet<&str> {
        let mut assets: BTreeSet<&str> = BTreeSet::new();
        for definition in self.definitions.values() {
            assets.insert(&definition.down);
            if let Some(up) = &definition.up {
                assets.insert(up);
            }
        }
        assets.extend(self.default_down.iter().map(String::as_str));
        assets.extend(self.default_up.iter().map(String::as_str));
        assets.retain(|asset| !asset.is_empty());
        assets
    }

    /// Marks the pack unsupported if it refers to assets the codec layer
    /// cannot decode.
    pub fn check_codecs(&mut self) {
        let unsupported: Vec<String> = self
            .assets()
            .into_iter()
            .filter(|asset| !codec::is_supported(Path::new(asset)))
            .map(str::to_string)
            .collect();

        if !unsupported.is_empty() {
            self.supported = false;
            self.unsupported_reason = Some(format!(
                "unsupported audio format: {}",
                unsupported.join(", ")
            ));
        }
    }
}

/// Definitions are stored by key-code but written as a list.
mod definition_list {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::SoundDefinition;

    pub fn serialize<S: Serializer>(
        definitions: &BTreeMap<u16, SoundDefinition>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let list: Vec<&SoundDefinition> = definitions.values().collect();
        list.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<u16, SoundDefinition>, D::Error> {
        let list = Vec::<SoundDefinition>::deserialize(deserializer)?;
        Ok(list
            .into_iter()
            .map(|definition| (definition.key_code, definition))
            .collect())
    }
}

/// Loads the pack in the given directory, preferring the native descriptor
/// over a legacy one.
pub fn load_dir(dir: &Path) -> Result<SoundPack, PackError> {
    let native = dir.join(NATIVE_FILE);
    let legacy = dir.join(LEGACY_FILE);

    let mut pack = if native.is_file() {
        let contents = read(&native)?;
        serde_json::from_str::<SoundPack>(&contents).map_err(|source| PackError::Parse {
            path: native.clone(),
            source,
        })?
    } else if legacy.is_file() {
        let contents = read(&legacy)?;
        legacy::parse(&contents).map_err(|source| PackError::Parse {
            path: legacy.clone(),
            source,
        })?
    } else {
        return Err(PackError::NotFound(dir.to_path_buf()));
    };

    pack.folder = dir.to_path_buf();
    if pack.id.is_empty() {
        pack.id = dir
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
    }
    pack.check_codecs();

    if pack.supported {
        info!(
            pack = %pack.id,
            name = %pack.name,
            keys = pack.definitions.len(),
            sprite = pack.is_sprite(),
            "Sound pack parsed"
        );
    } else {
        warn!(
            pack = %pack.id,
            reason = pack.unsupported_reason.as_deref().unwrap_or_default(),
            "Sound pack is not supported"
        );
    }

    Ok(pack)
}

fn read(path: &Path) -> Result<String, PackError> {
    fs::read_to_string(path).map_err(|source| PackError::Io {
        path: path.to_path_buf(),
        source,
    })
}
