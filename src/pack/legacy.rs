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
//! Normalization of legacy community pack descriptors.
//!
//! Two layouts exist. `"single"` packs slice one `sound` file and define each
//! key as `[start_ms, duration_ms]`. `"multi"` packs point each key at its own
//! file, with optional `"<code>-up"` entries for key-up sounds.

use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::{SoundDefinition, SoundPack};

#[derive(Deserialize)]
struct LegacyConfig {
    id: Option<String>,
    name: Option<String>,
    key_define_type: Option<String>,
    sound: Option<String>,
    defines: Option<Map<String, Value>>,
    version: Option<Value>,
}

/// Parses a legacy descriptor into a pack. The folder is left for the caller.
pub(super) fn parse(contents: &str) -> Result<SoundPack, serde_json::Error> {
    let config: LegacyConfig = serde_json::from_str(contents)?;

    let mut pack = SoundPack::new(
        config.id.as_deref().unwrap_or_default(),
        config.name.as_deref().unwrap_or("Unnamed Pack"),
        Path::new(""),
    );
    pack.version = match &config.version {
        Some(Value::String(version)) => version.clone(),
        Some(Value::Number(version)) => version.to_string(),
        _ => String::new(),
    };

    let Some(defines) = config.defines else {
        return Ok(pack);
    };

    match (config.key_define_type.as_deref(), config.sound.as_deref()) {
        (Some("single"), Some(sound)) if !sound.is_empty() => {
            for (key, value) in defines.iter() {
                let Ok(key_code) = key.parse::<u16>() else {
                    continue;
                };
                let Some(range) = value.as_array().filter(|range| range.len() >= 2) else {
                    continue;
                };
                match (range[0].as_i64(), range[1].as_i64()) {
                    (Some(start), Some(duration)) => {
                        pack.insert(SoundDefinition::sprite(key_code, sound, start, duration))
                    }
                    _ => debug!(key = %key, "Skipping sprite entry without numeric bounds"),
                }
            }
        }
        (Some("multi"), _) => {
            for (key, value) in defines.iter() {
                let (Ok(key_code), Some(path)) = (key.parse::<u16>(), non_empty(value)) else {
                    continue;
                };
                pack.insert(SoundDefinition::file(key_code, path, None));
            }

            // Up sounds only attach to keys that already have a down sound.
            for (key, value) in defines.iter() {
                let Some(key_code) = key
                    .strip_suffix("-up")
                    .and_then(|code| code.parse::<u16>().ok())
                else {
                    continue;
                };
                if let (Some(definition), Some(path)) =
                    (pack.definitions.get_mut(&key_code), non_empty(value))
                {
                    definition.up = Some(path.to_string());
                }
            }
        }
        (kind, _) => debug!(kind = ?kind, "Unknown legacy key definition type"),
    }

    Ok(pack)
}

fn non_empty(value: &Value) -> Option<&str> {
    value.as_str().filter(|path| !path.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_sprite_pack() {
        let pack = parse(
            r#"{
                "id": "cream",
                "name": "NK Cream",
                "key_define_type": "single",
                "sound": "sound.ogg",
                "version": 1,
                "defines": {
                    "1": [0, 120],
                    "30": [1000, 200],
                    "31": null,
                    "32": [5],
                    "escape": [1, 2]
                }
            }"#,
        )
        .unwrap();

        assert_eq!(pack.id, "cream");
        assert_eq!(pack.version, "1");
        assert!(pack.is_sprite());
        assert_eq!(pack.definitions.len(), 2);
        assert_eq!(
            pack.definitions[&30],
            SoundDefinition::sprite(30, "sound.ogg", 1000, 200)
        );
        assert_eq!(pack.sprite_source(), Some("sound.ogg"));
    }

    #[test]
    fn test_multi_pack_with_up_sounds() {
        let pack = parse(
            r#"{
                "id": "holy-panda",
                "key_define_type": "multi",
                "defines": {
                    "30-up": "a-up.wav",
                    "30": "a.wav",
                    "31": "",
                    "32": null,
                    "33-up": "orphan.wav",
                    "57": "space.wav"
                }
            }"#,
        )
        .unwrap();

        assert_eq!(pack.name, "Unnamed Pack");
        assert!(!pack.is_sprite());
        assert_eq!(pack.definitions.len(), 2);
        assert_eq!(pack.definitions[&30].down, "a.wav");
        assert_eq!(pack.definitions[&30].up.as_deref(), Some("a-up.wav"));
        assert_eq!(pack.definitions[&57].up, None);
        assert!(!pack.definitions.contains_key(&33));
    }

    #[test]
    fn test_missing_defines() {
        let pack = parse(r#"{ "id": "empty", "key_define_type": "multi" }"#).unwrap();
        assert!(pack.definitions.is_empty());
    }

    #[test]
    fn test_single_without_sound_is_empty() {
        let pack = parse(
            r#"{ "id": "x", "key_define_type": "single", "defines": { "30": [0, 10] } }"#,
        )
        .unwrap();
        assert!(pack.definitions.is_empty());
    }
}
