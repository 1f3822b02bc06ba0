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

//! Decodes a sound pack and hands its buffers to the output.

use std::fmt;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info, warn};

use super::store::{PackBuffers, PackLayout, Phase, StoredBuffer};
use crate::audio::Output;
use crate::codec::{self, DecodeError, DecodedBuffer};
use crate::pack::SoundPack;

/// Errors that fail a whole pack load.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Sound pack {0} has no sprite source")]
    NoSpriteSource(String),

    #[error("Unable to decode sprite source: {0}")]
    SpriteSource(#[source] DecodeError),

    #[error("None of the {0} assets of sound pack {1} could be loaded")]
    NothingLoaded(usize, String),
}

/// What a load produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadResult {
    pub layout: PackLayout,
    /// Per-key buffers decoded and handed to the output.
    pub loaded: usize,
    /// Per-key or default assets that could not be decoded or handed off.
    pub failed: usize,
    pub defaults_down: usize,
    pub defaults_up: usize,
    pub sprite_segments: usize,
    /// Sprite definitions with missing or out of range bounds.
    pub skipped: usize,
}

/// The buffers of a freshly loaded pack, ready to be installed in the store.
#[derive(Debug)]
pub struct LoadedPack {
    pub buffers: PackBuffers,
    pub result: LoadResult,
}

struct Job<'a> {
    key_code: u16,
    asset: &'a str,
    phase: Phase,
    gain: f32,
}

/// Loads packs using a small pool of decode workers.
pub struct SoundPackLoader {
    pool: ThreadPool,
    workers: usize,
}

impl SoundPackLoader {
    /// Creates a loader with at most `workers` decode threads, capped by the
    /// number of CPUs.
    pub fn new(workers: usize) -> Result<SoundPackLoader, rayon::ThreadPoolBuildError> {
        let workers = workers.min(num_cpus::get()).max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("keyclack-decode-{}", index))
            .build()?;
        Ok(SoundPackLoader { pool, workers })
    }

    /// Decodes every asset of the pack and uploads it to the output.
    pub fn load(&self, pack: &SoundPack, output: &dyn Output) -> Result<LoadedPack, LoadError> {
        if pack.is_sprite() {
            self.load_sprite(pack, output)
        } else {
            self.load_files(pack, output)
        }
    }

    fn load_files(&self, pack: &SoundPack, output: &dyn Output) -> Result<LoadedPack, LoadError> {
        let mut jobs: Vec<Job> = Vec::new();
        for definition in pack.definitions.values() {
            jobs.push(Job {
                key_code: definition.key_code,
                asset: &definition.down,
                phase: Phase::Down,
                gain: definition.volume,
            });
            if let Some(up) = &definition.up {
                jobs.push(Job {
                    key_code: definition.key_code,
                    asset: up,
                    phase: Phase::Up,
                    gain: definition.volume,
                });
            }
        }

        let decoded: Vec<Option<StoredBuffer>> = self.pool.install(|| {
            jobs.par_iter()
                .map(|job| load_asset(pack, job.asset, job.gain, output))
                .collect()
        });

        let mut buffers = PackBuffers::new(PackLayout::Files);
        let mut result = LoadResult {
            layout: PackLayout::Files,
            ..Default::default()
        };
        for (job, stored) in jobs.iter().zip(decoded) {
            match stored {
                Some(stored) => {
                    buffers.insert(job.key_code, job.phase, stored);
                    result.loaded += 1;
                }
                None => result.failed += 1,
            }
        }

        // Defaults are few; load them in order so the pools keep descriptor order.
        for (phase, assets) in [
            (Phase::Down, &pack.default_down),
            (Phase::Up, &pack.default_up),
        ] {
            for asset in assets {
                match load_asset(pack, asset, 1.0, output) {
                    Some(stored) => {
                        buffers.push_default(phase, stored);
                        match phase {
                            Phase::Down => result.defaults_down += 1,
                            Phase::Up => result.defaults_up += 1,
                        }
                    }
                    None => result.failed += 1,
                }
            }
        }

        let requested = jobs.len() + pack.default_down.len() + pack.default_up.len();
        if requested > 0 && buffers.is_empty() {
            return Err(LoadError::NothingLoaded(requested, pack.id.clone()));
        }

        info!(
            pack = %pack.id,
            loaded = result.loaded,
            failed = result.failed,
            defaults_down = result.defaults_down,
            defaults_up = result.defaults_up,
            "Sound pack loaded"
        );
        Ok(LoadedPack { buffers, result })
    }

    fn load_sprite(&self, pack: &SoundPack, output: &dyn Output) -> Result<LoadedPack, LoadError> {
        let source = pack
            .sprite_source()
            .filter(|source| !source.is_empty())
            .ok_or_else(|| LoadError::NoSpriteSource(pack.id.clone()))?;
        let path = pack.resolve(source);
        let raw = codec::decode_raw(&path).map_err(LoadError::SpriteSource)?;

        let mut buffers = PackBuffers::new(PackLayout::Sprite);
        let mut result = LoadResult {
            layout: PackLayout::Sprite,
            ..Default::default()
        };

        for definition in pack.definitions.values() {
            let bounds = match (definition.sprite_start, definition.sprite_duration) {
                (Some(start_ms), Some(duration_ms)) => sprite_bounds(
                    start_ms,
                    duration_ms,
                    raw.sample_rate,
                    raw.channels,
                    raw.samples.len(),
                ),
                _ => None,
            };
            let Some((start, len)) = bounds else {
                debug!(
                    key_code = definition.key_code,
                    start_ms = definition.sprite_start,
                    duration_ms = definition.sprite_duration,
                    "Skipping sprite definition outside the source"
                );
                result.skipped += 1;
                continue;
            };

            let segment: Vec<i16> = raw.samples[start..start + len]
                .iter()
                .map(|sample| codec::quantize_clamped(*sample))
                .collect();
            let mut buffer = DecodedBuffer::new(segment, raw.sample_rate, raw.channels);
            match output.upload(&buffer) {
                Ok(id) => {
                    buffer.discard_samples();
                    buffers.insert_sprite(
                        definition.key_code,
                        StoredBuffer::new(id, definition.volume),
                    );
                    result.sprite_segments += 1;
                }
                Err(e) => {
                    warn!(key_code = definition.key_code, err = %e, "Unable to hand off sprite segment");
                    result.failed += 1;
                }
            }
        }

        info!(
            pack = %pack.id,
            source = ?path,
            segments = result.sprite_segments,
            skipped = result.skipped,
            failed = result.failed,
            "Sprite sound pack loaded"
        );
        Ok(LoadedPack { buffers, result })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl fmt::Debug for SoundPackLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoundPackLoader")
            .field("workers", &self.workers)
            .finish()
    }
}

/// Decodes one asset and hands it to the output. Failures are logged and
/// reported as `None`.
fn load_asset(pack: &SoundPack, asset: &str, gain: f32, output: &dyn Output) -> Option<StoredBuffer> {
    if asset.is_empty() {
        return None;
    }
    let path = pack.resolve(asset);
    let mut buffer = match codec::decode(&path) {
        Ok(buffer) => buffer,
        Err(e) => {
            warn!(path = ?path, err = %e, "Failed to decode sound");
            return None;
        }
    };

    match output.upload(&buffer) {
        Ok(id) => {
            buffer.discard_samples();
            debug!(
                path = ?path,
                channels = buffer.channels(),
                sample_rate = buffer.sample_rate(),
                duration_ms = buffer.duration().as_millis() as u64,
                "Sound loaded"
            );
            Some(StoredBuffer::new(id, gain))
        }
        Err(e) => {
            warn!(path = ?path, err = %e, "Failed to hand off sound");
            None
        }
    }
}

/// Computes the slice of a sprite source for a definition, in interleaved
/// samples. Returns `None` when the start lies outside the source or nothing
/// is left after clamping.
pub fn sprite_bounds(
    start_ms: i64,
    duration_ms: i64,
    sample_rate: u32,
    channels: u16,
    total: usize,
) -> Option<(usize, usize)> {
    let channels = i64::from(channels.max(1));
    let per_ms = i64::from(sample_rate) * channels;
    let total = i64::try_from(total).ok()?;

    // Starts snap down to a frame boundary so stereo channels never swap.
    let mut start = start_ms.checked_mul(per_ms)? / 1000;
    start -= start.rem_euclid(channels);
    let mut len = duration_ms.checked_mul(per_ms)? / 1000;

    if start < 0 || start >= total {
        return None;
    }
    len = len.min(total - start);
    if channels == 2 && len % 2 != 0 {
        len -= 1;
    }
    if len <= 0 {
        return None;
    }

    Some((start as usize, len as usize))
}
