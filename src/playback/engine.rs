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
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, span, Level};

use super::loader::{LoadError, LoadResult, SoundPackLoader};
use super::store::{BufferStore, PackBuffers, Phase};
use super::voice::VoicePool;
use crate::audio::{self, Output, OutputError};
use crate::config;
use crate::input::InputAction;
use crate::pack::SoundPack;

const DEFAULT_VOLUME: f32 = 0.5;

/// Where the engine is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Ready,
    PackLoaded,
    ShutDown,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Ready => "ready",
            EngineState::PackLoaded => "pack loaded",
            EngineState::ShutDown => "shut down",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Unable to open audio output: {0}")]
    Output(#[from] OutputError),

    #[error("Cannot {operation} while the engine is {state}")]
    InvalidState {
        operation: &'static str,
        state: EngineState,
    },

    #[error("Unable to load sound pack: {0}")]
    Load(#[from] LoadError),

    #[error("Sound pack {id} is not supported: {reason}")]
    UnsupportedPack { id: String, reason: String },

    #[error("Unable to start decode workers: {0}")]
    Workers(#[from] rayon::ThreadPoolBuildError),
}

/// Everything that exists between initialize and shutdown.
struct Active {
    output: Arc<dyn Output>,
    voices: VoicePool,
    loader: SoundPackLoader,
}

/// Plays a sound pack's buffers in response to key and button actions.
///
/// Lifecycle calls (initialize, load, unload, shutdown) are serialized. `play`
/// never takes the lifecycle lock and may run concurrently with a load: it
/// sees either the previous pack's buffers or the new pack's, never a mix,
/// and an unload waits for it to finish attaching its voice.
pub struct AudioEngine {
    config: config::Audio,
    state: Mutex<EngineState>,
    active: RwLock<Option<Arc<Active>>>,
    store: BufferStore,
    volume: AtomicU32,
    muted: AtomicBool,
}

impl AudioEngine {
    pub fn new(config: config::Audio) -> AudioEngine {
        AudioEngine {
            config,
            state: Mutex::new(EngineState::Uninitialized),
            active: RwLock::new(None),
            store: BufferStore::new(),
            volume: AtomicU32::new(DEFAULT_VOLUME.to_bits()),
            muted: AtomicBool::new(false),
        }
    }

    /// Opens the audio output and its voices.
    pub fn initialize(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if *state != EngineState::Uninitialized {
            return Err(EngineError::InvalidState {
                operation: "initialize",
                state: *state,
            });
        }

        let output = audio::open_output(&self.config)?;
        let loader = SoundPackLoader::new(self.config.decode_workers())?;
        let voices = VoicePool::new(output.voice_count());
        info!(
            output = %output,
            voices = voices.count(),
            decode_workers = loader.workers(),
            "Audio engine initialized"
        );

        *self.active.write() = Some(Arc::new(Active {
            output,
            voices,
            loader,
        }));
        *state = EngineState::Ready;
        Ok(())
    }

    /// Replaces the current pack with the given one. Whatever was loaded is
    /// unloaded first, so a failed load leaves the engine with no pack.
    pub fn load_pack(&self, pack: &SoundPack) -> Result<LoadResult, EngineError> {
        let mut state = self.state.lock();
        let active = match (*state, self.active()) {
            (EngineState::Ready | EngineState::PackLoaded, Some(active)) => active,
            _ => {
                return Err(EngineError::InvalidState {
                    operation: "load a sound pack",
                    state: *state,
                })
            }
        };

        let span = span!(Level::INFO, "load pack", pack = %pack.id);
        let _enter = span.enter();

        self.release_pack(&active);
        *state = EngineState::Ready;

        if !pack.supported {
            return Err(EngineError::UnsupportedPack {
                id: pack.id.clone(),
                reason: pack
                    .unsupported_reason
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
            });
        }

        let loaded = active.loader.load(pack, active.output.as_ref())?;
        if let Some(stale) = self.store.install(loaded.buffers) {
            // Nothing else installs while the lifecycle lock is held.
            release_buffers(active.output.as_ref(), &stale);
        }
        *state = EngineState::PackLoaded;
        Ok(loaded.result)
    }

    /// Plays the sound for a key action and returns the voice it was assigned
    /// to. Returns `None` when muted, when no pack is loaded or when the pack
    /// has no sound for the action.
    pub fn play(&self, key_code: u16, action: InputAction) -> Option<usize> {
        if self.is_muted() {
            return None;
        }

        let active = self.active()?;
        let phase = if action.is_down() {
            Phase::Down
        } else {
            Phase::Up
        };

        // The buffer set stays installed until the voice is attached, so an
        // unload can't release a buffer between resolving and playing it.
        let (voice, gain) = self.store.with_current(|buffers| {
            let buffer = buffers.resolve(key_code, phase, &mut rand::thread_rng())?;
            let voice = active
                .voices
                .allocate(|voice| active.output.is_playing(voice))?;
            let gain = self.volume() * buffer.gain;
            active.output.play(voice, buffer.id, gain);
            Some((voice, gain))
        })?;
        debug!(key_code, ?action, voice, gain, "Playing sound");
        Some(voice)
    }

    /// Sets the master volume for later plays, clamped to [0, 1].
    pub fn set_volume(&self, volume: f32) {
        let volume = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };
        self.volume.store(volume.to_bits(), Ordering::Relaxed);
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    /// Gates `play`. Voices that are already playing are left alone.
    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    /// Releases the current pack's buffers.
    pub fn unload_pack(&self) {
        let mut state = self.state.lock();
        if *state != EngineState::PackLoaded {
            return;
        }
        if let Some(active) = self.active() {
            self.release_pack(&active);
        }
        *state = EngineState::Ready;
        info!("Sound pack unloaded");
    }

    /// Unloads, releases the voices and closes the output. Safe to call more
    /// than once.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        if *state == EngineState::ShutDown {
            return;
        }

        let active = self.active.write().take();
        if let Some(active) = active {
            self.release_pack(&active);
            active.output.close();
            info!(output = %active.output, "Audio engine shut down");
        }
        *state = EngineState::ShutDown;
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    /// The open output, if the engine is initialized.
    pub fn output(&self) -> Option<Arc<dyn Output>> {
        self.active().map(|active| active.output.clone())
    }

    fn active(&self) -> Option<Arc<Active>> {
        self.active.read().clone()
    }

    /// Detaches every voice and releases the pack's buffers. Plays already in
    /// flight finish before the detach, and later plays find no pack.
    fn release_pack(&self, active: &Active) {
        self.store.take_with(|buffers| {
            if active.output.requires_detach() {
                for voice in 0..active.voices.count() {
                    active.output.stop(voice);
                }
            }
            release_buffers(active.output.as_ref(), buffers);
        });
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn release_buffers(output: &dyn Output, buffers: &PackBuffers) {
    for id in buffers.ids() {
        output.release(id);
    }
}
