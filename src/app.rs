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
use std::error::Error;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{error, info, warn};

use crate::config::{Setting, Settings};
use crate::input::{InputEvent, InputKind, InputMonitor};
use crate::pack;
use crate::playback::{AudioEngine, LoadResult};

/// Which kinds of input make sounds.
struct Switches {
    keyboard: AtomicBool,
    mouse: AtomicBool,
}

impl Switches {
    fn allows(&self, event: &InputEvent) -> bool {
        match event.kind {
            InputKind::Keyboard => self.keyboard.load(Ordering::Relaxed),
            InputKind::Mouse => self.mouse.load(Ordering::Relaxed),
        }
    }
}

/// The input monitor wired to the audio engine.
pub struct App {
    settings: RwLock<Settings>,
    engine: Arc<AudioEngine>,
    monitor: InputMonitor,
    switches: Arc<Switches>,
}

impl App {
    pub fn new(settings: Settings) -> App {
        let engine = Arc::new(AudioEngine::new(settings.audio().clone()));
        let monitor = InputMonitor::new(&settings.input().device_dir());
        let switches = Arc::new(Switches {
            keyboard: AtomicBool::new(settings.keyboard_sounds()),
            mouse: AtomicBool::new(settings.mouse_sounds()),
        });

        let handler_engine = engine.clone();
        let handler_switches = switches.clone();
        monitor.on_input_event(move |event| {
            if handler_switches.allows(&event) {
                handler_engine.play(event.key_code, event.action);
            }
        });

        App {
            settings: RwLock::new(settings),
            engine,
            monitor,
            switches,
        }
    }

    /// Opens the audio output, loads the configured pack and starts reading
    /// input. A pack that fails to load is logged and the app runs silent.
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), Box<dyn Error>> {
        let settings = self.settings.read().clone();
        self.engine.initialize()?;
        self.engine.set_volume(settings.master_volume());
        self.engine.set_muted(settings.muted());

        if let Some(path) = settings.sound_pack() {
            if let Err(e) = self.load_pack(path) {
                error!(pack = ?path, err = %e, "Unable to load sound pack");
            }
        }

        let readers = self.monitor.start()?;
        info!(readers, "keyclack started");
        Ok(())
    }

    /// Applies a settings change to the settings and the running engine.
    pub fn apply(&self, setting: Setting) -> Result<(), Box<dyn Error>> {
        self.settings.write().apply(setting.clone())?;
        match setting {
            Setting::MasterVolume(volume) => self.engine.set_volume(volume),
            Setting::Muted(muted) => self.engine.set_muted(muted),
            Setting::KeyboardSounds(enabled) => {
                self.switches.keyboard.store(enabled, Ordering::Relaxed)
            }
            Setting::MouseSounds(enabled) => self.switches.mouse.store(enabled, Ordering::Relaxed),
            Setting::SoundPack(Some(path)) => {
                self.load_pack(&path)?;
            }
            Setting::SoundPack(None) => self.engine.unload_pack(),
        }
        Ok(())
    }

    /// Stops reading input, waiting at most the configured stop timeout, then
    /// shuts the engine down.
    pub async fn stop(&self) {
        let timeout = self.stop_timeout();
        if tokio::time::timeout(timeout, self.monitor.stop())
            .await
            .is_err()
        {
            warn!(?timeout, "Input readers did not stop in time");
        }
        self.engine.shutdown();
        info!("keyclack stopped");
    }

    pub fn engine(&self) -> &AudioEngine {
        &self.engine
    }

    pub fn monitor(&self) -> &InputMonitor {
        &self.monitor
    }

    pub fn settings(&self) -> Settings {
        self.settings.read().clone()
    }

    fn stop_timeout(&self) -> Duration {
        match self.settings.read().input().stop_timeout() {
            Ok(timeout) => timeout,
            Err(e) => {
                warn!(err = %e, "Invalid stop timeout, using 2s");
                Duration::from_secs(2)
            }
        }
    }

    fn load_pack(&self, dir: &Path) -> Result<LoadResult, Box<dyn Error>> {
        let pack = pack::load_dir(dir)?;
        let result = self.engine.load_pack(&pack)?;
        info!(
            pack = %pack.name,
            layout = ?result.layout,
            loaded = result.loaded + result.sprite_segments,
            failed = result.failed,
            "Sound pack ready"
        );
        Ok(result)
    }
}
