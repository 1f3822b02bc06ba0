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
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{crate_version, Parser, Subcommand};
use keyclack::app::App;
use keyclack::config::{Audio, Settings};
use keyclack::input::{self, InputAction};
use keyclack::playback::AudioEngine;
use keyclack::{audio, codec, pack};
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;
use tracing_subscriber::EnvFilter;

const SYSTEMD_SERVICE: &str = r#"
[Unit]
Description=keyboard click sounds

[Service]
Type=simple
Restart=on-failure
EnvironmentFile=-%h/.config/keyclack/environment
ExecStart=/usr/local/bin/keyclack start "$KEYCLACK_SETTINGS"

[Install]
WantedBy=default.target
Alias=keyclack.service
"#;

/// How long `click` waits for a sound to finish.
const CLICK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "Plays keyboard and mouse click sounds."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start will play click sounds until interrupted.
    Start {
        /// The path to the settings file.
        settings_path: String,
    },
    /// Lists the available audio output devices.
    Devices {},
    /// Lists the input devices and whether they can be read.
    InputDevices {
        /// The directory holding the event devices.
        #[arg(short, long, default_value = "/dev/input")]
        dir: String,
    },
    /// Describes a sound pack and verifies that every asset decodes.
    Pack {
        /// The path to the sound pack directory.
        path: String,
    },
    /// Plays the down and up sounds of one key.
    Click {
        /// The path to the sound pack directory.
        pack_path: String,
        /// The key-code to play.
        key_code: u16,
        /// The device name to play through.
        #[arg(short, long, default_value = "default")]
        device: String,
    },
    /// Prints a systemd user service definition to stdout.
    Systemd {},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { settings_path } => {
            let settings = Settings::load(&PathBuf::from(&settings_path))?;
            let app = App::new(settings);
            app.start()?;

            let mut terminate = signal(SignalKind::terminate())?;
            tokio::select! {
                result = tokio::signal::ctrl_c() => result?,
                _ = terminate.recv() => {},
            }
            info!("Shutting down");
            app.stop().await;
        }
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::InputDevices { dir } => {
            let discovery = input::discover(&PathBuf::from(&dir))?;

            if discovery.accessible.is_empty() && discovery.inaccessible.is_empty() {
                println!("No input devices found in {}.", dir);
                return Ok(());
            }

            println!("Input devices:");
            for device in discovery.accessible.iter() {
                println!("- {} (readable)", device.path().display());
            }
            for (path, err) in discovery.inaccessible.iter() {
                println!("- {} ({})", path.display(), err);
            }
            if discovery.accessible.is_empty() {
                println!("\nNo device can be read; {}", input::PERMISSION_REMEDIATION);
            }
        }
        Commands::Pack { path } => {
            let pack = pack::load_dir(&PathBuf::from(&path))?;
            print!("{}", serde_yml::to_string(&pack)?);

            let mut failures = 0;
            for asset in pack.assets() {
                let path = pack.resolve(asset);
                let result = if pack.is_sprite() {
                    codec::decode_raw(&path).map(|_| ())
                } else {
                    codec::decode(&path).map(|_| ())
                };
                if let Err(e) = result {
                    failures += 1;
                    println!("! {}: {}", asset, e);
                }
            }

            match &pack.unsupported_reason {
                Some(reason) => println!("\nNot supported: {}", reason),
                None if failures == 0 => println!("\nAll assets decode."),
                None => println!("\n{} asset(s) failed to decode.", failures),
            }
        }
        Commands::Click {
            pack_path,
            key_code,
            device,
        } => {
            let pack = pack::load_dir(&PathBuf::from(&pack_path))?;
            let engine = AudioEngine::new(Audio::new(&device));
            engine.initialize()?;
            engine.set_volume(1.0);
            let result = engine.load_pack(&pack)?;
            info!(?result, "Sound pack loaded");

            let Some(output) = engine.output() else {
                return Err("audio output closed unexpectedly".into());
            };
            for action in [InputAction::KeyDown, InputAction::KeyUp] {
                match engine.play(key_code, action) {
                    Some(voice) => {
                        let start = Instant::now();
                        while output.is_playing(voice) && start.elapsed() < CLICK_TIMEOUT {
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    }
                    None => println!("No {} sound for key {}.", action, key_code),
                }
            }
            engine.shutdown();
        }
        Commands::Systemd {} => {
            println!("{}", SYSTEMD_SERVICE)
        }
    };

    Ok(())
}
