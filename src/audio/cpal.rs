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
use std::{fmt, thread};

#[cfg(test)]
use std::{error::Error, sync::Arc};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use tracing::{error, info, span, Level};

use super::mixer::VoiceMixer;
use super::thread_priority::CallbackPriority;
use super::{BufferId, OutputError};
use crate::codec::DecodedBuffer;
use crate::config;

/// An output backed by a cpal stream. The stream is not `Send`, so it lives on
/// a dedicated thread that holds it open until the output is closed.
pub struct Output {
    /// The name of the device.
    name: String,
    /// The host the device belongs to.
    host_id: cpal::HostId,
    /// Mixes the voices into the stream.
    mixer: VoiceMixer,
    /// Dropping the sender releases the output thread.
    stop_tx: Mutex<Option<crossbeam_channel::Sender<()>>>,
    /// Handle to the thread that owns the stream.
    output_thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Output {
    /// Lists the names of the output devices of the default host.
    pub fn list() -> Result<Vec<String>, OutputError> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut names: Vec<String> = cpal::default_host()
            .output_devices()?
            .filter_map(|device| device_name(&device))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Opens the configured device with its default output format and starts
    /// the stream.
    pub fn open(config: &config::Audio) -> Result<Output, OutputError> {
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let host = cpal::default_host();
        let host_id = host.id();
        let name = config.device();
        let device = if name == "default" {
            host.default_output_device()
                .ok_or(OutputError::NoDefaultDevice)?
        } else {
            host.output_devices()?
                .find(|device| device_name(device).is_some_and(|n| n.trim() == name))
                .ok_or_else(|| OutputError::DeviceNotFound(name.to_string()))?
        };
        let name = device_name(&device).unwrap_or_else(|| name.to_string());

        let supported = device.default_output_config()?;
        let sample_format = supported.sample_format();
        let stream_config: cpal::StreamConfig = supported.config();
        let mixer = VoiceMixer::new(
            config.voices(),
            stream_config.channels,
            stream_config.sample_rate,
        );

        info!(
            device = %name,
            host = host_id.name(),
            channels = stream_config.channels,
            sample_rate = stream_config.sample_rate,
            format = ?sample_format,
            voices = config.voices(),
            "Opening output"
        );

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), OutputError>>(1);
        let output_thread = {
            let mixer = mixer.clone();
            thread::Builder::new()
                .name("keyclack-output".to_string())
                .spawn(move || {
                    run_output_thread(
                        device,
                        stream_config,
                        sample_format,
                        mixer,
                        stop_rx,
                        ready_tx,
                    )
                })?
        };

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Output {
                name,
                host_id,
                mixer,
                stop_tx: Mutex::new(Some(stop_tx)),
                output_thread: Mutex::new(Some(output_thread)),
            }),
            Ok(Err(e)) => {
                let _ = output_thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = output_thread.join();
                Err(OutputError::ThreadExited)
            }
        }
    }
}

#[allow(deprecated)]
fn device_name(device: &cpal::Device) -> Option<String> {
    device.name().ok()
}

/// Builds and starts the stream, reports readiness, then holds the stream
/// until the stop channel closes.
fn run_output_thread(
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    mixer: VoiceMixer,
    stop_rx: crossbeam_channel::Receiver<()>,
    ready_tx: crossbeam_channel::Sender<Result<(), OutputError>>,
) {
    let span = span!(Level::INFO, "output thread");
    let _enter = span.enter();

    let stream = match build_stream(&device, &config, sample_format, mixer) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(e.into()));
        return;
    }
    let _ = ready_tx.send(Ok(()));
    info!("Output stream started");

    wait_for_stop(&stop_rx);
    drop(stream);
    info!("Output stream closed");
}

/// Blocks until a stop is sent or the sender is dropped.
fn wait_for_stop(stop_rx: &crossbeam_channel::Receiver<()>) {
    let _ = stop_rx.recv();
}

fn build_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    mixer: VoiceMixer,
) -> Result<cpal::Stream, OutputError> {
    let on_error = |err| error!("CPAL output stream error: {}", err);

    let stream = match sample_format {
        cpal::SampleFormat::F32 => {
            let mut priority = CallbackPriority::from_env();
            device.build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    priority.apply_once();
                    mixer.process_into_output(data);
                },
                on_error,
                None,
            )?
        }
        cpal::SampleFormat::I16 => {
            device.build_output_stream(config, int_callback::<i16>(mixer), on_error, None)?
        }
        cpal::SampleFormat::I32 => {
            device.build_output_stream(config, int_callback::<i32>(mixer), on_error, None)?
        }
        other => return Err(OutputError::UnsupportedSampleFormat(format!("{:?}", other))),
    };

    Ok(stream)
}

/// Integer callback: mix into a reusable float scratch buffer and convert.
fn int_callback<T>(
    mixer: VoiceMixer,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static
where
    T: cpal::Sample + cpal::FromSample<f32>,
{
    let mut priority = CallbackPriority::from_env();
    let mut scratch: Vec<f32> = Vec::with_capacity(8192);
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        priority.apply_once();
        scratch.resize(data.len(), 0.0);
        mixer.process_into_output(&mut scratch);
        for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
            *dst = T::from_sample(src);
        }
    }
}

impl super::Output for Output {
    fn voice_count(&self) -> usize {
        self.mixer.voice_count()
    }

    fn upload(&self, buffer: &DecodedBuffer) -> Result<BufferId, OutputError> {
        self.mixer.add_buffer(buffer)
    }

    fn release(&self, buffer: BufferId) {
        self.mixer.remove_buffer(buffer);
    }

    fn is_playing(&self, voice: usize) -> bool {
        self.mixer.is_active(voice)
    }

    fn play(&self, voice: usize, buffer: BufferId, gain: f32) {
        self.mixer.start(voice, buffer, gain);
    }

    fn stop(&self, voice: usize) {
        self.mixer.stop(voice);
    }

    // Voices hold their own reference to the samples.
    fn requires_detach(&self) -> bool {
        false
    }

    fn close(&self) {
        if let Some(stop_tx) = self.stop_tx.lock().take() {
            let _ = stop_tx.try_send(());
        }
        if let Some(thread) = self.output_thread.lock().take() {
            if thread.join().is_err() {
                error!(device = %self.name, "Output thread panicked");
            }
        }
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<super::mock::Output>, Box<dyn Error>> {
        Err("not a mock".into())
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        super::Output::close(self);
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}, SampleRate={}) ({})",
            self.name,
            self.mixer.num_channels(),
            self.mixer.sample_rate(),
            self.host_id.name()
        )
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_wait_for_stop_on_send() {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let join = thread::spawn(move || wait_for_stop(&stop_rx));

        thread::sleep(Duration::from_millis(20));
        assert!(!join.is_finished());
        stop_tx.send(()).unwrap();
        assert!(join.join().is_ok());
    }

    #[test]
    fn test_wait_for_stop_on_drop() {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let join = thread::spawn(move || wait_for_stop(&stop_rx));

        drop(stop_tx);
        assert!(join.join().is_ok());
    }
}
