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
use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

#[cfg(test)]
use std::error::Error;

use parking_lot::Mutex;
use tracing::debug;

use super::{BufferId, OutputError};
use crate::codec::DecodedBuffer;

/// A copy of a buffer handed to the mock output.
#[derive(Clone, Debug)]
pub struct UploadedBuffer {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// A single call to `play` on the mock output.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayRecord {
    pub voice: usize,
    pub buffer: BufferId,
    pub gain: f32,
}

/// A mock output. Doesn't actually play anything: a voice counts as playing
/// from `play` until it is stopped or explicitly finished.
#[derive(Clone)]
pub struct Output {
    name: String,
    voices: Arc<Vec<AtomicBool>>,
    buffers: Arc<Mutex<HashMap<BufferId, UploadedBuffer>>>,
    plays: Arc<Mutex<Vec<PlayRecord>>>,
    stops: Arc<Mutex<Vec<usize>>>,
    released: Arc<Mutex<Vec<BufferId>>>,
    stale_plays: Arc<AtomicU64>,
    next_id: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl Output {
    /// Gets the given mock output.
    pub fn get(name: &str, voices: usize) -> Output {
        Output {
            name: name.to_string(),
            voices: Arc::new((0..voices).map(|_| AtomicBool::new(false)).collect()),
            buffers: Arc::new(Mutex::new(HashMap::new())),
            plays: Arc::new(Mutex::new(Vec::new())),
            stops: Arc::new(Mutex::new(Vec::new())),
            released: Arc::new(Mutex::new(Vec::new())),
            stale_plays: Arc::new(AtomicU64::new(0)),
            next_id: Arc::new(AtomicU64::new(1)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Every play issued so far, in order.
    pub fn plays(&self) -> Vec<PlayRecord> {
        self.plays.lock().clone()
    }

    /// Every voice stopped so far, in order.
    pub fn stops(&self) -> Vec<usize> {
        self.stops.lock().clone()
    }

    /// Every buffer released so far, in order.
    pub fn released(&self) -> Vec<BufferId> {
        self.released.lock().clone()
    }

    /// Returns the buffer if it is still held by the output.
    pub fn buffer(&self, id: BufferId) -> Option<UploadedBuffer> {
        self.buffers.lock().get(&id).cloned()
    }

    /// The number of buffers currently held by the output.
    pub fn buffer_count(&self) -> usize {
        self.buffers.lock().len()
    }

    /// Marks the voice as having finished playback.
    pub fn finish(&self, voice: usize) {
        if let Some(playing) = self.voices.get(voice) {
            playing.store(false, Ordering::Relaxed);
        }
    }

    /// The number of plays that named a buffer the output no longer holds.
    pub fn stale_plays(&self) -> u64 {
        self.stale_plays.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

impl super::Output for Output {
    fn voice_count(&self) -> usize {
        self.voices.len()
    }

    fn upload(&self, buffer: &DecodedBuffer) -> Result<BufferId, OutputError> {
        if buffer.samples().is_empty() {
            return Err(OutputError::EmptyBuffer {
                channels: buffer.channels(),
                sample_rate: buffer.sample_rate(),
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.buffers.lock().insert(
            id,
            UploadedBuffer {
                samples: buffer.samples().to_vec(),
                sample_rate: buffer.sample_rate(),
                channels: buffer.channels(),
            },
        );
        Ok(id)
    }

    fn release(&self, buffer: BufferId) {
        self.buffers.lock().remove(&buffer);
        self.released.lock().push(buffer);
    }

    fn is_playing(&self, voice: usize) -> bool {
        self.voices
            .get(voice)
            .is_some_and(|playing| playing.load(Ordering::Relaxed))
    }

    fn play(&self, voice: usize, buffer: BufferId, gain: f32) {
        debug!(device = %self.name, voice, buffer, gain, "Playing buffer (mock)");
        if !self.buffers.lock().contains_key(&buffer) {
            self.stale_plays.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(playing) = self.voices.get(voice) {
            playing.store(true, Ordering::Relaxed);
        }
        self.plays.lock().push(PlayRecord {
            voice,
            buffer,
            gain,
        });
    }

    fn stop(&self, voice: usize) {
        self.finish(voice);
        self.stops.lock().push(voice);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<Output>, Box<dyn Error>> {
        Ok(Arc::new(self.clone()))
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
