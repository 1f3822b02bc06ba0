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

//! The set of output buffers belonging to the active pack.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::audio::BufferId;

/// How the active pack's buffers are organized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PackLayout {
    /// One buffer per key and phase, with default pools as fallback.
    #[default]
    Files,
    /// One slice of a shared source per key. Down phase only.
    Sprite,
}

/// Whether a sound is for a press or a release.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Down,
    Up,
}

/// A buffer held by the output, with the gain its definition asks for.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StoredBuffer {
    pub id: BufferId,
    pub gain: f32,
}

impl StoredBuffer {
    pub fn new(id: BufferId, gain: f32) -> StoredBuffer {
        StoredBuffer { id, gain }
    }
}

/// Every buffer of one loaded pack. Built in full by the loader and never
/// modified once installed.
#[derive(Debug, Default)]
pub struct PackBuffers {
    layout: PackLayout,
    down: HashMap<u16, StoredBuffer>,
    up: HashMap<u16, StoredBuffer>,
    default_down: Vec<StoredBuffer>,
    default_up: Vec<StoredBuffer>,
    sprites: HashMap<u16, StoredBuffer>,
}

impl PackBuffers {
    pub fn new(layout: PackLayout) -> PackBuffers {
        PackBuffers {
            layout,
            ..Default::default()
        }
    }

    pub fn layout(&self) -> PackLayout {
        self.layout
    }

    /// Adds the buffer for a key's phase.
    pub fn insert(&mut self, key_code: u16, phase: Phase, buffer: StoredBuffer) {
        match phase {
            Phase::Down => self.down.insert(key_code, buffer),
            Phase::Up => self.up.insert(key_code, buffer),
        };
    }

    /// Appends a buffer to the phase's default pool.
    pub fn push_default(&mut self, phase: Phase, buffer: StoredBuffer) {
        match phase {
            Phase::Down => self.default_down.push(buffer),
            Phase::Up => self.default_up.push(buffer),
        }
    }

    /// Adds the sprite segment for a key.
    pub fn insert_sprite(&mut self, key_code: u16, buffer: StoredBuffer) {
        self.sprites.insert(key_code, buffer);
    }

    /// Picks the buffer for a trigger. Sprite packs only answer the down phase.
    /// File packs prefer the key's own buffer and otherwise draw uniformly from
    /// the phase's default pool.
    pub fn resolve<R: Rng + ?Sized>(
        &self,
        key_code: u16,
        phase: Phase,
        rng: &mut R,
    ) -> Option<StoredBuffer> {
        match self.layout {
            PackLayout::Sprite => match phase {
                Phase::Down => self.sprites.get(&key_code).copied(),
                Phase::Up => None,
            },
            PackLayout::Files => {
                let (exact, defaults) = match phase {
                    Phase::Down => (&self.down, &self.default_down),
                    Phase::Up => (&self.up, &self.default_up),
                };
                exact
                    .get(&key_code)
                    .copied()
                    .or_else(|| defaults.choose(rng).copied())
            }
        }
    }

    /// Every buffer id, for releasing them.
    pub fn ids(&self) -> Vec<BufferId> {
        self.down
            .values()
            .chain(self.up.values())
            .chain(self.sprites.values())
            .chain(self.default_down.iter())
            .chain(self.default_up.iter())
            .map(|buffer| buffer.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.down.len()
            + self.up.len()
            + self.sprites.len()
            + self.default_down.len()
            + self.default_up.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Holds the active pack's buffers. A new pack is swapped in with a single
/// assignment, so readers see either the old set or the new one. Removing a
/// set waits for every reader still working with it.
#[derive(Default)]
pub struct BufferStore {
    active: RwLock<Option<Arc<PackBuffers>>>,
}

impl BufferStore {
    pub fn new() -> BufferStore {
        BufferStore::default()
    }

    /// Installs a pack's buffers, returning the ones it replaced.
    pub fn install(&self, buffers: PackBuffers) -> Option<Arc<PackBuffers>> {
        self.active.write().replace(Arc::new(buffers))
    }

    /// Removes the active buffers.
    pub fn take(&self) -> Option<Arc<PackBuffers>> {
        self.active.write().take()
    }

    /// Removes the active buffers and hands them to `release` while readers
    /// are still shut out. Returns false if nothing was installed.
    pub fn take_with<F>(&self, release: F) -> bool
    where
        F: FnOnce(&PackBuffers),
    {
        let mut active = self.active.write();
        match active.take() {
            Some(buffers) => {
                release(&buffers);
                true
            }
            None => false,
        }
    }

    /// Runs `f` against the active buffers. The set cannot be removed until
    /// `f` returns.
    pub fn with_current<T, F>(&self, f: F) -> Option<T>
    where
        F: FnOnce(&PackBuffers) -> Option<T>,
    {
        self.active.read().as_deref().and_then(f)
    }

    /// The active buffers, if any.
    pub fn current(&self) -> Option<Arc<PackBuffers>> {
        self.active.read().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.active.read().is_some()
    }
}
