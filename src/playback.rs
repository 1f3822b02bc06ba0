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
//! Turns sound packs into output buffers and key actions into voices.

mod engine;
mod loader;
mod store;
mod voice;

pub use engine::{AudioEngine, EngineError, EngineState};
pub use loader::{sprite_bounds, LoadError, LoadResult, LoadedPack, SoundPackLoader};
pub use store::{BufferStore, PackBuffers, PackLayout, Phase, StoredBuffer};
pub use voice::VoicePool;
