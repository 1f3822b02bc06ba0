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
use std::io;
use std::path::PathBuf;

/// Errors produced while decoding a single asset. The loader decides whether a
/// failure is fatal; for most assets it only skips the file.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("IO error reading {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unsupported container for {}", .0.display())]
    UnsupportedContainer(PathBuf),

    #[error("Unsupported WAV format: only integer PCM is supported")]
    UnsupportedFormat,

    #[error("Unsupported WAV bit depth {0}: only 8 and 16 bit PCM are supported")]
    UnsupportedBitDepth(u16),

    #[error("Unsupported channel count {0}: only mono and stereo are supported")]
    UnsupportedChannels(u16),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Audio file error: {0}")]
    Audio(#[from] symphonia::core::errors::Error),

    #[error("No audio track found in {}", .0.display())]
    NoTrack(PathBuf),

    #[error("Sample rate not specified in {}", .0.display())]
    NoSampleRate(PathBuf),
}

impl DecodeError {
    pub(super) fn io(path: &std::path::Path, source: io::Error) -> DecodeError {
        DecodeError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
