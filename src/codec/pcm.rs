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
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use hound::{SampleFormat, WavReader};

use super::DecodeError;

/// Reads a linear PCM WAV file as interleaved 16-bit samples. Unsigned 8-bit
/// data is re-centered and scaled so that `b` becomes `(b - 128) * 256`.
pub(super) fn read(path: &Path) -> Result<(Vec<i16>, u32, u16), DecodeError> {
    let file = File::open(path).map_err(|e| DecodeError::io(path, e))?;
    let reader = WavReader::new(BufReader::new(file))?;
    let spec = reader.spec();

    if spec.sample_format != SampleFormat::Int {
        return Err(DecodeError::UnsupportedFormat);
    }

    let samples = match spec.bits_per_sample {
        // hound already re-centers unsigned 8-bit data around zero.
        8 => reader
            .into_samples::<i8>()
            .map(|sample| sample.map(|s| i16::from(s) * 256))
            .collect::<Result<Vec<i16>, hound::Error>>()?,
        16 => reader
            .into_samples::<i16>()
            .collect::<Result<Vec<i16>, hound::Error>>()?,
        bits => return Err(DecodeError::UnsupportedBitDepth(bits)),
    };

    Ok((samples, spec.sample_rate, spec.channels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_wav_i32;

    #[test]
    fn test_rejects_24_bit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deep.wav");
        write_wav_i32(&path, &[0, 1, 2], 44100, 24).unwrap();

        assert!(matches!(
            read(&path),
            Err(DecodeError::UnsupportedBitDepth(24))
        ));
    }

    #[test]
    fn test_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.wav");
        std::fs::write(&path, b"definitely not a riff file").unwrap();

        assert!(matches!(read(&path), Err(DecodeError::Wav(_))));
    }
}
