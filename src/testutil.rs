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
    error::Error,
    fs::File,
    path::Path,
    thread,
    time::{Duration, SystemTime},
};

use hound::{SampleFormat, WavSpec, WavWriter};

/// Writes interleaved 16-bit PCM samples to a WAV file.
pub fn write_wav_i16(
    path: &Path,
    samples: &[i16],
    sample_rate: u32,
    channels: u16,
) -> Result<(), Box<dyn Error>> {
    let mut writer = WavWriter::new(
        File::create(path)?,
        WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        },
    )?;
    for sample in samples {
        writer.write_sample(*sample)?;
    }
    writer.finalize()?;

    Ok(())
}

/// Writes mono integer samples at the given bit depth.
pub fn write_wav_i32(
    path: &Path,
    samples: &[i32],
    sample_rate: u32,
    bits_per_sample: u16,
) -> Result<(), Box<dyn Error>> {
    let mut writer = WavWriter::new(
        File::create(path)?,
        WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample,
            sample_format: SampleFormat::Int,
        },
    )?;
    for sample in samples {
        writer.write_sample(*sample)?;
    }
    writer.finalize()?;

    Ok(())
}

/// Writes interleaved 32-bit float samples to a WAV file.
pub fn write_wav_f32(
    path: &Path,
    samples: &[f32],
    sample_rate: u32,
    channels: u16,
) -> Result<(), Box<dyn Error>> {
    let mut writer = WavWriter::new(
        File::create(path)?,
        WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        },
    )?;
    for sample in samples {
        writer.write_sample(*sample)?;
    }
    writer.finalize()?;

    Ok(())
}

/// Writes raw unsigned 8-bit mono bytes with a hand-built RIFF header, so the
/// stored bytes are exactly the ones given.
pub fn write_wav_u8(path: &Path, bytes: &[u8], sample_rate: u32) -> Result<(), Box<dyn Error>> {
    let data_len = bytes.len() as u32;
    let mut out = Vec::with_capacity(44 + bytes.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes()); // byte rate
    out.extend_from_slice(&1u16.to_le_bytes()); // block align
    out.extend_from_slice(&8u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(bytes);
    std::fs::write(path, out)?;

    Ok(())
}

/// Encodes a kernel input record in the native layout.
pub fn input_record(seconds: i64, micros: i64, kind: u16, code: u16, value: i32) -> Vec<u8> {
    let mut record = Vec::new();
    record.extend_from_slice(&(seconds as libc::c_long).to_ne_bytes());
    record.extend_from_slice(&(micros as libc::c_long).to_ne_bytes());
    record.extend_from_slice(&kind.to_ne_bytes());
    record.extend_from_slice(&code.to_ne_bytes());
    record.extend_from_slice(&value.to_ne_bytes());
    record
}

/// Writes key records (type 1) to a file standing in for an event device.
pub fn write_key_records(path: &Path, records: &[(u16, i32)]) -> Result<(), Box<dyn Error>> {
    let mut out = Vec::new();
    for (index, (code, value)) in records.iter().enumerate() {
        out.extend(input_record(1_700_000_000, index as i64, 1, *code, *value));
    }
    std::fs::write(path, out)?;
    Ok(())
}

/// Creates a named pipe, standing in for an event device that has nothing to
/// read yet.
pub fn make_fifo(path: &Path) -> Result<(), Box<dyn Error>> {
    let status = std::process::Command::new("mkfifo")
        .arg("-m")
        .arg("600")
        .arg(path)
        .status()?;
    if !status.success() {
        return Err(format!("mkfifo {} failed: {}", path.display(), status).into());
    }
    Ok(())
}

/// Wait for the given predicate to return true or fail.
#[inline]
pub fn eventually<F>(predicate: F, error_msg: &str)
where
    F: Fn() -> bool,
{
    let start = SystemTime::now();
    let tick = Duration::from_millis(10);
    let timeout = Duration::from_secs(3);

    loop {
        let elapsed = start.elapsed();
        if elapsed.is_err() {
            panic!("System time error");
        }
        let elapsed = elapsed.unwrap();

        if elapsed > timeout {
            panic!("{}", error_msg);
        }
        if predicate() {
            return;
        }
        thread::sleep(tick);
    }
}

/// Wait for the given async predicate to return true or fail.
#[inline]
pub async fn eventually_async<F, Fut>(mut predicate: F, error_msg: &str)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = SystemTime::now();
    let tick = Duration::from_millis(10);
    let timeout = Duration::from_secs(3);

    loop {
        let elapsed = start.elapsed();
        if elapsed.is_err() {
            panic!("System time error");
        }
        let elapsed = elapsed.unwrap();

        if elapsed > timeout {
            panic!("{}", error_msg);
        }
        if predicate().await {
            return;
        }
        tokio::time::sleep(tick).await;
    }
}
