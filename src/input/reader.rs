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
use std::io::{self, Read};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::io::unix::AsyncFd;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::discovery::Device;
use super::{InputAction, InputEvent, InputKind};

/// Width of each half of the record's timeval.
const WORD: usize = std::mem::size_of::<libc::c_long>();

/// Size of one kernel input record: timeval, type, code, value.
pub const RECORD_SIZE: usize = 2 * WORD + 8;

/// Records read per call at most.
const READ_BATCH: usize = 64;

const EV_KEY: u16 = 1;

/// BTN_LEFT through BTN_TASK.
const MOUSE_BUTTONS: RangeInclusive<u16> = 0x110..=0x117;

/// One record as the kernel wrote it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawRecord {
    pub seconds: i64,
    pub micros: i64,
    pub kind: u16,
    pub code: u16,
    pub value: i32,
}

/// Decodes a native-endian record. Returns `None` if the buffer is short.
pub fn parse_record(buf: &[u8]) -> Option<RawRecord> {
    if buf.len() < RECORD_SIZE {
        return None;
    }

    let mut word = [0u8; WORD];
    word.copy_from_slice(&buf[0..WORD]);
    let seconds = i64::from(libc::c_long::from_ne_bytes(word));
    word.copy_from_slice(&buf[WORD..2 * WORD]);
    let micros = i64::from(libc::c_long::from_ne_bytes(word));

    let rest = &buf[2 * WORD..RECORD_SIZE];
    Some(RawRecord {
        seconds,
        micros,
        kind: u16::from_ne_bytes([rest[0], rest[1]]),
        code: u16::from_ne_bytes([rest[2], rest[3]]),
        value: i32::from_ne_bytes([rest[4], rest[5], rest[6], rest[7]]),
    })
}

/// Turns a key record into an event. Everything but presses and releases of
/// keys and buttons, including auto-repeat, is dropped.
pub fn classify(record: &RawRecord) -> Option<InputEvent> {
    if record.kind != EV_KEY {
        return None;
    }

    let mouse = MOUSE_BUTTONS.contains(&record.code);
    let action = match (record.value, mouse) {
        (1, false) => InputAction::KeyDown,
        (0, false) => InputAction::KeyUp,
        (1, true) => InputAction::MouseDown,
        (0, true) => InputAction::MouseUp,
        _ => return None,
    };

    Some(InputEvent {
        kind: if mouse {
            InputKind::Mouse
        } else {
            InputKind::Keyboard
        },
        action,
        key_code: record.code,
        timestamp: timestamp(record.seconds, record.micros),
    })
}

fn timestamp(seconds: i64, micros: i64) -> SystemTime {
    let (Ok(seconds), Ok(micros)) = (u64::try_from(seconds), u64::try_from(micros)) else {
        return UNIX_EPOCH;
    };
    Duration::from_secs(seconds)
        .checked_add(Duration::from_micros(micros))
        .and_then(|since| UNIX_EPOCH.checked_add(since))
        .unwrap_or(UNIX_EPOCH)
}

enum Source {
    /// Character devices, polled so a stop can interrupt a pending read.
    Polled(AsyncFd<File>),
    /// Anything epoll refuses, such as regular files.
    Blocking(tokio::fs::File),
}

/// Reads one device until it disconnects, fails or is told to stop.
pub struct EventReader {
    path: PathBuf,
    source: Source,
}

impl EventReader {
    /// Wraps the device for async reads. Must be called from within a tokio
    /// runtime.
    pub fn new(device: Device) -> EventReader {
        let (path, file) = device.into_parts();
        let source = match AsyncFd::try_new(file) {
            Ok(fd) => Source::Polled(fd),
            Err(e) => {
                let (file, err) = e.into_parts();
                debug!(device = ?path, err = %err, "Device cannot be polled, reading on the blocking pool");
                Source::Blocking(tokio::fs::File::from_std(file))
            }
        };
        EventReader { path, source }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Dispatches every key event the device produces, in order, until the
    /// stop signal turns true or the device goes away.
    pub async fn run<F>(mut self, mut stop: watch::Receiver<bool>, dispatch: F)
    where
        F: Fn(InputEvent),
    {
        let mut buf = vec![0u8; RECORD_SIZE * READ_BATCH];
        loop {
            if *stop.borrow() {
                debug!(device = ?self.path, "Reader stopped");
                return;
            }

            let read = tokio::select! {
                changed = stop.changed() => match changed {
                    Ok(()) => continue,
                    Err(_) => return,
                },
                read = self.read(&mut buf) => read,
            };

            let len = match read {
                Ok(0) => {
                    info!(device = ?self.path, "Input device disconnected");
                    return;
                }
                Ok(len) => len,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(device = ?self.path, err = %e, "Error reading input device");
                    return;
                }
            };

            let whole = len - len % RECORD_SIZE;
            for record in buf[..whole].chunks_exact(RECORD_SIZE) {
                if let Some(event) = parse_record(record).as_ref().and_then(classify) {
                    dispatch(event);
                }
            }
            if whole != len {
                info!(device = ?self.path, len, "Short read from input device, treating as disconnected");
                return;
            }
        }
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.source {
            Source::Polled(fd) => loop {
                let mut guard = fd.readable().await?;
                match guard.try_io(|inner| {
                    let mut file = inner.get_ref();
                    file.read(buf)
                }) {
                    Ok(result) => return result,
                    Err(_would_block) => continue,
                }
            },
            Source::Blocking(file) => file.read(buf).await,
        }
    }
}
