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
//! Reads raw key and button events from the kernel's event devices.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::SystemTime;

mod discovery;
mod monitor;
mod reader;

pub use discovery::{discover, Device, Discovery};
pub use monitor::{EventHandler, InputMonitor};
pub use reader::{classify, parse_record, EventReader, RawRecord, RECORD_SIZE};

/// Shown whenever no input device could be opened.
pub const PERMISSION_REMEDIATION: &str = "add your user to the 'input' group: \
sudo usermod -a -G input $USER, install a udev rule granting the group access: \
KERNEL==\"event*\", SUBSYSTEM==\"input\", MODE=\"0660\", GROUP=\"input\" \
(then run udevadm control --reload-rules && udevadm trigger), and log in again";

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("No input device in {} can be read; {}", .dir.display(), PERMISSION_REMEDIATION)]
    Permission { dir: PathBuf },

    #[error("Input monitor is already running")]
    AlreadyRunning,

    #[error("Unable to read input devices in {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Which kind of device produced an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputKind {
    Keyboard,
    Mouse,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputAction {
    KeyDown,
    KeyUp,
    MouseDown,
    MouseUp,
}

impl InputAction {
    /// Whether the action is a press rather than a release.
    pub fn is_down(&self) -> bool {
        matches!(self, InputAction::KeyDown | InputAction::MouseDown)
    }

    pub fn kind(&self) -> InputKind {
        match self {
            InputAction::KeyDown | InputAction::KeyUp => InputKind::Keyboard,
            InputAction::MouseDown | InputAction::MouseUp => InputKind::Mouse,
        }
    }
}

impl fmt::Display for InputAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InputAction::KeyDown => "key down",
            InputAction::KeyUp => "key up",
            InputAction::MouseDown => "mouse down",
            InputAction::MouseUp => "mouse up",
        })
    }
}

/// A key or button press or release.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputEvent {
    pub kind: InputKind,
    pub action: InputAction,
    pub key_code: u16,
    /// When the kernel recorded the event.
    pub timestamp: SystemTime,
}
