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
use std::path::{Path, PathBuf};
use std::time::Duration;

use duration_string::DurationString;
use serde::{Deserialize, Serialize};

use super::error::ConfigError;

const DEFAULT_DEVICE_DIR: &str = "/dev/input";
const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Where input devices live and how long to wait for their readers to stop.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Input {
    device_dir: Option<PathBuf>,
    stop_timeout: Option<String>,
}

impl Input {
    pub fn new(device_dir: &Path) -> Input {
        Input {
            device_dir: Some(device_dir.to_path_buf()),
            stop_timeout: None,
        }
    }

    /// The directory holding the event devices (default: /dev/input).
    pub fn device_dir(&self) -> PathBuf {
        self.device_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DEVICE_DIR))
    }

    /// How long stopping the monitor may take (default: 2s).
    pub fn stop_timeout(&self) -> Result<Duration, ConfigError> {
        match &self.stop_timeout {
            Some(timeout) => Ok(DurationString::from_string(timeout.clone())
                .map_err(|e| ConfigError::InvalidValue {
                    key: "input.stop_timeout",
                    reason: e.to_string(),
                })?
                .into()),
            None => Ok(DEFAULT_STOP_TIMEOUT),
        }
    }
}
