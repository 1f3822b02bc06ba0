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
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::MonitorError;

/// An event device opened for reading.
#[derive(Debug)]
pub struct Device {
    path: PathBuf,
    file: File,
}

impl Device {
    /// Opens the device read-only and non-blocking.
    pub fn open(path: &Path) -> io::Result<Device> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)?;
        Ok(Device {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(super) fn into_parts(self) -> (PathBuf, File) {
        (self.path, self.file)
    }
}

/// The outcome of probing a device directory.
#[derive(Debug, Default)]
pub struct Discovery {
    pub accessible: Vec<Device>,
    pub inaccessible: Vec<(PathBuf, io::Error)>,
}

/// Opens every `event*` entry of the directory, in name order.
pub fn discover(dir: &Path) -> Result<Discovery, MonitorError> {
    let io_error = |source| MonitorError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let entry = entry.map_err(io_error)?;
        if entry.file_name().to_string_lossy().starts_with("event") {
            paths.push(entry.path());
        }
    }
    paths.sort();

    let mut discovery = Discovery::default();
    for path in paths {
        match Device::open(&path) {
            Ok(device) => {
                debug!(device = ?path, "Opened input device");
                discovery.accessible.push(device);
            }
            Err(e) => {
                warn!(device = ?path, err = %e, "Cannot open input device");
                discovery.inaccessible.push((path, e));
            }
        }
    }

    info!(
        dir = ?dir,
        accessible = discovery.accessible.len(),
        inaccessible = discovery.inaccessible.len(),
        "Discovered input devices"
    );
    Ok(discovery)
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::symlink;

    use super::*;

    #[test]
    fn test_discover_skips_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("event1"), b"").unwrap();
        fs::write(dir.path().join("event0"), b"").unwrap();
        symlink(dir.path().join("gone"), dir.path().join("event2")).unwrap();
        fs::write(dir.path().join("mouse0"), b"").unwrap();

        let discovery = discover(dir.path()).unwrap();
        let accessible: Vec<PathBuf> = discovery
            .accessible
            .iter()
            .map(|device| device.path().to_path_buf())
            .collect();
        assert_eq!(
            accessible,
            vec![dir.path().join("event0"), dir.path().join("event1")]
        );
        assert_eq!(discovery.inaccessible.len(), 1);
        assert_eq!(discovery.inaccessible[0].0, dir.path().join("event2"));
        assert_eq!(discovery.inaccessible[0].1.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_discover_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            discover(&dir.path().join("input")),
            Err(MonitorError::Io { .. })
        ));
    }
}
