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
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, span, warn, Instrument, Level};

use super::discovery::discover;
use super::reader::EventReader;
use super::{InputEvent, MonitorError};

/// Receives every event from every device.
pub type EventHandler = Arc<dyn Fn(InputEvent) + Send + Sync>;

struct Running {
    stop: watch::Sender<bool>,
    readers: Vec<JoinHandle<()>>,
}

/// Counts a reader task as live until it is dropped.
struct LiveReader(Arc<AtomicUsize>);

impl LiveReader {
    fn new(count: Arc<AtomicUsize>) -> LiveReader {
        count.fetch_add(1, Ordering::SeqCst);
        LiveReader(count)
    }
}

impl Drop for LiveReader {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Runs one reader per input device and fans their events out to the
/// registered handlers. Handlers run on the reader tasks, so events from one
/// device arrive in order while events from different devices may interleave.
pub struct InputMonitor {
    device_dir: PathBuf,
    handlers: Arc<RwLock<Vec<EventHandler>>>,
    running: Mutex<Option<Running>>,
    live: Arc<AtomicUsize>,
}

impl InputMonitor {
    pub fn new(device_dir: &Path) -> InputMonitor {
        InputMonitor {
            device_dir: device_dir.to_path_buf(),
            handlers: Arc::new(RwLock::new(Vec::new())),
            running: Mutex::new(None),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Subscribes a handler to every later event.
    pub fn on_input_event<F>(&self, handler: F)
    where
        F: Fn(InputEvent) + Send + Sync + 'static,
    {
        self.handlers.write().push(Arc::new(handler));
    }

    /// Opens every readable device and starts reading them. Returns the
    /// number of readers. Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<usize, MonitorError> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(MonitorError::AlreadyRunning);
        }

        let discovery = discover(&self.device_dir)?;
        if discovery.accessible.is_empty() {
            return Err(MonitorError::Permission {
                dir: self.device_dir.clone(),
            });
        }

        let (stop, stop_rx) = watch::channel(false);
        let readers: Vec<JoinHandle<()>> = discovery
            .accessible
            .into_iter()
            .map(|device| {
                let reader = EventReader::new(device);
                let span = span!(Level::INFO, "input reader", device = ?reader.path());
                let live = LiveReader::new(self.live.clone());
                let handlers = self.handlers.clone();
                let stop_rx = stop_rx.clone();
                tokio::spawn(
                    async move {
                        let _live = live;
                        reader
                            .run(stop_rx, move |event| {
                                // Snapshot so a handler may subscribe others.
                                let handlers = handlers.read().clone();
                                for handler in handlers.iter() {
                                    handler(event);
                                }
                            })
                            .await;
                    }
                    .instrument(span),
                )
            })
            .collect();

        info!(
            dir = ?self.device_dir,
            readers = readers.len(),
            skipped = discovery.inaccessible.len(),
            "Input monitor started"
        );
        let count = readers.len();
        *running = Some(Running { stop, readers });
        Ok(count)
    }

    /// Signals every reader and waits for all of them to exit.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };

        if running.stop.send(true).is_err() {
            debug!("Every input reader had already exited");
        }
        for reader in running.readers {
            if let Err(e) = reader.await {
                warn!(err = %e, "Input reader task failed");
            }
        }
        info!("Input monitor stopped");
    }

    /// Whether the monitor has been started and not stopped since.
    pub fn is_monitoring(&self) -> bool {
        self.running.lock().is_some()
    }

    /// The number of readers still reading their device.
    pub fn active_readers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl Drop for InputMonitor {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            let _ = running.stop.send(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs::OpenOptions;
    use std::os::unix::fs::symlink;
    use std::time::Duration;

    use super::*;
    use crate::input::InputAction;
    use crate::testutil::{eventually_async, make_fifo, write_key_records};

    fn collect(monitor: &InputMonitor) -> Arc<Mutex<Vec<InputEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        monitor.on_input_event(move |event| sink.lock().push(event));
        events
    }

    #[tokio::test]
    async fn test_monitor_aggregates_devices() {
        let dir = tempfile::tempdir().unwrap();
        write_key_records(&dir.path().join("event0"), &[(30, 1), (30, 2), (30, 0)]).unwrap();
        write_key_records(&dir.path().join("event1"), &[(0x110, 1), (0x110, 0)]).unwrap();
        symlink(dir.path().join("gone"), dir.path().join("event2")).unwrap();

        let monitor = InputMonitor::new(dir.path());
        let events = collect(&monitor);
        let second = Arc::new(AtomicUsize::new(0));
        let counter = second.clone();
        monitor.on_input_event(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(monitor.start().unwrap(), 2);
        assert!(monitor.is_monitoring());

        eventually_async(
            || {
                let events = events.clone();
                async move { events.lock().len() == 4 }
            },
            "Monitor never delivered every event",
        )
        .await;
        assert_eq!(second.load(Ordering::SeqCst), 4);

        let keyboard: Vec<InputAction> = events
            .lock()
            .iter()
            .filter(|event| event.key_code == 30)
            .map(|event| event.action)
            .collect();
        assert_eq!(keyboard, vec![InputAction::KeyDown, InputAction::KeyUp]);

        // Both files are exhausted, so the readers end on their own.
        eventually_async(
            || async { monitor.active_readers() == 0 },
            "Readers never finished",
        )
        .await;

        monitor.stop().await;
        assert!(!monitor.is_monitoring());
    }

    #[tokio::test]
    async fn test_monitor_no_accessible_devices() {
        let dir = tempfile::tempdir().unwrap();
        symlink(dir.path().join("gone"), dir.path().join("event0")).unwrap();

        let monitor = InputMonitor::new(dir.path());
        let err = monitor.start().unwrap_err();
        assert!(matches!(err, MonitorError::Permission { .. }));
        assert!(err.to_string().contains("usermod -a -G input"));
        assert!(!monitor.is_monitoring());

        let empty = tempfile::tempdir().unwrap();
        assert!(matches!(
            InputMonitor::new(empty.path()).start(),
            Err(MonitorError::Permission { .. })
        ));
        assert!(matches!(
            InputMonitor::new(&empty.path().join("missing")).start(),
            Err(MonitorError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn test_monitor_stop_waits_for_readers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("event0");
        make_fifo(&path).unwrap();

        let monitor = InputMonitor::new(dir.path());
        assert_eq!(monitor.start().unwrap(), 1);
        // Held open so the reader blocks rather than seeing EOF.
        let _writer = OpenOptions::new().write(true).open(&path).unwrap();
        assert!(matches!(monitor.start(), Err(MonitorError::AlreadyRunning)));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(monitor.active_readers(), 1);

        tokio::time::timeout(Duration::from_secs(2), monitor.stop())
            .await
            .expect("monitor did not stop");
        assert_eq!(monitor.active_readers(), 0);
        assert!(!monitor.is_monitoring());

        // A stopped monitor can be started again.
        assert_eq!(monitor.start().unwrap(), 1);
        monitor.stop().await;
    }
}
