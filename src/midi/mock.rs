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
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Barrier,
    },
};

use parking_lot::Mutex;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, warn};

/// A mock device. Events are injected with `mock_event`.
#[derive(Clone)]
pub struct Device {
    name: String,
    barrier: Arc<Barrier>,
    closed: Arc<AtomicBool>,
    event: Arc<Mutex<Vec<u8>>>,
    event_thread: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            closed: Arc::new(AtomicBool::new(false)),
            barrier: Arc::new(Barrier::new(2)),
            event: Arc::new(Mutex::new(Vec::new())),
            event_thread: Arc::new(Mutex::new(None)),
        }
    }

    #[cfg(test)]
    /// Sends the mock event through to the sender.
    pub fn mock_event(&self, event: &[u8]) {
        *self.event.lock() = event.to_vec();
        // Wait until the thread goes to receive the event.
        self.barrier.wait();
        // Wait until the thread has sent it.
        self.barrier.wait();
    }

    #[cfg(test)]
    /// True once a watcher thread is running.
    pub fn is_watching(&self) -> bool {
        self.event_thread.lock().is_some()
    }
}

impl super::Device for Device {
    fn name(&self) -> String {
        self.name.clone()
    }

    /// Watches MIDI input for events and sends them to the given sender.
    fn watch_events(&self, sender: Sender<Vec<u8>>) -> Result<(), Box<dyn Error>> {
        let mut event_thread = self.event_thread.lock();
        if event_thread.is_some() {
            return Err("Already watching events.".into());
        }
        info!(device = self.name, "Watching mock MIDI events.");

        let barrier = self.barrier.clone();
        let event = self.event.clone();
        let closed = self.closed.clone();
        *event_thread = Some(tokio::task::spawn_blocking(move || loop {
            barrier.wait();

            if closed.load(Ordering::Relaxed) {
                return;
            }
            let event = event.lock().clone();
            if let Err(e) = sender.blocking_send(event) {
                warn!(err = ?e, "Error sending mock MIDI event.");
            }
            barrier.wait();
        }));

        Ok(())
    }

    /// Stops watching events.
    fn stop_watch_events(&self) {
        self.closed.store(true, Ordering::Relaxed);
        // Wait for watcher thread to move to next loop iteration.
        self.barrier.wait();
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<Device>, Box<dyn Error>> {
        Ok(Arc::new(self.clone()))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
