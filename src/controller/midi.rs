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
use std::{io, sync::Arc};

use tokio::{
    sync::mpsc::{self, Sender},
    task::JoinHandle,
};
use tracing::{info, span, Instrument, Level};

use super::Event;
use crate::midi::Device;

/// A controller that answers trials from a MIDI keyboard.
pub struct Driver {
    midi_device: Arc<dyn Device>,
}

impl Driver {
    pub fn new(midi_device: Arc<dyn Device>) -> Driver {
        Driver { midi_device }
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        let (midi_events_tx, mut midi_events_rx) = mpsc::channel::<Vec<u8>>(10);
        let device = self.midi_device.clone();
        let span = span!(Level::INFO, "MIDI driver", device = device.name());

        tokio::spawn(
            async move {
                device
                    .watch_events(midi_events_tx)
                    .map_err(|e| io::Error::other(e.to_string()))?;
                info!("MIDI driver started.");

                loop {
                    let raw_event = match midi_events_rx.recv().await {
                        Some(raw_event) => raw_event,
                        None => {
                            info!("MIDI watcher closed.");
                            return Ok(());
                        }
                    };

                    if events_tx.send(Event::Midi(raw_event)).await.is_err() {
                        info!("Controller closed, stopping MIDI watch.");
                        device.stop_watch_events();
                        return Ok(());
                    }
                }
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod test {
    use std::{error::Error, sync::Arc};

    use tokio::sync::mpsc;

    use crate::controller::{Driver as _, Event};
    use crate::midi::{self, Device as _};

    use super::Driver;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_midi_driver() -> Result<(), Box<dyn Error>> {
        let device = midi::test::Device::get("mock-midi");
        let driver = Driver::new(Arc::new(device.clone()));
        let (events_tx, mut events_rx) = mpsc::channel(10);
        let handle = driver.monitor_events(events_tx);

        // Wait for the watcher to be registered.
        crate::testutil::eventually_async(
            || async { device.is_watching() },
            "MIDI watch never started",
        )
        .await;

        device.mock_event(&[0x90, 60, 100]);
        assert_eq!(Some(Event::Midi(vec![0x90, 60, 100])), events_rx.recv().await);
        device.mock_event(&[0x80, 60, 0]);
        assert_eq!(Some(Event::Midi(vec![0x80, 60, 0])), events_rx.recv().await);

        // Closing the watch closes the driver.
        device.stop_watch_events();
        assert!(handle.await?.is_ok());
        assert_eq!(None, events_rx.recv().await);
        Ok(())
    }
}
