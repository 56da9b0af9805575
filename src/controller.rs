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
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{error, info, span, Instrument, Level};

use crate::session::Session;

pub mod keyboard;
pub mod midi;

/// Controller events that will trigger behavior in the session.
#[derive(Debug, PartialEq, Eq)]
pub enum Event {
    /// Starts the first trial. Ignored unless the session is idle.
    Start,

    /// Answers the current trial with a chroma label or "out".
    Answer(String),

    /// A raw MIDI message. Note-ons answer the current trial.
    Midi(Vec<u8>),

    /// Plays the current trial again.
    Replay,

    /// Switches to the configured chroma set with the given index.
    SelectSet(usize),

    /// Switches to the given level.
    Level(usize),

    /// Turns the reduced note range on or off.
    ReducedRange(bool),

    /// Turns the two-note exercise on or off.
    Special(bool),

    /// Restricts answers to the named set, "Auto" for the active set, or lifts the
    /// restriction.
    AnswerSet(Option<String>),

    /// Prints the stats for the active exercise type.
    Stats,

    /// Stops the current trial.
    Stop,

    /// Stops everything and closes the controller.
    Quit,
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Drives a session from one or more input drivers.
pub struct Controller {
    handle: JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller with the given drivers.
    pub fn new(session: Arc<Session>, drivers: Vec<Arc<dyn Driver>>) -> Controller {
        let span = span!(Level::INFO, "controller");
        Controller {
            handle: tokio::spawn(Controller::trigger_events(session, drivers).instrument(span)),
        }
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    /// Applies events from every driver to the session until a quit or until every
    /// driver has closed.
    async fn trigger_events(session: Arc<Session>, drivers: Vec<Arc<dyn Driver>>) {
        let (events_tx, mut events_rx) = mpsc::channel(10);
        let join_handles: Vec<JoinHandle<Result<(), io::Error>>> = drivers
            .iter()
            .map(|driver| driver.monitor_events(events_tx.clone()))
            .collect();
        drop(events_tx);

        info!(
            drivers = join_handles.len(),
            chroma_set = session.status().chroma_set,
            "Controller started."
        );

        while let Some(event) = events_rx.recv().await {
            info!(event = format!("{:?}", event), "Received event.");

            let result = match event {
                Event::Start => {
                    session.start().await;
                    Ok(())
                }
                Event::Answer(label) => {
                    session.submit_label(&label);
                    Ok(())
                }
                Event::Midi(raw) => {
                    session.submit_midi(&raw);
                    Ok(())
                }
                Event::Replay => {
                    session.replay();
                    Ok(())
                }
                Event::SelectSet(index) => session.select_chroma_set(index),
                Event::Level(level) => session.set_level(level),
                Event::ReducedRange(enabled) => {
                    session.set_reduced_range(enabled);
                    Ok(())
                }
                Event::Special(enabled) => {
                    session.set_special_exercise(enabled);
                    Ok(())
                }
                Event::AnswerSet(answer_set) => session.set_answer_set(answer_set.as_deref()),
                Event::Stats => {
                    println!("{}", session.stats());
                    Ok(())
                }
                Event::Stop => {
                    session.stop();
                    Ok(())
                }
                Event::Quit => {
                    info!("Quit requested.");
                    break;
                }
            };
            if let Err(e) = result {
                error!(err = %e, "Error talking to session.");
            }
        }

        info!("Controller closing.");
        session.shutdown();
        for join_handle in join_handles {
            if join_handle.is_finished() {
                match join_handle.await {
                    Ok(Err(e)) => error!("Event monitor failed: {}", e),
                    Err(e) => error!("Error waiting for event monitor to stop: {}", e),
                    Ok(Ok(())) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::{
        error::Error,
        io,
        sync::{Arc, Barrier, Mutex},
        time::Duration,
    };

    use tokio::{sync::mpsc::Sender, task::JoinHandle};

    use crate::{
        audio::AudioMixer,
        samples::{LoadedSample, MemoryStore},
        selector::{Instrument, NoteRange},
        session::{Phase, Session, SessionSettings},
        storage::LocalStorage,
        testutil::eventually,
    };

    use super::{Driver, Event};

    enum TestEvent {
        Unset,
        Send(Event),
        Close,
    }

    struct TestDriver {
        current_event: Arc<Mutex<TestEvent>>,
        barrier: Arc<Barrier>,
    }

    impl TestDriver {
        /// Creates a new test driver which is explicitly controlled by the next_event function.
        fn new() -> TestDriver {
            TestDriver {
                current_event: Arc::new(Mutex::new(TestEvent::Unset)),
                barrier: Arc::new(Barrier::new(2)),
            }
        }

        /// Signals the next event to the monitor thread.
        fn next_event(&self, event: TestEvent) {
            {
                let mut current_event = self.current_event.lock().expect("failed to get lock");
                *current_event = event;
            }
            // Wait until the thread goes to receive the event.
            self.barrier.wait();
            // Wait until the thread has taken the event.
            self.barrier.wait();
        }
    }

    impl Driver for TestDriver {
        fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
            let barrier = self.barrier.clone();
            let current_event = self.current_event.clone();
            tokio::task::spawn_blocking(move || loop {
                // Wait for next event to set the current event.
                barrier.wait();
                let event = std::mem::replace(
                    &mut *current_event.lock().expect("failed to get lock"),
                    TestEvent::Unset,
                );
                // Let next event know that we got the event.
                barrier.wait();
                match event {
                    TestEvent::Unset => panic!("current event should not be unset"),
                    TestEvent::Send(event) => assert!(events_tx.blocking_send(event).is_ok()),
                    TestEvent::Close => return Ok(()),
                }
            })
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_controller() -> Result<(), Box<dyn Error>> {
        let store = Arc::new(MemoryStore::new().with_instrument(
            "Piano",
            36,
            96,
            &LoadedSample::new(vec![0.25; 4410], 1, 44100),
        ));
        let session = Session::new(
            SessionSettings {
                chroma_set: 0,
                instruments: vec![Instrument::new("Piano", NoteRange::new(36, 96))],
                correct_feedback: Duration::from_secs(10),
                incorrect_feedback: Duration::from_secs(10),
                seed: Some(5),
                ..Default::default()
            },
            store,
            AudioMixer::new(1, 44100),
            LocalStorage::ephemeral(),
        )?;
        let driver = Arc::new(TestDriver::new());
        let mut controller = super::Controller::new(session.clone(), vec![driver.clone()]);

        driver.next_event(TestEvent::Send(Event::Start));
        eventually(
            || session.phase() == Phase::AwaitingGuess,
            "Trial never started",
        );

        // Any chroma is judged, right or wrong.
        driver.next_event(TestEvent::Send(Event::Answer("C".to_string())));
        eventually(|| session.phase() == Phase::Answered, "Answer never judged");
        assert_eq!(1, session.stats().total_trials);

        driver.next_event(TestEvent::Send(Event::Stop));
        eventually(|| session.phase() == Phase::Idle, "Session never stopped");

        driver.next_event(TestEvent::Send(Event::Level(2)));
        eventually(
            || session.status().chroma_set.starts_with("Level 2"),
            "Level never changed",
        );

        driver.next_event(TestEvent::Send(Event::ReducedRange(true)));
        eventually(|| session.status().reduced_range, "Range never reduced");

        driver.next_event(TestEvent::Send(Event::Start));
        eventually(
            || session.phase() == Phase::AwaitingGuess,
            "Trial never restarted",
        );
        // Level 2 only offers F and E.
        driver.next_event(TestEvent::Send(Event::Midi(vec![0x90, 65, 100])));
        eventually(|| session.phase() == Phase::Answered, "MIDI answer never judged");
        assert_eq!(2, session.stats().total_trials);

        driver.next_event(TestEvent::Close);
        assert!(
            controller.join().await.is_ok(),
            "Error waiting for controller",
        );
        assert_eq!(Phase::Idle, session.phase());

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_quit_closes_controller() -> Result<(), Box<dyn Error>> {
        let session = Session::new(
            SessionSettings::default(),
            Arc::new(MemoryStore::new()),
            AudioMixer::new(1, 44100),
            LocalStorage::ephemeral(),
        )?;
        let driver = Arc::new(TestDriver::new());
        let mut controller = super::Controller::new(session, vec![driver.clone()]);

        driver.next_event(TestEvent::Send(Event::Quit));
        assert!(controller.join().await.is_ok());

        // The driver is still waiting; let its thread finish.
        driver.next_event(TestEvent::Close);
        Ok(())
    }
}
