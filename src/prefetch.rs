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
//! A bounded queue of prepared trials, refilled in the background.
//!
//! Every configuration change bumps the queue's generation. A fill task that finishes a
//! selection under an older generation drops its result and exits, so the queue only ever
//! holds trials for the current configuration.

use std::{collections::VecDeque, sync::Arc};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, span, Instrument, Level};

use crate::selector::{Trial, TrialSelector};

struct State {
    trials: VecDeque<Trial>,
    generation: u64,
    filling: bool,
    last_taken: Option<u8>,
    selector: Arc<TrialSelector>,
}

impl State {
    /// The note the next selection should avoid.
    fn exclusion_hint(&self) -> Option<u8> {
        self.trials
            .back()
            .map(|trial| trial.target_note())
            .or(self.last_taken)
    }
}

pub struct PrefetchQueue {
    state: Arc<Mutex<State>>,
    capacity: usize,
    filling_tx: Arc<watch::Sender<bool>>,
}

impl PrefetchQueue {
    pub fn new(selector: Arc<TrialSelector>, capacity: usize) -> PrefetchQueue {
        let (filling_tx, _) = watch::channel(false);
        PrefetchQueue {
            state: Arc::new(Mutex::new(State {
                trials: VecDeque::with_capacity(capacity),
                generation: 0,
                filling: false,
                last_taken: None,
                selector,
            })),
            capacity,
            filling_tx: Arc::new(filling_tx),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    pub fn is_filling(&self) -> bool {
        self.state.lock().filling
    }

    pub fn selector(&self) -> Arc<TrialSelector> {
        self.state.lock().selector.clone()
    }

    /// Starts a background fill unless one is already running or the queue is full.
    pub fn ensure_filled(&self) {
        let generation = {
            let mut state = self.state.lock();
            if state.filling || state.trials.len() >= self.capacity {
                return;
            }
            state.filling = true;
            state.generation
        };
        self.filling_tx.send_replace(true);

        let state = self.state.clone();
        let filling_tx = self.filling_tx.clone();
        let capacity = self.capacity;
        let span = span!(Level::INFO, "prefetch", generation);
        tokio::spawn(
            async move {
                fill(state, filling_tx, capacity, generation).await;
            }
            .instrument(span),
        );
    }

    /// Pops the oldest trial. If the queue is empty while a fill is running, waits for the
    /// fill to finish first.
    pub async fn dequeue(&self) -> Option<Trial> {
        if let Some(trial) = self.pop() {
            return Some(trial);
        }
        if !self.is_filling() {
            return None;
        }

        let mut filling_rx = self.filling_tx.subscribe();
        let _ = filling_rx.wait_for(|filling| !*filling).await;
        self.pop()
    }

    /// Takes the next trial, selecting one directly if nothing is queued. A direct
    /// selection that finishes after the queue was cleared is dropped.
    pub async fn take(&self) -> Option<Trial> {
        if let Some(trial) = self.dequeue().await {
            return Some(trial);
        }

        let (selector, excluded, generation) = {
            let state = self.state.lock();
            (
                state.selector.clone(),
                state.exclusion_hint(),
                state.generation,
            )
        };
        let trial = selector.select(excluded).await?;

        let mut state = self.state.lock();
        if state.generation != generation {
            debug!("Discarding trial selected for a previous configuration.");
            return None;
        }
        state.last_taken = Some(trial.target_note());
        Some(trial)
    }

    /// Discards every queued trial and switches to the given selector. Fills in flight
    /// for the old configuration drop their results.
    pub fn clear(&self, selector: Arc<TrialSelector>) {
        {
            let mut state = self.state.lock();
            state.generation += 1;
            state.trials.clear();
            state.filling = false;
            state.selector = selector;
        }
        self.filling_tx.send_replace(false);
    }

    fn pop(&self) -> Option<Trial> {
        let mut state = self.state.lock();
        let trial = state.trials.pop_front()?;
        state.last_taken = Some(trial.target_note());
        Some(trial)
    }
}

async fn fill(
    state: Arc<Mutex<State>>,
    filling_tx: Arc<watch::Sender<bool>>,
    capacity: usize,
    generation: u64,
) {
    loop {
        let (selector, excluded) = {
            let state = state.lock();
            if state.generation != generation {
                return;
            }
            if state.trials.len() >= capacity {
                break;
            }
            (state.selector.clone(), state.exclusion_hint())
        };

        let trial = selector.select(excluded).await;

        let mut state = state.lock();
        if state.generation != generation {
            debug!("Queue cleared during selection, dropping trial.");
            return;
        }
        match trial {
            Some(trial) => state.trials.push_back(trial),
            None => {
                debug!("No trial available, stopping fill early.");
                break;
            }
        }
    }

    let mut state = state.lock();
    if state.generation == generation {
        state.filling = false;
        debug!(queued = state.trials.len(), "Fill finished.");
        drop(state);
        filling_tx.send_replace(false);
    }
}
