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
//! Named, cancellable one-shot timers. Arming a kind that is already armed replaces it.

use std::{collections::HashMap, fmt::Debug, future::Future, hash::Hash, time::Duration};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

pub struct Scheduler<K>
where
    K: Copy + Eq + Hash + Debug + Send + 'static,
{
    timers: Mutex<HashMap<K, JoinHandle<()>>>,
}

impl<K> Scheduler<K>
where
    K: Copy + Eq + Hash + Debug + Send + 'static,
{
    pub fn new() -> Scheduler<K> {
        Scheduler {
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Runs the future after the delay, cancelling any pending timer of the same kind.
    /// Must be called from within a tokio runtime.
    pub fn arm<F>(&self, kind: K, delay: Duration, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            future.await;
        });

        if let Some(previous) = self.timers.lock().insert(kind, handle) {
            abort_unless_current(kind, previous);
        }
    }

    /// Cancels the pending timer of the given kind, if any.
    pub fn cancel(&self, kind: K) {
        if let Some(previous) = self.timers.lock().remove(&kind) {
            abort_unless_current(kind, previous);
        }
    }

    pub fn cancel_all(&self) {
        let timers: Vec<(K, JoinHandle<()>)> = self.timers.lock().drain().collect();
        for (kind, handle) in timers {
            abort_unless_current(kind, handle);
        }
    }

    /// Returns true if a timer of this kind is pending.
    pub fn is_armed(&self, kind: K) -> bool {
        self.timers
            .lock()
            .get(&kind)
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl<K> Default for Scheduler<K>
where
    K: Copy + Eq + Hash + Debug + Send + 'static,
{
    fn default() -> Self {
        Scheduler::new()
    }
}

impl<K> Drop for Scheduler<K>
where
    K: Copy + Eq + Hash + Debug + Send + 'static,
{
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// A timer task may re-arm or cancel its own kind; it must not abort itself mid-run.
fn abort_unless_current<K: Debug>(kind: K, handle: JoinHandle<()>) {
    if tokio::task::try_id() == Some(handle.id()) {
        return;
    }
    if !handle.is_finished() {
        debug!(timer = ?kind, "Cancelling timer.");
        handle.abort();
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;
    use crate::testutil::eventually_async;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    enum Kind {
        First,
        Second,
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fires_after_delay() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        {
            let count = count.clone();
            scheduler.arm(Kind::First, Duration::from_millis(20), async move {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert!(scheduler.is_armed(Kind::First));
        assert_eq!(0, count.load(Ordering::SeqCst));

        eventually_async(
            || async { count.load(Ordering::SeqCst) == 1 },
            "Timer never fired",
        )
        .await;
        eventually_async(
            || async { !scheduler.is_armed(Kind::First) },
            "Timer still armed",
        )
        .await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rearm_replaces() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let count = count.clone();
            scheduler.arm(Kind::First, Duration::from_millis(30), async move {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(1, count.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancel() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        for kind in [Kind::First, Kind::Second] {
            let count = count.clone();
            scheduler.arm(kind, Duration::from_millis(30), async move {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        scheduler.cancel(Kind::First);
        assert!(!scheduler.is_armed(Kind::First));
        assert!(scheduler.is_armed(Kind::Second));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(1, count.load(Ordering::SeqCst));

        scheduler.arm(Kind::Second, Duration::from_millis(30), {
            let count = count.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });
        scheduler.cancel_all();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(1, count.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_timer_can_rearm_itself() {
        let scheduler = Arc::new(Scheduler::new());
        let count = Arc::new(AtomicUsize::new(0));

        fn arm_repeating(scheduler: Arc<Scheduler<Kind>>, count: Arc<AtomicUsize>) {
            let weak = Arc::downgrade(&scheduler);
            scheduler.arm(Kind::First, Duration::from_millis(10), async move {
                if count.fetch_add(1, Ordering::SeqCst) < 2 {
                    if let Some(scheduler) = weak.upgrade() {
                        arm_repeating(scheduler, count);
                    }
                }
            });
        }

        arm_repeating(scheduler.clone(), count.clone());
        eventually_async(
            || async { count.load(Ordering::SeqCst) == 3 },
            "Timer did not re-arm",
        )
        .await;
    }
}
