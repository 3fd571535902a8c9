//! Capacity limiter: at most `capacity` tasks in flight, waiters served strictly FIFO.
//!
//! The slot decision happens when `run` is called, not when the returned future is
//! first polled, so grant order is `run()` call order no matter how the runtime
//! schedules the futures. A finished task hands its slot straight to the oldest
//! waiter through a oneshot channel; the count only drops when nobody is waiting.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::error::{utils::config_error, FunnelError};
use crate::utils::log_debug;

struct SlotState {
    active: usize,
    waiters: VecDeque<oneshot::Sender<()>>,
}

struct Slots {
    capacity: usize,
    state: Mutex<SlotState>,
}

impl Slots {
    // The lock is never held across an await or user code, so a poisoned
    // state is still consistent.
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(self: &Arc<Self>) -> Entry {
        let mut state = self.lock();
        if state.active < self.capacity {
            state.active += 1;
            return Entry::Granted(SlotGuard {
                slots: Arc::clone(self),
            });
        }
        let (tx, rx) = oneshot::channel();
        state.waiters.push_back(tx);
        let queued = state.waiters.len();
        drop(state);
        log_debug(&format!(
            "capacity {} reached, waiting for a slot ({} queued)",
            self.capacity, queued
        ));
        Entry::Waiting(Waiter {
            slots: Arc::clone(self),
            rx: Some(rx),
        })
    }

    fn release(&self) {
        let mut state = self.lock();
        // A failed send means that waiter gave up; try the next one.
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.send(()).is_ok() {
                return;
            }
        }
        state.active = state.active.saturating_sub(1);
    }
}

enum Entry {
    Granted(SlotGuard),
    Waiting(Waiter),
}

impl Entry {
    async fn acquired(self) -> SlotGuard {
        match self {
            Entry::Granted(slot) => slot,
            Entry::Waiting(waiter) => waiter.granted().await,
        }
    }
}

/// A queued request for a slot.
struct Waiter {
    slots: Arc<Slots>,
    rx: Option<oneshot::Receiver<()>>,
}

impl Waiter {
    async fn granted(mut self) -> SlotGuard {
        if let Some(rx) = self.rx.as_mut() {
            // Senders are only dropped after a failed send, which needs this
            // receiver closed, so the wait always ends in a grant.
            let _ = rx.await;
        }
        self.rx = None;
        SlotGuard {
            slots: Arc::clone(&self.slots),
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        let Some(mut rx) = self.rx.take() else {
            return;
        };
        rx.close();
        // Handed a slot between the send and now: pass it on.
        if rx.try_recv().is_ok() {
            self.slots.release();
        }
    }
}

/// Holds one slot; releasing happens on every exit path, unwinding included.
struct SlotGuard {
    slots: Arc<Slots>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.slots.release();
    }
}

/// Bounds how many tasks run at once.
///
/// Cloning gives another handle to the same slots; separately constructed
/// limiters never share state.
#[derive(Clone)]
pub struct CapacityLimiter {
    slots: Arc<Slots>,
}

impl CapacityLimiter {
    /// Create a limiter. A capacity of zero is a configuration error.
    pub fn new(capacity: usize) -> Result<Self, FunnelError> {
        NonZeroUsize::new(capacity)
            .map(Self::with_capacity)
            .ok_or_else(|| {
                config_error(
                    "capacity_limiter",
                    Some("capacity"),
                    &format!("capacity must be a positive integer, got {}", capacity),
                )
            })
    }

    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            slots: Arc::new(Slots {
                capacity: capacity.get(),
                state: Mutex::new(SlotState {
                    active: 0,
                    waiters: VecDeque::new(),
                }),
            }),
        }
    }

    /// Run `task` once a slot is free and resolve with its output unchanged.
    ///
    /// The slot is claimed (or the caller queued) right here, before the
    /// returned future is polled. The slot is given back when the task
    /// finishes, fails, panics, or the future is dropped.
    pub fn run<F, Fut>(&self, task: F) -> impl Future<Output = Fut::Output>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        let entry = self.slots.enter();
        async move {
            let _slot = entry.acquired().await;
            task().await
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.capacity
    }

    /// Slots currently held by running (or just-granted) tasks.
    pub fn active(&self) -> usize {
        self.slots.lock().active
    }

    /// Requests still waiting for a slot.
    pub fn waiting(&self) -> usize {
        self.slots
            .lock()
            .waiters
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }
}

impl fmt::Debug for CapacityLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.slots.lock();
        f.debug_struct("CapacityLimiter")
            .field("capacity", &self.slots.capacity)
            .field("active", &state.active)
            .field("waiting", &state.waiters.len())
            .finish()
    }
}
