//! Ordered task queue: start work at enqueue time, collect outcomes in enqueue order.

use std::future::Future;
use std::panic;

use tokio::task::{JoinError, JoinHandle};

use super::capacity::CapacityLimiter;
use crate::error::FunnelError;
use crate::utils::log_debug;

/// Queue over one [`CapacityLimiter`].
///
/// Each instance covers one enqueue...`dequeue_all` cycle; `dequeue_all`
/// consumes it.
pub struct OrderedTaskQueue<T, E> {
    limiter: CapacityLimiter,
    handles: Vec<JoinHandle<Result<T, E>>>,
}

enum Failure<E> {
    Task(E),
    Join(JoinError),
}

impl<T, E> OrderedTaskQueue<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Create a queue with its own limiter. Zero capacity is a configuration error.
    pub fn new(capacity: usize) -> Result<Self, FunnelError> {
        Ok(Self::with_limiter(CapacityLimiter::new(capacity)?))
    }

    /// Create a queue that draws slots from an existing limiter.
    pub fn with_limiter(limiter: CapacityLimiter) -> Self {
        Self {
            limiter,
            handles: Vec::new(),
        }
    }

    /// Submit a task producer. It is handed to the limiter immediately and
    /// may start running before this returns control to the runtime.
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue<F, Fut>(&mut self, producer: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let task = self.limiter.run(producer);
        self.handles.push(tokio::spawn(task));
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn limiter(&self) -> &CapacityLimiter {
        &self.limiter
    }

    /// Wait for every enqueued task to settle, then return all results in
    /// enqueue order, or the error of the earliest-enqueued failed task.
    ///
    /// Nothing is cancelled when a task fails. A task that panicked counts as
    /// a failure at its position; if it is the earliest one, the panic is
    /// resumed here.
    pub async fn dequeue_all(self) -> Result<Vec<T>, E> {
        let total = self.handles.len();
        let mut results = Vec::with_capacity(total);
        let mut first_failure: Option<(usize, Failure<E>)> = None;

        for (index, handle) in self.handles.into_iter().enumerate() {
            let outcome = handle.await;
            if first_failure.is_some() {
                continue;
            }
            match outcome {
                Ok(Ok(value)) => results.push(value),
                Ok(Err(err)) => first_failure = Some((index, Failure::Task(err))),
                Err(join_err) => first_failure = Some((index, Failure::Join(join_err))),
            }
        }

        let Some((index, failure)) = first_failure else {
            log_debug(&format!("dequeue_all: {} task(s) succeeded", total));
            return Ok(results);
        };
        log_debug(&format!(
            "dequeue_all: {} task(s) settled, earliest failure at #{}",
            total,
            index + 1
        ));
        match failure {
            Failure::Task(err) => Err(err),
            Failure::Join(join_err) => match join_err.try_into_panic() {
                Ok(payload) => panic::resume_unwind(payload),
                // Only reachable while the runtime is shutting down.
                Err(join_err) => panic!("queued task #{} did not finish: {}", index + 1, join_err),
            },
        }
    }
}

impl<T, E> std::fmt::Debug for OrderedTaskQueue<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderedTaskQueue")
            .field("limiter", &self.limiter)
            .field("enqueued", &self.handles.len())
            .finish()
    }
}
