//! Bounded-concurrency map over a list of payloads.

use std::future::Future;
use std::sync::Arc;

use super::ordered::OrderedTaskQueue;
use crate::error::FunnelError;

/// Map every payload through `map_fn` with at most `concurrency` calls in flight.
///
/// Results come back in payload order. If any mapping fails, every payload is
/// still attempted and the error from the lowest-indexed failure is returned.
/// A zero `concurrency` fails with a configuration error before any payload
/// is mapped.
pub async fn limiter<P, T, E, M, Fut>(
    concurrency: usize,
    payloads: impl IntoIterator<Item = P>,
    map_fn: M,
) -> Result<Vec<T>, E>
where
    P: Send + 'static,
    T: Send + 'static,
    E: From<FunnelError> + Send + 'static,
    M: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    let mut queue = OrderedTaskQueue::new(concurrency).map_err(E::from)?;
    let map_fn = Arc::new(map_fn);
    for payload in payloads {
        let map_fn = Arc::clone(&map_fn);
        queue.enqueue(move || map_fn(payload));
    }
    queue.dequeue_all().await
}
