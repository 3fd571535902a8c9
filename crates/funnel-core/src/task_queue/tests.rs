//! Behavioural tests for the limiter, the ordered queue and `limiter`.

use super::*;
use crate::error::utils::task_error;
use crate::error::FunnelError;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::sleep;

/// Tracks how many tasks are inside their body at once.
#[derive(Default)]
struct ConcurrencyProbe {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl ConcurrencyProbe {
    async fn hold_for(&self, duration: Duration) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        sleep(duration).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_capacity_two_with_three_tasks() {
    let limiter = CapacityLimiter::new(2).unwrap();
    let probe = Arc::new(ConcurrencyProbe::default());

    let runs: Vec<_> = (0..3)
        .map(|_| {
            let probe = Arc::clone(&probe);
            tokio::spawn(limiter.run(move || async move {
                probe.hold_for(Duration::from_millis(50)).await;
                1
            }))
        })
        .collect();

    let mut total = 0;
    for run in runs {
        total += run.await.unwrap();
    }
    assert_eq!(total, 3);
    assert!(probe.max() <= 2, "max concurrency was {}", probe.max());
    assert_eq!(limiter.active(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_bound_holds_for_every_capacity() {
    for capacity in 1..=6 {
        let probe = Arc::new(ConcurrencyProbe::default());
        let task_probe = Arc::clone(&probe);
        let results = limiter(capacity, 0..16, move |i: usize| {
            let probe = Arc::clone(&task_probe);
            async move {
                probe.hold_for(Duration::from_millis(5)).await;
                Ok::<_, FunnelError>(i)
            }
        })
        .await
        .unwrap();

        assert_eq!(results, (0..16).collect::<Vec<_>>());
        assert!(
            probe.max() <= capacity,
            "capacity {} saw {} concurrent tasks",
            capacity,
            probe.max()
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_capacity_covering_all_tasks_never_waits() {
    let tasks = 5;
    let mut queue = OrderedTaskQueue::<usize, FunnelError>::new(tasks).unwrap();
    // Every task blocks until all of them are running at the same time.
    let barrier = Arc::new(tokio::sync::Barrier::new(tasks));
    for i in 0..tasks {
        let barrier = Arc::clone(&barrier);
        queue.enqueue(move || async move {
            barrier.wait().await;
            Ok(i)
        });
    }
    assert_eq!(queue.limiter().waiting(), 0);

    let results = tokio::time::timeout(Duration::from_secs(5), queue.dequeue_all())
        .await
        .expect("tasks should not wait for slots")
        .unwrap();
    assert_eq!(results, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_capacity_one_is_serial() {
    let probe = Arc::new(ConcurrencyProbe::default());
    let task_probe = Arc::clone(&probe);
    limiter(1, 0..4, move |_: u8| {
        let probe = Arc::clone(&task_probe);
        async move {
            probe.hold_for(Duration::from_millis(5)).await;
            Ok::<_, FunnelError>(())
        }
    })
    .await
    .unwrap();
    assert_eq!(probe.max(), 1);
}

#[tokio::test]
async fn test_failure_restores_capacity() {
    let limiter = CapacityLimiter::new(1).unwrap();

    let err = limiter
        .run(|| async { Err::<i32, _>(task_error("run", None, "Test error")) })
        .await
        .unwrap_err();
    assert_eq!(err.source_message(), "Test error");

    let result = limiter.run(|| async { Ok::<_, FunnelError>(99) }).await;
    assert_eq!(result.unwrap(), 99);
}

#[tokio::test]
async fn test_immediate_and_delayed_failures_release_alike() {
    let limiter = CapacityLimiter::new(1).unwrap();

    let immediate = limiter
        .run(|| std::future::ready(Err::<(), _>(task_error("run", None, "now"))))
        .await;
    assert!(immediate.is_err());
    assert_eq!(limiter.active(), 0);

    let delayed = limiter
        .run(|| async {
            sleep(Duration::from_millis(5)).await;
            Err::<(), _>(task_error("run", None, "later"))
        })
        .await;
    assert!(delayed.is_err());
    assert_eq!(limiter.active(), 0);

    assert_eq!(limiter.run(|| async { 1 }).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_results_follow_enqueue_order() {
    let mut queue = OrderedTaskQueue::<&str, FunnelError>::new(2).unwrap();
    queue.enqueue(|| async {
        sleep(Duration::from_millis(20)).await;
        Ok("first")
    });
    queue.enqueue(|| async {
        sleep(Duration::from_millis(10)).await;
        Ok("second")
    });
    queue.enqueue(|| std::future::ready(Ok("third")));

    let results = queue.dequeue_all().await.unwrap();
    assert_eq!(results, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_limiter_doubles_payloads() {
    let results = limiter(2, vec![1, 2, 3, 4, 5], |x: i32| async move {
        sleep(Duration::from_millis(10)).await;
        Ok::<_, FunnelError>(x * 2)
    })
    .await
    .unwrap();
    assert_eq!(results, vec![2, 4, 6, 8, 10]);
}

#[tokio::test]
async fn test_limiter_rejects_on_mapping_error() {
    let err = limiter(2, vec![1, 2, 3], |x: i32| async move {
        sleep(Duration::from_millis(10)).await;
        if x == 2 {
            return Err(task_error("iterator", Some(1), "iterator failure"));
        }
        Ok(x)
    })
    .await
    .unwrap_err();
    assert_eq!(err.source_message(), "iterator failure");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_earliest_failure_wins_and_every_payload_runs() {
    let finished = Arc::new(Mutex::new(HashSet::new()));
    let seen = Arc::clone(&finished);

    let err = limiter(3, 0..6, move |payload: usize| {
        let seen = Arc::clone(&seen);
        async move {
            sleep(Duration::from_millis(10)).await;
            seen.lock().unwrap().insert(payload);
            if payload == 1 || payload == 3 {
                return Err(task_error(
                    "iterator",
                    Some(payload),
                    &format!("Failure in task {}", payload),
                ));
            }
            Ok(payload * 2)
        }
    })
    .await
    .unwrap_err();

    assert_eq!(err.source_message(), "Failure in task 1");
    assert_eq!(err.task_index(), Some(1));
    let finished = finished.lock().unwrap();
    for payload in 0..6 {
        assert!(finished.contains(&payload), "payload {} never ran", payload);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_earliest_failure_wins_even_when_it_settles_last() {
    let settled = Arc::new(Mutex::new(Vec::new()));
    let mut queue = OrderedTaskQueue::<u32, FunnelError>::new(3).unwrap();

    queue.enqueue(|| async { Ok(0) });
    let log = Arc::clone(&settled);
    queue.enqueue(move || async move {
        sleep(Duration::from_millis(40)).await;
        log.lock().unwrap().push(1);
        Err(task_error("queue", Some(1), "slow failure"))
    });
    let log = Arc::clone(&settled);
    queue.enqueue(move || async move {
        log.lock().unwrap().push(2);
        Err(task_error("queue", Some(2), "fast failure"))
    });

    let err = queue.dequeue_all().await.unwrap_err();
    assert_eq!(err.source_message(), "slow failure");
    assert_eq!(*settled.lock().unwrap(), vec![2, 1]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_side_effects_complete_before_dequeue_returns() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut queue = OrderedTaskQueue::<(), FunnelError>::new(2).unwrap();

    queue.enqueue(|| async { Err(task_error("queue", Some(0), "fails first")) });
    for delay in [30u64, 10, 20] {
        let counter = Arc::clone(&counter);
        queue.enqueue(move || async move {
            sleep(Duration::from_millis(delay)).await;
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }

    assert!(queue.dequeue_all().await.is_err());
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}
