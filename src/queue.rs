//! Bounded concurrency task queue
//!
//! Runs a list of deferred async tasks with at most `concurrency` of them in
//! flight. Tasks start in submission order; as soon as one settles the next
//! pending task is started.
//!
//! Every task's outcome is captured on its own: a failing (or panicking) task
//! never stops the rest of the batch. The returned vector is indexed by the
//! task's original position, not by completion order.
//!
//! The queue never retries and never times out a task. Wrap the task body with
//! [`crate::retry::with_retry`] / [`crate::retry::with_timeout`] for that.

use crate::{Error, Result};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Progress snapshot handed to the progress callback after each completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Tasks settled so far (1..=total)
    pub completed: usize,
    /// Number of submitted tasks
    pub total: usize,
}

/// Why a single task did not produce a value
#[derive(Debug)]
pub enum TaskFailure<E> {
    /// The task returned an error
    Failed(E),
    /// The task panicked; the payload message is kept when it is a string
    Panicked(String),
}

impl<E: fmt::Display> fmt::Display for TaskFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFailure::Failed(e) => write!(f, "{}", e),
            TaskFailure::Panicked(msg) => write!(f, "task panicked: {}", msg),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for TaskFailure<E> {}

impl<E: fmt::Display> From<TaskFailure<E>> for Error {
    fn from(failure: TaskFailure<E>) -> Self {
        Error::TaskFailure(failure.to_string())
    }
}

/// Outcome of one task
pub type TaskResult<T, E> = std::result::Result<T, TaskFailure<E>>;

/// Progress callback. Runs synchronously between completions, keep it cheap.
pub type ProgressFn = Arc<dyn Fn(Progress) + Send + Sync>;

/// A reusable queue configuration
#[derive(Clone)]
pub struct TaskQueue {
    concurrency: usize,
    on_progress: Option<ProgressFn>,
}

impl TaskQueue {
    /// Create a queue that keeps at most `concurrency` tasks in flight
    pub fn new(concurrency: usize) -> Result<Self> {
        if concurrency == 0 {
            return Err(Error::InvalidInput(
                "concurrency limit must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            concurrency,
            on_progress: None,
        })
    }

    /// Attach a progress callback, invoked once per settled task
    pub fn with_progress(mut self, on_progress: impl Fn(Progress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(on_progress));
        self
    }

    /// Concurrency limit of this queue
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run every task and wait until all of them settled
    pub async fn run<T, E, F, Fut>(&self, tasks: Vec<F>) -> Vec<TaskResult<T, E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let total = tasks.len();
        if total == 0 {
            return Vec::new();
        }

        tracing::debug!(total, concurrency = self.concurrency, "Starting task queue");

        let mut slots: Vec<Option<TaskResult<T, E>>> = (0..total).map(|_| None).collect();

        let mut in_flight = stream::iter(tasks.into_iter().enumerate())
            .map(|(index, task)| async move {
                let outcome = match AssertUnwindSafe(async move { task().await })
                    .catch_unwind()
                    .await
                {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(e)) => Err(TaskFailure::Failed(e)),
                    Err(payload) => Err(TaskFailure::Panicked(panic_message(payload))),
                };
                (index, outcome)
            })
            .buffer_unordered(self.concurrency);

        let mut completed = 0;
        while let Some((index, outcome)) = in_flight.next().await {
            completed += 1;
            if let Err(TaskFailure::Panicked(msg)) = &outcome {
                tracing::warn!(index, panic = %msg, "Task panicked");
            }
            if let Some(on_progress) = &self.on_progress {
                on_progress(Progress { completed, total });
            }
            slots[index] = Some(outcome);
        }

        let results: Vec<_> = slots.into_iter().flatten().collect();
        debug_assert_eq!(results.len(), total);
        tracing::debug!(
            total,
            succeeded = count_successes(&results),
            "Task queue finished"
        );
        results
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("concurrency", &self.concurrency)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// Run `tasks` with at most `concurrency` in flight.
///
/// Shorthand for `TaskQueue::new(concurrency)?.run(tasks)` with an optional
/// progress callback.
pub async fn run_queue<T, E, F, Fut>(
    tasks: Vec<F>,
    concurrency: usize,
    on_progress: Option<ProgressFn>,
) -> Result<Vec<TaskResult<T, E>>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let mut queue = TaskQueue::new(concurrency)?;
    queue.on_progress = on_progress;
    Ok(queue.run(tasks).await)
}

/// Number of successful outcomes
pub fn count_successes<T, E>(results: &[TaskResult<T, E>]) -> usize {
    results.iter().filter(|r| r.is_ok()).count()
}

/// Number of failed outcomes
pub fn count_failures<T, E>(results: &[TaskResult<T, E>]) -> usize {
    results.len() - count_successes(results)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::{OsRng, RngCore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Tracks how many instrumented tasks are running at once
    #[derive(Default)]
    struct Gauge {
        current: AtomicUsize,
        max: AtomicUsize,
    }

    impl Gauge {
        fn enter(&self) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max.fetch_max(now, Ordering::SeqCst);
        }

        fn exit(&self) {
            self.current.fetch_sub(1, Ordering::SeqCst);
        }

        fn max(&self) -> usize {
            self.max.load(Ordering::SeqCst)
        }
    }

    type BoxedTask =
        std::pin::Pin<Box<dyn Future<Output = std::result::Result<usize, String>> + Send>>;

    fn timed_tasks(gauge: &Arc<Gauge>, delays_ms: &[u64]) -> Vec<impl FnOnce() -> BoxedTask> {
        delays_ms
            .iter()
            .copied()
            .enumerate()
            .map(|(i, delay)| {
                let gauge = gauge.clone();
                move || {
                    Box::pin(async move {
                        gauge.enter();
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        gauge.exit();
                        Ok(i)
                    }) as BoxedTask
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn test_never_exceeds_concurrency() {
        for (n, c) in [(6usize, 1usize), (6, 2), (6, 3), (10, 4), (4, 4)] {
            let gauge = Arc::new(Gauge::default());
            let delays: Vec<u64> = (0..n).map(|i| 5 + (i as u64 * 7) % 20).collect();
            let queue = TaskQueue::new(c).unwrap();

            let results = queue.run(timed_tasks(&gauge, &delays)).await;

            assert_eq!(results.len(), n);
            assert!(gauge.max() <= c, "observed {} in flight with limit {}", gauge.max(), c);
            assert_eq!(gauge.max(), c.min(n));
        }
    }

    #[tokio::test]
    async fn test_all_successes_in_submission_order() {
        let gauge = Arc::new(Gauge::default());
        // Later tasks finish first
        let delays = [40, 30, 20, 10, 5];

        let results = run_queue(timed_tasks(&gauge, &delays), 5, None).await.unwrap();

        assert_eq!(count_successes(&results), 5);
        let values: Vec<usize> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_single_failure_does_not_stop_batch() {
        let tasks: Vec<_> = (0..6)
            .map(|i| move || async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                if i == 3 {
                    Err(format!("0xaddr{} failed", i))
                } else {
                    Ok(format!("0xaddr{}", i))
                }
            })
            .collect();

        let results = run_queue(tasks, 2, None).await.unwrap();

        assert_eq!(results.len(), 6);
        assert_eq!(count_failures(&results), 1);
        match &results[3] {
            Err(TaskFailure::Failed(e)) => assert_eq!(e, "0xaddr3 failed"),
            other => panic!("expected failure at index 3, got {:?}", other),
        }
        assert_eq!(results[4].as_ref().unwrap(), "0xaddr4");
    }

    #[tokio::test]
    async fn test_panicking_task_is_captured() {
        let tasks: Vec<_> = (0..3)
            .map(|i| move || async move {
                if i == 1 {
                    panic!("boom");
                }
                Ok::<_, String>(i)
            })
            .collect();

        let results = run_queue(tasks, 2, None).await.unwrap();

        assert!(matches!(&results[1], Err(TaskFailure::Panicked(msg)) if msg == "boom"));
        assert_eq!(count_successes(&results), 2);
    }

    #[tokio::test]
    async fn test_progress_reports_each_completion() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let queue = TaskQueue::new(3)
            .unwrap()
            .with_progress(move |p| sink.lock().unwrap().push(p));

        let tasks: Vec<_> = (0..7u64)
            .map(|i| move || async move {
                tokio::time::sleep(Duration::from_millis(3 * (7 - i))).await;
                if i % 2 == 0 {
                    Ok(i)
                } else {
                    Err("odd")
                }
            })
            .collect();

        queue.run(tasks).await;

        let seen = seen.lock().unwrap();
        let completed: Vec<usize> = seen.iter().map(|p| p.completed).collect();
        assert_eq!(completed, (1..=7).collect::<Vec<_>>());
        assert!(seen.iter().all(|p| p.total == 7));
    }

    #[tokio::test]
    async fn test_concurrency_one_is_sequential() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let running = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..4)
            .map(|i| {
                let log = log.clone();
                let running = running.clone();
                move || async move {
                    assert_eq!(running.fetch_add(1, Ordering::SeqCst), 0);
                    log.lock().unwrap().push(("start", i));
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    log.lock().unwrap().push(("end", i));
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, ()>(i)
                }
            })
            .collect();

        let results = run_queue(tasks, 1, None).await.unwrap();

        assert_eq!(count_successes(&results), 4);
        let log = log.lock().unwrap();
        let expected: Vec<_> = (0..4).flat_map(|i| [("start", i), ("end", i)]).collect();
        assert_eq!(*log, expected);
    }

    #[tokio::test]
    async fn test_random_delays_with_two_lanes() {
        let gauge = Arc::new(Gauge::default());
        let delays: Vec<u64> = (0..5).map(|_| 10 + (OsRng.next_u32() % 41) as u64).collect();

        let results = run_queue(timed_tasks(&gauge, &delays), 2, None).await.unwrap();

        assert_eq!(results.len(), 5);
        assert_eq!(count_successes(&results), 5);
        assert!(gauge.max() <= 2);
    }

    #[tokio::test]
    async fn test_empty_and_oversized_limits() {
        let tasks: Vec<fn() -> std::future::Ready<std::result::Result<(), ()>>> = Vec::new();
        let called = Arc::new(AtomicUsize::new(0));
        let counter = called.clone();
        let queue = TaskQueue::new(4)
            .unwrap()
            .with_progress(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        assert!(queue.run(tasks).await.is_empty());
        assert_eq!(called.load(Ordering::SeqCst), 0);

        let gauge = Arc::new(Gauge::default());
        let results = run_queue(timed_tasks(&gauge, &[20, 20, 20]), 50, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(gauge.max(), 3);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        assert!(matches!(TaskQueue::new(0), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_failure_converts_to_crate_error() {
        let err: Error = TaskFailure::Failed("rpc down").into();
        assert!(err.to_string().contains("rpc down"));
    }
}
