//! Strictly ordered execution of asynchronous tasks.
//!
//! A queue is a chain of [`QueueTail`]s. Every task waits for the tail it was
//! enqueued behind, and hands the next task a fresh tail that settles once the
//! task itself has settled. Success, error, and panic all count as "settled":
//! a failing task is reported only through its own [`TaskHandle`] and never
//! holds back the tasks behind it.
//!
//! Tasks are spawned onto the Tokio runtime as soon as they are enqueued, so
//! the queue keeps draining even if a caller drops its handle without polling.
//!
//! ```ignore
//! use velocity_chain_eip155::queue::{QueueTail, enqueue};
//!
//! let first = enqueue(QueueTail::settled(), || async { 1 });
//! let second = enqueue(first.next, || async { 2 });
//! assert_eq!(first.task.await?, 1);
//! assert_eq!(second.task.await?, 2);
//! ```

use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture, Shared};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};

/// Completion of everything enqueued so far.
///
/// Resolves to `()` regardless of how the preceding tasks ended. Cloning is
/// cheap; all clones settle together.
#[derive(Clone)]
pub struct QueueTail(Shared<BoxFuture<'static, ()>>);

impl QueueTail {
    /// The tail of an empty queue.
    pub fn settled() -> Self {
        Self(future::ready(()).boxed().shared())
    }

    fn after(settled: oneshot::Receiver<()>) -> Self {
        // The sender is only ever dropped, never used: both a finished and an
        // unwound task close the channel.
        let tail = async move {
            let _ = settled.await;
        };
        Self(tail.boxed().shared())
    }
}

impl Default for QueueTail {
    fn default() -> Self {
        Self::settled()
    }
}

impl fmt::Debug for QueueTail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueTail").finish_non_exhaustive()
    }
}

impl Future for QueueTail {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.0.poll_unpin(cx)
    }
}

/// A task that never got to report its own outcome.
#[derive(Debug, thiserror::Error)]
pub enum QueueTaskError {
    #[error("queued task panicked")]
    Panicked,
    #[error("queued task was cancelled before completion")]
    Cancelled,
}

impl From<JoinError> for QueueTaskError {
    fn from(error: JoinError) -> Self {
        if error.is_panic() {
            QueueTaskError::Panicked
        } else {
            QueueTaskError::Cancelled
        }
    }
}

/// Outcome of one enqueued task.
///
/// Dropping the handle detaches the task; it still runs in its turn.
#[derive(Debug)]
pub struct TaskHandle<T>(JoinHandle<T>);

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, QueueTaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx).map_err(QueueTaskError::from)
    }
}

/// The two handles returned by [`enqueue`].
#[derive(Debug)]
pub struct Enqueued<T> {
    /// Resolves with exactly the task's own output.
    pub task: TaskHandle<T>,
    /// Tail to enqueue the next task behind.
    pub next: QueueTail,
}

/// Schedules `task` to start once `tail` has settled.
///
/// Returns immediately. Must be called from within a Tokio runtime.
pub fn enqueue<F, Fut, T>(tail: QueueTail, task: F) -> Enqueued<T>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let (settled_tx, settled_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        tail.await;
        let output = task().await;
        drop(settled_tx);
        output
    });
    Enqueued {
        task: TaskHandle(handle),
        next: QueueTail::after(settled_rx),
    }
}

/// A queue that owns its tail.
///
/// Tasks run one at a time, in the order [`SequentialQueue::enqueue`] was
/// called.
#[derive(Debug, Default)]
pub struct SequentialQueue {
    tail: Mutex<QueueTail>,
}

impl SequentialQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `task` to the queue and returns its handle.
    pub fn enqueue<F, Fut, T>(&self, task: F) -> TaskHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let mut tail = self.tail.lock().unwrap_or_else(PoisonError::into_inner);
        let Enqueued { task, next } = enqueue(tail.clone(), task);
        *tail = next;
        task
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    type Events = Arc<Mutex<Vec<String>>>;

    fn record(events: &Events, event: impl Into<String>) {
        events.lock().unwrap().push(event.into());
    }

    fn snapshot(events: &Events) -> Vec<String> {
        events.lock().unwrap().clone()
    }

    /// Lets every runnable task on the current-thread runtime make progress.
    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_runs_tasks_sequentially() {
        let events: Events = Arc::default();
        let (gate_tx, gate_rx) = oneshot::channel::<()>();

        let first = {
            let events = events.clone();
            enqueue(QueueTail::settled(), move || async move {
                record(&events, "first:start");
                let _ = gate_rx.await;
                record(&events, "first:end");
                "first-result"
            })
        };
        let second = {
            let events = events.clone();
            enqueue(first.next.clone(), move || async move {
                record(&events, "second:start");
                record(&events, "second:end");
                "second-result"
            })
        };

        settle().await;
        assert_eq!(snapshot(&events), vec!["first:start"]);

        gate_tx.send(()).unwrap();
        assert_eq!(first.task.await.unwrap(), "first-result");
        assert_eq!(second.task.await.unwrap(), "second-result");
        assert_eq!(
            snapshot(&events),
            vec!["first:start", "first:end", "second:start", "second:end"]
        );
    }

    #[tokio::test]
    async fn test_failed_task_does_not_block_the_queue() {
        let first = enqueue(QueueTail::settled(), || async {
            Err::<u32, _>("first failed")
        });
        let second = enqueue(first.next, || async { Ok::<_, &str>(2) });

        assert_eq!(first.task.await.unwrap(), Err("first failed"));
        assert_eq!(second.task.await.unwrap(), Ok(2));
    }

    #[tokio::test]
    async fn test_panicking_task_settles_the_tail() {
        let first = enqueue(QueueTail::settled(), || async {
            if true {
                panic!("task blew up");
            }
        });
        let second = enqueue(first.next, || async { "still runs" });

        assert!(matches!(first.task.await, Err(QueueTaskError::Panicked)));
        assert_eq!(second.task.await.unwrap(), "still runs");
    }

    #[tokio::test(start_paused = true)]
    async fn test_tasks_never_overlap_and_keep_enqueue_order() {
        let events: Events = Arc::default();
        let queue = SequentialQueue::new();

        // Earlier tasks are slower, so any overlap would reorder the events.
        let handles: Vec<_> = (0..5u64)
            .map(|i| {
                let events = events.clone();
                queue.enqueue(move || async move {
                    record(&events, format!("{i}:start"));
                    tokio::time::sleep(Duration::from_millis(50 - i * 10)).await;
                    record(&events, format!("{i}:end"));
                    i
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap(), i as u64);
        }

        let expected: Vec<String> = (0..5)
            .flat_map(|i| [format!("{i}:start"), format!("{i}:end")])
            .collect();
        assert_eq!(snapshot(&events), expected);
    }

    #[tokio::test]
    async fn test_each_handle_reports_its_own_outcome() {
        let queue = SequentialQueue::new();
        let ok = queue.enqueue(|| async { Ok::<_, String>("ok") });
        let failed = queue.enqueue(|| async { Err::<&str, _>("broken".to_string()) });
        let ok_again = queue.enqueue(|| async { Ok::<_, String>("ok again") });

        assert_eq!(failed.await.unwrap(), Err("broken".to_string()));
        assert_eq!(ok_again.await.unwrap(), Ok("ok again"));
        assert_eq!(ok.await.unwrap(), Ok("ok"));
    }

    #[tokio::test]
    async fn test_dropped_handle_still_runs_in_turn() {
        let events: Events = Arc::default();
        let queue = SequentialQueue::new();

        {
            let events = events.clone();
            drop(queue.enqueue(move || async move { record(&events, "detached") }));
        }
        let events_for_last = events.clone();
        queue
            .enqueue(move || async move { record(&events_for_last, "awaited") })
            .await
            .unwrap();

        assert_eq!(snapshot(&events), vec!["detached", "awaited"]);
    }
}
