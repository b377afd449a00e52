//! Per-session FIFO execution lane on a shared tokio runtime.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tracing::{error, trace, warn};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Errors returned while awaiting lane jobs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LaneError {
    /// The job was dropped before producing a result, usually after a
    /// panic.
    #[error("lane job dropped before completion")]
    Dropped,
    /// No tokio runtime is available to drive the lane.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),
}

/// Serial execution lane.
///
/// Jobs are queued in FIFO order and run one at a time, each on a task of
/// the shared runtime, so many lanes share one worker pool while every lane
/// stays totally ordered. Cloning a lane yields another handle to the same
/// queue.
#[derive(Clone)]
pub struct SerialLane {
    inner: Arc<LaneInner>,
}

struct LaneInner {
    runtime: Handle,
    queue: Mutex<LaneQueue>,
    pending: watch::Sender<usize>,
}

#[derive(Default)]
struct LaneQueue {
    jobs: VecDeque<Job>,
    draining: bool,
}

impl SerialLane {
    /// Creates a lane driven by the given runtime.
    #[must_use]
    pub fn new(runtime: Handle) -> Self {
        let (pending, _) = watch::channel(0);
        Self {
            inner: Arc::new(LaneInner {
                runtime,
                queue: Mutex::new(LaneQueue::default()),
                pending,
            }),
        }
    }

    /// Creates a lane driven by the runtime of the calling task.
    ///
    /// # Errors
    ///
    /// Returns [`LaneError::NoRuntime`] outside a tokio runtime.
    pub fn current() -> Result<Self, LaneError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|err| LaneError::NoRuntime(err.to_string()))
    }

    /// Enqueues a job without waiting for it.
    pub fn execute<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let start_drain = {
            let mut queue = lock(&self.inner.queue);
            queue.jobs.push_back(Box::pin(job));
            self.inner.pending.send_modify(|pending| *pending += 1);
            !std::mem::replace(&mut queue.draining, true)
        };
        if start_drain {
            let inner = Arc::clone(&self.inner);
            drop(self.inner.runtime.spawn(drain(inner)));
        }
    }

    /// Enqueues a job and waits for its output.
    ///
    /// Must not be awaited from inside a job of the same lane: the job would
    /// wait for itself.
    ///
    /// # Errors
    ///
    /// Returns [`LaneError::Dropped`] when the job panicked.
    pub async fn run<F, T>(&self, job: F) -> Result<T, LaneError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        self.execute(async move {
            if sender.send(job.await).is_err() {
                trace!("lane caller went away before the job finished");
            }
        });
        receiver.await.map_err(|_| LaneError::Dropped)
    }

    /// Waits until the queue is empty and no job is running.
    pub async fn idle(&self) {
        let mut pending = self.inner.pending.subscribe();
        if pending.wait_for(|count| *count == 0).await.is_err() {
            warn!("lane closed while waiting for it to settle");
        }
    }

    /// Returns the number of queued or running jobs.
    #[must_use]
    pub fn pending(&self) -> usize {
        *self.inner.pending.borrow()
    }
}

async fn drain(inner: Arc<LaneInner>) {
    loop {
        let next = {
            let mut queue = lock(&inner.queue);
            let job = queue.jobs.pop_front();
            if job.is_none() {
                queue.draining = false;
            }
            job
        };
        let Some(job) = next else {
            return;
        };
        if let Err(err) = inner.runtime.spawn(job).await {
            error!(error = %err, "lane job did not complete");
        }
        inner
            .pending
            .send_modify(|pending| *pending = pending.saturating_sub(1));
    }
}

fn lock(queue: &Mutex<LaneQueue>) -> MutexGuard<'_, LaneQueue> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}
