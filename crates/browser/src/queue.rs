//! Serialized job execution.
//!
//! All browser work funnels through a single queue so that jobs never
//! interleave on the shared session. Workers pull in FIFO order; with the
//! default concurrency of 1 this gives strict serialization. A failing job
//! only fails its own submitter, the workers keep draining.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use {
    tokio::sync::{Mutex, mpsc, oneshot},
    tracing::{debug, warn},
};

use crate::error::{BrowserError, Result};

type JobFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

/// A deferred job: invoked by a worker, at which point it builds its future.
pub type JobFn<T> = Box<dyn FnOnce() -> JobFuture<T> + Send>;

struct QueuedJob<T> {
    job: JobFn<T>,
    done: oneshot::Sender<Result<T>>,
}

/// FIFO queue with a fixed worker count.
///
/// Cloning shares the same queue and counters.
#[derive(Clone)]
pub struct JobQueue<T> {
    tx: mpsc::UnboundedSender<QueuedJob<T>>,
    queued: Arc<AtomicUsize>,
    running: Arc<AtomicUsize>,
}

impl<T: Send + 'static> JobQueue<T> {
    /// Spawn `concurrency` workers (clamped to at least 1) draining a shared
    /// channel. Workers exit when every queue handle is dropped.
    pub fn new(concurrency: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<QueuedJob<T>>();
        let rx = Arc::new(Mutex::new(rx));
        let queued = Arc::new(AtomicUsize::new(0));
        let running = Arc::new(AtomicUsize::new(0));

        let workers = concurrency.max(1);
        for worker in 0..workers {
            let rx = Arc::clone(&rx);
            let queued = Arc::clone(&queued);
            let running = Arc::clone(&running);
            tokio::spawn(async move {
                loop {
                    // Lock scope ends with the statement so other workers
                    // can pull while this job runs.
                    let next = rx.lock().await.recv().await;
                    let Some(queued_job) = next else {
                        debug!(worker, "job queue closed, worker exiting");
                        break;
                    };
                    queued.fetch_sub(1, Ordering::SeqCst);
                    running.fetch_add(1, Ordering::SeqCst);
                    let result = (queued_job.job)().await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    if queued_job.done.send(result).is_err() {
                        warn!(worker, "job submitter went away before completion");
                    }
                }
            });
        }

        Self {
            tx,
            queued,
            running,
        }
    }

    /// Enqueue a job and return the completion channel without awaiting it.
    /// Jobs complete in submission order when concurrency is 1.
    pub fn enqueue(&self, job: JobFn<T>) -> Result<oneshot::Receiver<Result<T>>> {
        let (done, rx) = oneshot::channel();
        self.queued.fetch_add(1, Ordering::SeqCst);
        self.tx.send(QueuedJob { job, done }).map_err(|_| {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            BrowserError::QueueClosed
        })?;
        Ok(rx)
    }

    /// Enqueue a job and wait for its result.
    pub async fn submit(&self, job: JobFn<T>) -> Result<T> {
        let rx = self.enqueue(job)?;
        rx.await.map_err(|_| BrowserError::QueueClosed)?
    }

    /// Jobs accepted but not yet started.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Jobs currently executing.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;

    #[tokio::test]
    async fn jobs_complete_in_submission_order() {
        let queue: JobQueue<usize> = JobQueue::new(1);
        let order: Arc<StdMutex<Vec<usize>>> = Arc::new(StdMutex::new(Vec::new()));

        let mut receivers = Vec::new();
        for i in 0..5 {
            let order = Arc::clone(&order);
            let rx = queue
                .enqueue(Box::new(move || {
                    Box::pin(async move {
                        order.lock().unwrap().push(i);
                        Ok(i)
                    })
                }))
                .unwrap();
            receivers.push(rx);
        }

        for (i, rx) in receivers.into_iter().enumerate() {
            assert_eq!(rx.await.unwrap().unwrap(), i);
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn failed_job_does_not_poison_the_queue() {
        let queue: JobQueue<&'static str> = JobQueue::new(1);

        let failing = queue
            .submit(Box::new(|| {
                Box::pin(async { Err(BrowserError::NavigationFailed("boom".into())) })
            }))
            .await;
        assert!(failing.is_err());

        let ok = queue
            .submit(Box::new(|| Box::pin(async { Ok("still alive") })))
            .await
            .unwrap();
        assert_eq!(ok, "still alive");
    }

    #[tokio::test]
    async fn counters_return_to_zero_when_idle() {
        let queue: JobQueue<()> = JobQueue::new(1);

        queue
            .submit(Box::new(|| Box::pin(async { Ok(()) })))
            .await
            .unwrap();

        assert_eq!(queue.queued(), 0);
        assert_eq!(queue.running(), 0);
    }

    #[tokio::test]
    async fn zero_concurrency_is_clamped_to_one() {
        let queue: JobQueue<u8> = JobQueue::new(0);
        let out = queue
            .submit(Box::new(|| Box::pin(async { Ok(7) })))
            .await
            .unwrap();
        assert_eq!(out, 7);
    }
}
