//! Bounded worker pool used by the vendor dispatch layer to run sub-batch
//! jobs concurrently under a fixed concurrency cap.
//!
//! Grounded on `original_source/util/worker_pool_test.go` (`WaitCount`,
//! `JobDone`, `WaitAll`, `Release` over a channel-backed job queue) and on
//! the channel-plus-background-task shape of `pubsub/src/subscriber.rs`
//! (`Subscriber::spawn` owning `JoinHandle`s it aborts on drop/`dispose`).
//! The job queue itself is `async_channel`, the same crate `gcloud-pubsub`
//! uses for its received-message queue.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct Inner {
    remaining: AtomicI64,
    idle: Notify,
}

/// A fixed-size pool of workers pulling jobs off a bounded queue.
///
/// Unlike a plain `Semaphore`-gated `tokio::spawn` loop, this pool models
/// the original's explicit `WaitCount`/`JobDone`/`WaitAll` contract so
/// callers (the vendor adapter) can submit N sub-batch jobs and block until
/// every one has run, without needing a `JoinSet` per call.
pub struct Pool {
    sender: async_channel::Sender<Job>,
    workers: Vec<JoinHandle<()>>,
    inner: Arc<Inner>,
}

impl Pool {
    pub fn new(worker_count: usize, queue_capacity: usize) -> Self {
        let (sender, receiver) = async_channel::bounded(queue_capacity.max(1));
        let inner = Arc::new(Inner {
            remaining: AtomicI64::new(0),
            idle: Notify::new(),
        });

        let mut workers = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let receiver = receiver.clone();
            let inner = inner.clone();
            workers.push(tokio::spawn(async move {
                tracing::trace!(worker = id, "pool worker started");
                while let Ok(job) = receiver.recv().await {
                    job.await;
                    inner.job_done();
                }
                tracing::trace!(worker = id, "pool worker stopped");
            }));
        }

        Pool { sender, workers, inner }
    }

    /// Sets the outstanding job count before a burst of `submit` calls.
    pub fn wait_count(&self, n: i64) {
        self.inner.remaining.store(n, Ordering::SeqCst);
    }

    /// Enqueues a job. Blocks (asynchronously) if the queue is full.
    pub async fn submit<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        // Ignore the error: a closed queue means `release` already ran,
        // which only happens after the pool is no longer in use.
        let _ = self.sender.send(Box::pin(job)).await;
    }

    /// Blocks until the outstanding count set by `wait_count` reaches zero.
    pub async fn wait_all(&self) {
        loop {
            if self.inner.remaining.load(Ordering::SeqCst) <= 0 {
                return;
            }
            self.inner.idle.notified().await;
        }
    }

    /// Stops all workers. In-flight jobs are allowed to finish; queued-but-
    /// unstarted jobs are dropped once the channel closes.
    pub async fn release(self) {
        self.sender.close();
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

impl Inner {
    fn job_done(&self) {
        let previous = self.remaining.fetch_sub(1, Ordering::SeqCst);
        if previous <= 1 {
            self.idle.notify_waiters();
        }
    }
}
