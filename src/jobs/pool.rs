//! Fixed-size worker pool fed by a shared FIFO queue.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::JobError;

/// Default number of workers.
pub const DEFAULT_POOL_SIZE: usize = 4;

type WorkItem = BoxFuture<'static, ()>;

/// Runs submitted work on a fixed number of tokio tasks.
///
/// `submit` never waits for a free worker: items queue until one picks them
/// up. A panicking item is caught and logged; its worker carries on.
pub struct WorkerPool {
    tx: Mutex<Option<mpsc::UnboundedSender<WorkItem>>>,
    workers: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    queued: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    size: usize,
    max_queue_depth: Option<usize>,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one). Must be called inside a tokio runtime.
    ///
    /// With `max_queue_depth` set, submissions beyond that many waiting items
    /// are rejected with [`JobError::Overloaded`].
    pub fn new(size: usize, max_queue_depth: Option<usize>) -> Self {
        let size = size.max(1);
        let (tx, rx) = mpsc::unbounded_channel::<WorkItem>();
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let queued = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));

        let workers = (0..size)
            .map(|index| {
                tokio::spawn(worker_loop(
                    index,
                    Arc::clone(&rx),
                    Arc::clone(&queued),
                    Arc::clone(&active),
                ))
            })
            .collect();

        info!(workers = size, max_queue_depth = ?max_queue_depth, "Worker pool started");

        Self {
            tx: Mutex::new(Some(tx)),
            workers: tokio::sync::Mutex::new(workers),
            queued,
            active,
            size,
            max_queue_depth,
        }
    }

    /// Claim a place in the queue ahead of submitting work.
    ///
    /// The place counts against `max_queue_depth` until the returned slot is
    /// submitted or dropped.
    pub fn reserve(&self) -> Result<QueueSlot, JobError> {
        let tx = self.lock_tx().clone().ok_or(JobError::PoolClosed)?;

        match self.max_queue_depth {
            Some(max) => {
                self.queued
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |queued| {
                        (queued < max).then_some(queued + 1)
                    })
                    .map_err(|_| JobError::Overloaded { max })?;
            }
            None => {
                self.queued.fetch_add(1, Ordering::SeqCst);
            }
        }

        Ok(QueueSlot {
            tx,
            queued: Arc::clone(&self.queued),
            submitted: false,
        })
    }

    /// Enqueue a unit of work. Returns as soon as it is queued.
    pub fn submit<F>(&self, work: F) -> Result<(), JobError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.reserve()?.submit(work)
    }

    /// Items waiting for a worker.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Items currently executing.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Number of workers.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Stop accepting work, let the workers drain the queue, and wait for them.
    pub async fn shutdown(&self) {
        let dropped = self.lock_tx().take();
        if dropped.is_none() {
            return;
        }
        drop(dropped);

        info!(queued = self.queued(), active = self.active(), "Draining worker pool");
        let handles = std::mem::take(&mut *self.workers.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task ended abnormally");
            }
        }
        info!("Worker pool stopped");
    }

    fn lock_tx(&self) -> std::sync::MutexGuard<'_, Option<mpsc::UnboundedSender<WorkItem>>> {
        self.tx.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A reserved place in the pool's queue.
pub struct QueueSlot {
    tx: mpsc::UnboundedSender<WorkItem>,
    queued: Arc<AtomicUsize>,
    submitted: bool,
}

impl QueueSlot {
    /// Hand the work to the pool, consuming the slot.
    pub fn submit<F>(mut self, work: F) -> Result<(), JobError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.tx.send(work.boxed()).is_err() {
            return Err(JobError::PoolClosed);
        }
        self.submitted = true;
        Ok(())
    }
}

impl Drop for QueueSlot {
    fn drop(&mut self) {
        if !self.submitted {
            self.queued.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

async fn worker_loop(
    index: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<WorkItem>>>,
    queued: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
) {
    loop {
        let next = rx.lock().await.recv().await;
        let Some(work) = next else {
            break;
        };

        queued.fetch_sub(1, Ordering::SeqCst);
        active.fetch_add(1, Ordering::SeqCst);

        if let Err(panic) = AssertUnwindSafe(work).catch_unwind().await {
            error!(
                worker = index,
                panic = %panic_message(panic.as_ref()),
                "Work item panicked"
            );
        }

        active.fetch_sub(1, Ordering::SeqCst);
    }

    debug!(worker = index, "Worker exiting, queue closed");
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::sync::oneshot;

    #[tokio::test]
    async fn runs_submitted_work() {
        let pool = WorkerPool::new(2, None);
        let (tx, rx) = oneshot::channel();

        pool.submit(async move {
            let _ = tx.send(7);
        })
        .unwrap();

        assert_eq!(rx.await.unwrap(), 7);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn never_exceeds_pool_size() {
        let pool = WorkerPool::new(2, None);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.submit(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        pool.shutdown().await;
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(pool.queued(), 0);
        assert_eq!(pool.active(), 0);
    }

    #[tokio::test]
    async fn panic_does_not_take_down_worker() {
        let pool = WorkerPool::new(1, None);
        pool.submit(async {
            if true {
                panic!("collaborator exploded");
            }
        })
        .unwrap();

        let (tx, rx) = oneshot::channel();
        pool.submit(async move {
            let _ = tx.send("still alive");
        })
        .unwrap();

        assert_eq!(rx.await.unwrap(), "still alive");
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_drains_queued_work() {
        let pool = WorkerPool::new(1, None);
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let done = Arc::clone(&done);
            pool.submit(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        pool.shutdown().await;
        assert_eq!(done.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_rejected() {
        let pool = WorkerPool::new(1, None);
        pool.shutdown().await;

        assert!(matches!(pool.submit(async {}), Err(JobError::PoolClosed)));
        assert!(matches!(pool.reserve(), Err(JobError::PoolClosed)));
        // second shutdown is a no-op
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn bounded_queue_rejects_when_full() {
        let pool = WorkerPool::new(1, Some(1));
        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        pool.submit(async move {
            let _ = started_tx.send(());
            let _ = release_rx.await;
        })
        .unwrap();
        started_rx.await.unwrap();

        pool.submit(async {}).unwrap();
        assert_eq!(pool.queued(), 1);
        assert!(matches!(pool.reserve(), Err(JobError::Overloaded { max: 1 })));
        assert!(matches!(pool.submit(async {}), Err(JobError::Overloaded { max: 1 })));

        let _ = release_tx.send(());
        pool.shutdown().await;
        assert_eq!(pool.queued(), 0);
    }

    #[tokio::test]
    async fn reserved_slot_holds_queue_place() {
        let pool = WorkerPool::new(1, Some(1));
        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        pool.submit(async move {
            let _ = started_tx.send(());
            let _ = release_rx.await;
        })
        .unwrap();
        started_rx.await.unwrap();

        let slot = pool.reserve().unwrap();
        assert_eq!(pool.queued(), 1);
        // nothing else gets in while the slot is held
        assert!(matches!(pool.submit(async {}), Err(JobError::Overloaded { max: 1 })));

        drop(slot);
        assert_eq!(pool.queued(), 0);

        let (done_tx, done_rx) = oneshot::channel();
        pool.reserve()
            .unwrap()
            .submit(async move {
                let _ = done_tx.send(());
            })
            .unwrap();
        let _ = release_tx.send(());
        done_rx.await.unwrap();
        pool.shutdown().await;
        assert_eq!(pool.queued(), 0);
    }

    #[test]
    fn panic_message_reads_common_payloads() {
        let boxed: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(boxed.as_ref()), "static str");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
