use crate::{job::BoxedJob, Job, PoolConfig, PoolError, Result};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Lifecycle of a [`WorkerPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Constructed; jobs may be queued but nothing executes yet
    Created,
    /// Workers are consuming the queue
    Running,
    /// Queue closed, workers finishing what is left
    Draining,
    /// All workers gone
    Stopped,
}

impl PoolState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolState::Created => "created",
            PoolState::Running => "running",
            PoolState::Draining => "draining",
            PoolState::Stopped => "stopped",
        }
    }
}

/// Outcome of [`WorkerPool::drain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Every worker exited on its own before the grace period ran out
    pub workers_finished: bool,
    /// Jobs cancelled mid-execution when the grace period ran out
    pub interrupted: usize,
    /// Jobs still queued at the deadline; they are discarded, never run
    pub abandoned: usize,
    pub elapsed: Duration,
}

impl DrainReport {
    /// True when nothing was lost.
    pub fn is_clean(&self) -> bool {
        self.workers_finished && self.interrupted == 0 && self.abandoned == 0
    }
}

type SharedReceiver = Arc<AsyncMutex<mpsc::Receiver<BoxedJob>>>;

/// Fixed-size set of workers draining one bounded FIFO queue.
///
/// Submitters are suspended while the queue is full, so work is never
/// silently dropped. Each job is handed to exactly one worker.
pub struct WorkerPool {
    config: PoolConfig,
    sender: Mutex<Option<mpsc::Sender<BoxedJob>>>,
    receiver: SharedReceiver,
    closed: CancellationToken,
    drain_started: AtomicBool,
    stopped: CancellationToken,
    last_report: Mutex<Option<DrainReport>>,
    workers: Mutex<JoinSet<()>>,
    state: Mutex<PoolState>,
    active: Arc<AtomicUsize>,
    executed: Arc<AtomicU64>,
}

impl WorkerPool {
    pub fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let (sender, receiver) = mpsc::channel(config.capacity);

        Ok(WorkerPool {
            config,
            sender: Mutex::new(Some(sender)),
            receiver: Arc::new(AsyncMutex::new(receiver)),
            closed: CancellationToken::new(),
            drain_started: AtomicBool::new(false),
            stopped: CancellationToken::new(),
            last_report: Mutex::new(None),
            workers: Mutex::new(JoinSet::new()),
            state: Mutex::new(PoolState::Created),
            active: Arc::new(AtomicUsize::new(0)),
            executed: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Spawn the workers. Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state != PoolState::Created {
            return Err(PoolError::AlreadyStarted);
        }

        let mut workers = self.workers.lock();
        for worker_id in 0..self.config.size {
            workers.spawn(worker_loop(
                worker_id,
                self.receiver.clone(),
                self.active.clone(),
                self.executed.clone(),
            ));
        }
        *state = PoolState::Running;

        info!(
            "Worker pool started (workers: {}, capacity: {})",
            self.config.size, self.config.capacity
        );
        Ok(())
    }

    /// Queue a job, waiting for space if the queue is full.
    ///
    /// Fails with [`PoolError::Closed`] once draining has begun, including
    /// for callers that were already waiting for space.
    pub async fn submit<J: Job>(&self, job: J) -> Result<()> {
        self.submit_boxed(Box::new(job)).await
    }

    pub async fn submit_boxed(&self, job: BoxedJob) -> Result<()> {
        let sender = match self.sender.lock().as_ref() {
            Some(sender) if !self.closed.is_cancelled() => sender.clone(),
            _ => return Err(PoolError::Closed),
        };

        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(PoolError::Closed),
            sent = sender.send(job) => sent.map_err(|_| PoolError::Closed),
        }
    }

    /// Stop accepting jobs without waiting for the workers.
    ///
    /// Submitters blocked on a full queue fail with [`PoolError::Closed`]
    /// straight away. Workers keep running what is already queued.
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            if matches!(*state, PoolState::Created | PoolState::Running) {
                *state = PoolState::Draining;
            }
        }

        if !self.closed.is_cancelled() {
            info!("Worker pool closed to new jobs");
        }
        // Wakes every submitter blocked on a full queue, then drops our
        // sender so the channel closes once in-flight submitters let go.
        self.closed.cancel();
        drop(self.sender.lock().take());
    }

    /// Close the queue and wait up to `grace` for workers to finish.
    ///
    /// Jobs still queued when the grace period runs out are discarded and
    /// will never execute; in-flight jobs are cancelled. Concurrent and
    /// later calls wait for the first drain and return its report.
    pub async fn drain(&self, grace: Duration) -> DrainReport {
        if self.drain_started.swap(true, Ordering::SeqCst) {
            self.stopped.cancelled().await;
            let report = *self.last_report.lock();
            return report.unwrap_or(DrainReport {
                workers_finished: true,
                interrupted: 0,
                abandoned: 0,
                elapsed: Duration::ZERO,
            });
        }

        let started = Instant::now();
        info!("Draining worker pool (grace period: {:?})", grace);
        self.close();

        let mut workers = std::mem::take(&mut *self.workers.lock());
        let workers_finished = tokio::time::timeout(grace, async {
            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    error!("Worker terminated abnormally: {}", e);
                }
            }
        })
        .await
        .is_ok();

        let mut interrupted = 0;
        if !workers_finished {
            interrupted = self.active.load(Ordering::SeqCst);
            warn!(
                "Grace period elapsed with {} jobs in flight, stopping workers",
                interrupted
            );
            workers.shutdown().await;
        }

        let abandoned = {
            let mut receiver = self.receiver.lock().await;
            receiver.close();
            let mut discarded = 0;
            while receiver.try_recv().is_ok() {
                discarded += 1;
            }
            discarded
        };
        if abandoned > 0 {
            warn!("Abandoned {} queued jobs at shutdown", abandoned);
        }

        let report = DrainReport {
            workers_finished,
            interrupted,
            abandoned,
            elapsed: started.elapsed(),
        };
        *self.last_report.lock() = Some(report);
        *self.state.lock() = PoolState::Stopped;
        self.stopped.cancel();

        info!(
            "Worker pool stopped in {:?} (executed: {}, abandoned: {})",
            report.elapsed,
            self.executed(),
            report.abandoned
        );
        report
    }

    pub fn state(&self) -> PoolState {
        *self.state.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub fn worker_count(&self) -> usize {
        self.config.size
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Number of jobs currently waiting in the queue
    pub fn queued(&self) -> usize {
        self.sender
            .lock()
            .as_ref()
            .map(|sender| sender.max_capacity() - sender.capacity())
            .unwrap_or(0)
    }

    /// Number of jobs currently executing
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Total jobs run to completion (including ones that panicked)
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight count even when the worker is aborted mid-job.
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn enter(active: &Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        ActiveGuard(active.clone())
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn worker_loop(
    worker_id: usize,
    receiver: SharedReceiver,
    active: Arc<AtomicUsize>,
    executed: Arc<AtomicU64>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        // The lock is held only while waiting for the next job, so workers
        // take turns at the head of the queue.
        let next = {
            let mut receiver = receiver.lock().await;
            receiver.recv().await
        };

        let Some(job) = next else {
            break;
        };

        let _guard = ActiveGuard::enter(&active);
        if let Err(panic) = AssertUnwindSafe(job.run()).catch_unwind().await {
            error!("Worker {} job panicked: {}", worker_id, panic_message(&panic));
        }
        executed.fetch_add(1, Ordering::SeqCst);
    }

    debug!("Worker {} exiting, queue closed and empty", worker_id);
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> &str {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FutureJob;
    use std::sync::atomic::AtomicUsize;

    fn counting_job(
        counter: &Arc<AtomicUsize>,
    ) -> FutureJob<impl std::future::Future<Output = ()> + Send + 'static> {
        let counter = counter.clone();
        FutureJob::new(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(WorkerPool::new(PoolConfig::new(0, 10)).is_err());
        assert!(WorkerPool::new(PoolConfig::new(1, 0)).is_err());
    }

    #[tokio::test]
    async fn test_lifecycle_states() {
        let pool = WorkerPool::new(PoolConfig::new(2, 8)).unwrap();
        assert_eq!(pool.state(), PoolState::Created);

        pool.start().unwrap();
        assert_eq!(pool.state(), PoolState::Running);
        assert_eq!(pool.start(), Err(PoolError::AlreadyStarted));

        let report = pool.drain(Duration::from_secs(1)).await;
        assert!(report.is_clean());
        assert_eq!(pool.state(), PoolState::Stopped);
        assert!(pool.is_closed());
    }

    #[tokio::test]
    async fn test_submit_after_drain_is_closed() {
        let pool = WorkerPool::new(PoolConfig::new(1, 4)).unwrap();
        pool.start().unwrap();
        pool.drain(Duration::from_secs(1)).await;

        let counter = Arc::new(AtomicUsize::new(0));
        assert_eq!(pool.submit(counting_job(&counter)).await, Err(PoolError::Closed));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_jobs_queue_before_start() {
        let pool = WorkerPool::new(PoolConfig::new(2, 10)).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            pool.submit(counting_job(&counter)).await.unwrap();
        }
        assert_eq!(pool.queued(), 5);
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        pool.start().unwrap();
        let report = pool.drain(Duration::from_secs(2)).await;

        assert!(report.is_clean());
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert_eq!(pool.executed(), 5);
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_kill_worker() {
        let pool = WorkerPool::new(PoolConfig::new(1, 10)).unwrap();
        pool.start().unwrap();

        pool.submit(FutureJob::new(async { panic!("boom") })).await.unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            pool.submit(counting_job(&counter)).await.unwrap();
        }

        let report = pool.drain(Duration::from_secs(2)).await;
        assert!(report.workers_finished);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(pool.executed(), 4);
    }

    #[tokio::test]
    async fn test_drain_unstarted_pool_abandons_queue() {
        let pool = WorkerPool::new(PoolConfig::new(1, 10)).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        pool.submit(counting_job(&counter)).await.unwrap();
        pool.submit(counting_job(&counter)).await.unwrap();

        let report = pool.drain(Duration::from_millis(50)).await;
        assert_eq!(report.abandoned, 2);
        assert!(!report.is_clean());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("static message");
        assert_eq!(panic_message(&boxed), "static message");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&boxed), "owned");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(&boxed), "unknown panic payload");
    }
}
