//! Worker pool with lazily grown, dedicated OS threads.
//!
//! Threads are created on demand: submissions below the core size hand the
//! job straight to a fresh worker, later submissions go through the
//! configured queue, and a refused push grows the pool up to its maximum
//! before the job is rejected. Idle workers above the core size retire after
//! the keep-alive window. Shutdown closes the queue, lets workers drain it,
//! and abandons whatever is still running once the bounded wait elapses.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::core::error::{panic_message, JoinError, PoolError};
use crate::core::queue::{Job, JobQueue, JobReceiver, JobSender, PollError, Priority, PushError};
use crate::core::thread_factory::ThreadFactory;

/// Hard limits and timings for one pool, derived from its spec.
#[derive(Debug, Clone)]
pub(crate) struct PoolLimits {
    pub core_size: usize,
    pub max_size: usize,
    pub keep_alive: Duration,
}

/// Receives failures that escape submitted or scheduled tasks.
///
/// One handler instance serves a whole pool. Failures are delivered exactly
/// once each and never tear the pool down.
pub trait FailureHandler: Send + Sync {
    /// Called once per failed task with the owning component's name.
    fn on_task_failure(&self, origin: &str, error: anyhow::Error);
}

/// Default handler that logs failures at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingFailureHandler;

impl FailureHandler for LoggingFailureHandler {
    fn on_task_failure(&self, origin: &str, error: anyhow::Error) {
        error!(origin = origin, error = %error, "uncaught task failure");
    }
}

/// Read-only statistics snapshot for one pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    /// Pool name.
    pub name: String,
    /// Workers currently executing a job.
    pub active_count: usize,
    /// Jobs that finished executing, failures included.
    pub completed_task_count: u64,
    /// Jobs whose body panicked without an observer.
    pub failed_task_count: u64,
    /// Configured core size.
    pub core_pool_size: usize,
    /// Largest worker count the pool ever reached.
    pub largest_pool_size: usize,
    /// Configured maximum size.
    pub maximum_pool_size: usize,
    /// Current worker count.
    pub pool_size: usize,
    /// Jobs waiting in the queue.
    pub queued_count: usize,
    /// Jobs accepted since the pool was created.
    pub task_count: u64,
}

#[derive(Debug, Default)]
struct PoolCounters {
    pool_size: AtomicUsize,
    active: AtomicUsize,
    largest: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
    submitted: AtomicU64,
}

impl PoolCounters {
    /// Reserve a worker slot while the pool is below `bound`.
    fn try_reserve_slot(&self, bound: usize) -> bool {
        let mut current = self.pool_size.load(Ordering::Acquire);
        while current < bound {
            match self.pool_size.compare_exchange(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.largest.fetch_max(current + 1, Ordering::AcqRel);
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
        false
    }

    /// Release a slot while the pool is above `core`; the caller retires.
    fn try_retire(&self, core: usize) -> bool {
        let mut current = self.pool_size.load(Ordering::Acquire);
        while current > core {
            match self.pool_size.compare_exchange(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
        false
    }
}

/// Condvar signalled every time a worker exits, for the shutdown drain wait.
#[derive(Default)]
struct DrainSignal {
    lock: Mutex<()>,
    exited: Condvar,
}

impl DrainSignal {
    fn worker_exited(&self) {
        let guard = self.lock.lock();
        drop(guard);
        self.exited.notify_all();
    }
}

/// Everything a worker thread needs, cloned per spawn.
struct WorkerContext {
    pool: String,
    rx: JobReceiver,
    counters: Arc<PoolCounters>,
    limits: PoolLimits,
    force: Arc<AtomicBool>,
    drain: Arc<DrainSignal>,
    handler: Arc<dyn FailureHandler>,
}

/// Handle to a submitted job's eventual result.
pub struct TaskHandle<T> {
    result: Receiver<thread::Result<T>>,
}

impl<T> TaskHandle<T> {
    /// Block until the job finishes.
    ///
    /// # Errors
    /// `Panicked` when the job panicked, `Abandoned` when the pool dropped
    /// the job before it completed.
    pub fn join(self) -> Result<T, JoinError> {
        match self.result.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => Err(JoinError::Panicked(panic_message(payload.as_ref()))),
            Err(_) => Err(JoinError::Abandoned),
        }
    }

    /// Block up to `timeout` for the result.
    ///
    /// # Errors
    /// As [`TaskHandle::join`], plus `Timeout` when the wait elapses.
    pub fn join_timeout(&self, timeout: Duration) -> Result<T, JoinError> {
        match self.result.recv_timeout(timeout) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => Err(JoinError::Panicked(panic_message(payload.as_ref()))),
            Err(RecvTimeoutError::Timeout) => Err(JoinError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(JoinError::Abandoned),
        }
    }
}

/// A named pool of worker threads draining one job queue.
pub struct WorkerPool {
    name: String,
    limits: PoolLimits,
    job_tx: Mutex<Option<JobSender>>,
    job_rx: JobReceiver,
    counters: Arc<PoolCounters>,
    seq: AtomicU64,
    force: Arc<AtomicBool>,
    shutdown: AtomicBool,
    drain: Arc<DrainSignal>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    factory: ThreadFactory,
    handler: Arc<dyn FailureHandler>,
}

impl WorkerPool {
    pub(crate) fn new(
        name: String,
        limits: PoolLimits,
        queue: JobQueue,
        factory: ThreadFactory,
        handler: Arc<dyn FailureHandler>,
    ) -> Self {
        info!(
            pool = %name,
            core_pool_size = limits.core_size,
            "worker pool created"
        );
        Self {
            name,
            limits,
            job_tx: Mutex::new(Some(queue.sender)),
            job_rx: queue.receiver,
            counters: Arc::new(PoolCounters::default()),
            seq: AtomicU64::new(0),
            force: Arc::new(AtomicBool::new(false)),
            shutdown: AtomicBool::new(false),
            drain: Arc::new(DrainSignal::default()),
            workers: Mutex::new(Vec::new()),
            factory,
            handler,
        }
    }

    /// Pool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once shutdown has begun.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Run `f` on the pool with normal priority.
    ///
    /// # Errors
    /// `Disposed` after shutdown, `Saturated` when the queue is full and the
    /// pool is at its maximum size, `Spawn` when a needed worker thread
    /// cannot be created.
    pub fn execute<F>(&self, f: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.execute_prioritized(f, Priority::Normal)
    }

    /// Run `f` with an explicit priority class.
    ///
    /// The class orders jobs under the `Priority` queue discipline and is
    /// ignored by FIFO disciplines.
    ///
    /// # Errors
    /// As [`WorkerPool::execute`].
    pub fn execute_prioritized<F>(&self, f: F, priority: Priority) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let job = Job {
            run: Box::new(f),
            priority,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
        };
        self.dispatch(job)
    }

    /// Run `f` and expose its result through the returned handle.
    ///
    /// A panic inside `f` is reported through the handle, not the failure
    /// handler; the caller chose to observe this job.
    ///
    /// # Errors
    /// As [`WorkerPool::execute`].
    pub fn submit<F, T>(&self, f: F) -> Result<TaskHandle<T>, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = bounded(1);
        self.execute(move || {
            let outcome = catch_unwind(AssertUnwindSafe(f));
            let _ = tx.send(outcome);
        })?;
        Ok(TaskHandle { result: rx })
    }

    fn dispatch(&self, job: Job) -> Result<(), PoolError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::Disposed(self.name.clone()));
        }
        // below the core size: hand the job straight to a fresh worker
        if self.counters.try_reserve_slot(self.limits.core_size) {
            self.spawn_worker(Some(job))?;
            self.counters.submitted.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
        let guard = self.job_tx.lock();
        let Some(sender) = guard.as_ref() else {
            return Err(PoolError::Disposed(self.name.clone()));
        };
        match sender.try_push(job) {
            Ok(()) => {
                drop(guard);
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                // a zero-core pool can hold queued work with no thread to drain it
                if self.counters.pool_size.load(Ordering::Acquire) == 0
                    && self.counters.try_reserve_slot(self.limits.max_size)
                {
                    self.spawn_worker(None)?;
                }
                Ok(())
            }
            Err(PushError::Full(job)) => {
                drop(guard);
                if self.counters.try_reserve_slot(self.limits.max_size) {
                    self.spawn_worker(Some(job))?;
                    self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                } else {
                    warn!(
                        pool = %self.name,
                        "queue full and pool at maximum size, rejecting job"
                    );
                    Err(PoolError::Saturated(self.name.clone()))
                }
            }
            Err(PushError::Closed(_)) => Err(PoolError::Disposed(self.name.clone())),
        }
    }

    fn spawn_worker(&self, first: Option<Job>) -> Result<(), PoolError> {
        let ctx = WorkerContext {
            pool: self.name.clone(),
            rx: self.job_rx.clone(),
            counters: Arc::clone(&self.counters),
            limits: self.limits.clone(),
            force: Arc::clone(&self.force),
            drain: Arc::clone(&self.drain),
            handler: Arc::clone(&self.handler),
        };
        match self.factory.spawn(move || worker_loop(&ctx, first)) {
            Ok(handle) => {
                self.workers.lock().push(handle);
                Ok(())
            }
            Err(err) => {
                // release the slot reserved by the caller
                self.counters.pool_size.fetch_sub(1, Ordering::AcqRel);
                self.drain.worker_exited();
                warn!(pool = %self.name, error = %err, "failed to spawn worker thread");
                Err(PoolError::Spawn(err))
            }
        }
    }

    /// Read-only statistics snapshot.
    #[must_use]
    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            name: self.name.clone(),
            active_count: self.counters.active.load(Ordering::Relaxed),
            completed_task_count: self.counters.completed.load(Ordering::Relaxed),
            failed_task_count: self.counters.failed.load(Ordering::Relaxed),
            core_pool_size: self.limits.core_size,
            largest_pool_size: self.counters.largest.load(Ordering::Relaxed),
            maximum_pool_size: self.limits.max_size,
            pool_size: self.counters.pool_size.load(Ordering::Relaxed),
            queued_count: self.job_rx.len(),
            task_count: self.counters.submitted.load(Ordering::Relaxed),
        }
    }

    /// Stop admitting work, let queued jobs drain, and wait up to `timeout`
    /// for every worker to exit.
    ///
    /// Returns true when the pool drained in time. On timeout the force flag
    /// is raised, still-queued jobs are dropped, and running workers are
    /// abandoned to finish their current job on their own; the call then
    /// returns false. Safe to call more than once.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            debug!(pool = %self.name, "pool already shut down");
            return !self.force.load(Ordering::Acquire);
        }
        info!(
            pool = %self.name,
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "shutting down pool"
        );
        if let Some(sender) = self.job_tx.lock().take() {
            sender.close();
        }
        let deadline = Instant::now().checked_add(timeout);
        let mut guard = self.drain.lock.lock();
        while self.counters.pool_size.load(Ordering::Acquire) > 0 {
            match deadline {
                Some(deadline) => {
                    if self
                        .drain
                        .exited
                        .wait_until(&mut guard, deadline)
                        .timed_out()
                    {
                        break;
                    }
                }
                None => self.drain.exited.wait(&mut guard),
            }
        }
        drop(guard);

        if self.counters.pool_size.load(Ordering::Acquire) == 0 {
            let handles: Vec<_> = self.workers.lock().drain(..).collect();
            for handle in handles {
                let _ = handle.join();
            }
            info!(pool = %self.name, "pool drained and terminated");
            true
        } else {
            self.force.store(true, Ordering::Release);
            let abandoned = self.counters.pool_size.load(Ordering::Acquire);
            self.workers.lock().clear();
            warn!(
                pool = %self.name,
                abandoned_workers = abandoned,
                "pool was forced to shut down before draining"
            );
            false
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            self.force.store(true, Ordering::Release);
            if let Some(sender) = self.job_tx.lock().take() {
                sender.close();
            }
            debug!(
                pool = %self.name,
                "pool dropped without explicit shutdown, detaching workers"
            );
        }
    }
}

fn worker_loop(ctx: &WorkerContext, first: Option<Job>) {
    debug!(pool = %ctx.pool, "worker thread started");
    if let Some(job) = first {
        run_job(ctx, job);
    }
    let mut retired = false;
    loop {
        if ctx.force.load(Ordering::Acquire) {
            break;
        }
        match ctx.rx.recv_timeout(ctx.limits.keep_alive) {
            Ok(job) => {
                if ctx.force.load(Ordering::Acquire) {
                    // forced shutdown drops jobs that were still queued
                    break;
                }
                run_job(ctx, job);
            }
            Err(PollError::Timeout) => {
                if ctx.counters.try_retire(ctx.limits.core_size) {
                    retired = true;
                    debug!(pool = %ctx.pool, "idle worker retiring");
                    break;
                }
            }
            Err(PollError::Closed) => break,
        }
    }
    if !retired {
        ctx.counters.pool_size.fetch_sub(1, Ordering::AcqRel);
    }
    ctx.drain.worker_exited();
    debug!(pool = %ctx.pool, "worker thread exiting");
}

fn run_job(ctx: &WorkerContext, job: Job) {
    ctx.counters.active.fetch_add(1, Ordering::Relaxed);
    let outcome = catch_unwind(AssertUnwindSafe(job.run));
    ctx.counters.active.fetch_sub(1, Ordering::Relaxed);
    ctx.counters.completed.fetch_add(1, Ordering::Relaxed);
    if let Err(payload) = outcome {
        ctx.counters.failed.fetch_add(1, Ordering::Relaxed);
        let message = panic_message(payload.as_ref());
        ctx.handler.on_task_failure(&ctx.pool, anyhow!(message));
    }
}
