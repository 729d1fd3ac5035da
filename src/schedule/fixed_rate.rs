//! Fixed-rate repetition on top of a worker pool.
//!
//! Each registration owns a timer thread that sleeps until the next fire
//! instant, runs the task on the pool, waits for it to finish, and reports a
//! [`CycleOutcome`] per run. Fire instants accumulate from the first one, so
//! a slow cycle delays later ones rather than dropping them, and cycles never
//! overlap.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::core::error::{AppResult, PoolError};
use crate::core::thread_factory::ThreadFactory;
use crate::core::worker_pool::{PoolSnapshot, WorkerPool};

/// Task run on every cycle of a fixed-rate registration.
pub type RepeatingTask = Arc<dyn Fn() -> AppResult<()> + Send + Sync>;

/// Result of one cycle of a repeating task.
#[derive(Debug)]
pub enum CycleOutcome {
    /// The task ran and returned `Ok`.
    Completed,
    /// The task returned an error, panicked, or could not be run.
    Failed(anyhow::Error),
}

/// Cancellation flag shared between a registration handle and its timer.
struct TimerShared {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

impl TimerShared {
    /// Block until `deadline` or cancellation. Returns whether the
    /// registration was cancelled.
    fn wait_until_cancelled(&self, deadline: Instant) -> bool {
        let mut cancelled = self.cancelled.lock();
        while !*cancelled {
            if self.wake.wait_until(&mut cancelled, deadline).timed_out() {
                return *cancelled;
            }
        }
        true
    }
}

/// Handle to a fixed-rate registration.
///
/// Cloneable; any clone may cancel. Cancellation stops future fires without
/// interrupting a cycle already running on the pool.
#[derive(Clone)]
pub struct FixedRateHandle {
    shared: Arc<TimerShared>,
}

impl FixedRateHandle {
    pub(crate) fn new() -> Self {
        Self {
            shared: Arc::new(TimerShared {
                cancelled: Mutex::new(false),
                wake: Condvar::new(),
            }),
        }
    }

    /// Stop future fires. Idempotent.
    pub fn cancel(&self) {
        let mut cancelled = self.shared.cancelled.lock();
        *cancelled = true;
        self.shared.wake.notify_all();
    }

    /// Whether the registration has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.shared.cancelled.lock()
    }
}

/// A worker pool extended with fixed-rate repetition.
pub struct ScheduledPool {
    name: String,
    pool: Arc<WorkerPool>,
    timer_factory: ThreadFactory,
    registrations: Mutex<Vec<FixedRateHandle>>,
}

impl ScheduledPool {
    pub(crate) fn new(name: String, pool: WorkerPool) -> Self {
        let timer_factory = ThreadFactory::new(format!("{name}-tick"));
        Self {
            name,
            pool: Arc::new(pool),
            timer_factory,
            registrations: Mutex::new(Vec::new()),
        }
    }

    /// Pool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run a one-off job on the underlying pool.
    ///
    /// # Errors
    /// As [`WorkerPool::execute`].
    pub fn execute<F>(&self, f: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.execute(f)
    }

    /// Statistics of the underlying pool.
    #[must_use]
    pub fn snapshot(&self) -> PoolSnapshot {
        self.pool.snapshot()
    }

    /// Run `task` every `period`, first after `initial_delay`.
    ///
    /// Returns the registration handle and a receiver yielding one
    /// [`CycleOutcome`] per cycle. The receiver may be dropped; outcomes are
    /// then discarded. The timer exits when cancelled or when the pool is
    /// disposed.
    ///
    /// # Errors
    /// `Configuration` for a zero period, `Spawn` when the timer thread
    /// cannot be created.
    pub fn schedule_at_fixed_rate(
        &self,
        initial_delay: Duration,
        period: Duration,
        task: RepeatingTask,
    ) -> Result<(FixedRateHandle, Receiver<CycleOutcome>), PoolError> {
        if period.is_zero() {
            return Err(PoolError::Configuration(
                "period must be greater than zero".to_owned(),
            ));
        }
        let handle = FixedRateHandle::new();
        let (outcome_tx, outcome_rx) = unbounded();
        let context = TimerContext {
            pool: Arc::clone(&self.pool),
            shared: Arc::clone(&handle.shared),
            outcomes: outcome_tx,
            initial_delay,
            period,
            task,
        };
        self.timer_factory.spawn(move || run_timer(&context))?;
        let mut registrations = self.registrations.lock();
        registrations.retain(|h| !h.is_cancelled());
        registrations.push(handle.clone());
        debug!(
            pool = %self.name,
            initial_delay_ms = initial_delay.as_millis() as u64,
            period_ms = period.as_millis() as u64,
            "fixed rate registration armed"
        );
        Ok((handle, outcome_rx))
    }

    /// Cancel every registration and shut the pool down.
    ///
    /// Returns whether the pool drained within `timeout`.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        for handle in self.registrations.lock().drain(..) {
            handle.cancel();
        }
        self.pool.shutdown(timeout)
    }
}

impl Drop for ScheduledPool {
    fn drop(&mut self) {
        for handle in self.registrations.lock().drain(..) {
            handle.cancel();
        }
    }
}

struct TimerContext {
    pool: Arc<WorkerPool>,
    shared: Arc<TimerShared>,
    outcomes: Sender<CycleOutcome>,
    initial_delay: Duration,
    period: Duration,
    task: RepeatingTask,
}

/// Timer loop: sleep, fire, wait for the cycle, report, repeat.
fn run_timer(ctx: &TimerContext) {
    let mut next = Instant::now() + ctx.initial_delay;
    loop {
        if ctx.shared.wait_until_cancelled(next) {
            debug!(pool = %ctx.pool.name(), "fixed rate registration cancelled");
            return;
        }
        let task = Arc::clone(&ctx.task);
        match ctx.pool.submit(move || task()) {
            Ok(handle) => {
                let outcome = match handle.join() {
                    Ok(Ok(())) => CycleOutcome::Completed,
                    Ok(Err(error)) => CycleOutcome::Failed(error),
                    Err(join_error) => CycleOutcome::Failed(join_error.into()),
                };
                // nobody listening is fine, outcomes are advisory
                let _ = ctx.outcomes.send(outcome);
            }
            Err(PoolError::Disposed(_)) => {
                debug!(pool = %ctx.pool.name(), "pool disposed, fixed rate registration ends");
                return;
            }
            Err(error) => {
                let _ = ctx.outcomes.send(CycleOutcome::Failed(error.into()));
            }
        }
        next += ctx.period;
    }
}
