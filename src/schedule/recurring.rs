//! Calendar-driven recurring scheduling with failure isolation.

use std::io;
use std::sync::Arc;

use chrono::Local;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::config::ScheduleSpec;
use crate::core::error::{AppResult, PoolError};
use crate::core::thread_factory::ThreadFactory;
use crate::core::worker_pool::{FailureHandler, LoggingFailureHandler};
use crate::schedule::calendar::{delay_until, next_occurrence};
use crate::schedule::fixed_rate::{CycleOutcome, FixedRateHandle, ScheduledPool};
use crate::util::clock::human_duration;

/// Lifecycle phase of a [`RecurringScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    /// Constructed, nothing armed yet.
    Initialized,
    /// A repeating registration is outstanding.
    Armed,
    /// Suspended; can be re-armed with `resume`.
    Suspended,
    /// Stopped for good.
    Stopped,
}

impl SchedulerPhase {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Armed => "armed",
            Self::Suspended => "suspended",
            Self::Stopped => "stopped",
        }
    }
}

struct Inner {
    phase: SchedulerPhase,
    handle: Option<FixedRateHandle>,
}

/// Runs a task on a repeating schedule filtered by a calendar.
///
/// On `start` the next fire instant is computed from the calendar, a
/// fixed-rate registration is armed with that initial delay and the
/// configured period, and a watcher thread drains per-cycle outcomes. A
/// failing or panicking run reaches the failure handler and never cancels
/// future runs.
///
/// Transitions follow `Initialized -> Armed <-> Suspended -> Stopped`;
/// anything else is an illegal-transition error. `stop` is always allowed
/// and never interrupts a run already executing.
pub struct RecurringScheduler {
    spec: ScheduleSpec,
    pool: Arc<ScheduledPool>,
    task: Arc<dyn Fn() -> AppResult<()> + Send + Sync>,
    handler: Arc<dyn FailureHandler>,
    watch_factory: ThreadFactory,
    state: Mutex<Inner>,
}

impl RecurringScheduler {
    /// Scheduler for `task` on `pool`, described by `spec`.
    pub fn new<F>(spec: ScheduleSpec, pool: Arc<ScheduledPool>, task: F) -> Self
    where
        F: Fn() -> AppResult<()> + Send + Sync + 'static,
    {
        let watch_factory = ThreadFactory::new(format!("{}-watch", spec.name));
        Self {
            spec,
            pool,
            task: Arc::new(task),
            handler: Arc::new(LoggingFailureHandler),
            watch_factory,
            state: Mutex::new(Inner {
                phase: SchedulerPhase::Initialized,
                handle: None,
            }),
        }
    }

    /// Deliver failed runs to `handler` instead of the logging default.
    #[must_use]
    pub fn with_failure_handler(mut self, handler: Arc<dyn FailureHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Schedule name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> SchedulerPhase {
        self.state.lock().phase
    }

    /// Validate the spec and arm the schedule when autostart is set.
    ///
    /// # Errors
    /// `Configuration` for an invalid spec; the errors of
    /// [`RecurringScheduler::start`] when autostart arms the schedule.
    pub fn initialize(&self) -> Result<(), PoolError> {
        self.spec.validate().map_err(|e| {
            PoolError::Configuration(format!("schedule `{}` invalid: {e}", self.spec.name))
        })?;
        if self.spec.autostart {
            self.start()
        } else {
            debug!(scheduler = %self.spec.name, "autostart disabled, waiting for start");
            Ok(())
        }
    }

    /// Arm the schedule.
    ///
    /// # Errors
    /// `IllegalTransition` unless the phase is `Initialized`; `Spawn` when a
    /// timer or watcher thread cannot be created.
    pub fn start(&self) -> Result<(), PoolError> {
        let mut inner = self.state.lock();
        match inner.phase {
            SchedulerPhase::Initialized => self.arm(&mut inner),
            other => Err(PoolError::IllegalTransition {
                scheduler: self.spec.name.clone(),
                action: "start",
                phase: other.as_str(),
            }),
        }
    }

    /// Cancel the outstanding registration, keeping the schedule resumable.
    ///
    /// # Errors
    /// `IllegalTransition` unless the phase is `Armed`.
    pub fn suspend(&self) -> Result<(), PoolError> {
        let mut inner = self.state.lock();
        match inner.phase {
            SchedulerPhase::Armed => {
                if let Some(handle) = inner.handle.take() {
                    handle.cancel();
                }
                inner.phase = SchedulerPhase::Suspended;
                info!(scheduler = %self.spec.name, "schedule suspended");
                Ok(())
            }
            other => Err(PoolError::IllegalTransition {
                scheduler: self.spec.name.clone(),
                action: "suspend",
                phase: other.as_str(),
            }),
        }
    }

    /// Recompute the next fire instant and re-arm.
    ///
    /// # Errors
    /// `IllegalTransition` unless the phase is `Suspended`; `Spawn` when a
    /// timer or watcher thread cannot be created.
    pub fn resume(&self) -> Result<(), PoolError> {
        let mut inner = self.state.lock();
        match inner.phase {
            SchedulerPhase::Suspended => self.arm(&mut inner),
            other => Err(PoolError::IllegalTransition {
                scheduler: self.spec.name.clone(),
                action: "resume",
                phase: other.as_str(),
            }),
        }
    }

    /// Cancel future runs without interrupting one in flight. Safe to call
    /// in any phase, repeatedly.
    pub fn stop(&self) {
        let mut inner = self.state.lock();
        if let Some(handle) = inner.handle.take() {
            handle.cancel();
            info!(scheduler = %self.spec.name, "schedule stopped");
        } else {
            debug!(scheduler = %self.spec.name, "nothing armed, nothing to stop");
        }
        inner.phase = SchedulerPhase::Stopped;
    }

    fn arm(&self, inner: &mut Inner) -> Result<(), PoolError> {
        let now = Local::now().naive_local();
        let target = next_occurrence(now, &self.spec.calendar).ok_or_else(|| {
            PoolError::Configuration(format!(
                "schedule `{}` has no next occurrence",
                self.spec.name
            ))
        })?;
        let initial_delay = delay_until(now, target);
        let (amount, unit) = human_duration(initial_delay);
        info!(
            scheduler = %self.spec.name,
            next_run = %target,
            "scheduling first run in {amount} {unit}"
        );
        let (handle, outcomes) = self.pool.schedule_at_fixed_rate(
            initial_delay,
            self.spec.period_duration(),
            Arc::clone(&self.task),
        )?;
        if let Err(error) = self.spawn_watcher(handle.clone(), outcomes) {
            handle.cancel();
            return Err(error.into());
        }
        inner.handle = Some(handle);
        inner.phase = SchedulerPhase::Armed;
        Ok(())
    }

    fn spawn_watcher(
        &self,
        registration: FixedRateHandle,
        outcomes: Receiver<CycleOutcome>,
    ) -> io::Result<()> {
        let scheduler = self.spec.name.clone();
        let handler = Arc::clone(&self.handler);
        self.watch_factory.spawn(move || {
            watch_outcomes(&scheduler, &registration, &outcomes, handler.as_ref());
        })?;
        Ok(())
    }
}

impl Drop for RecurringScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.state.lock().handle.take() {
            handle.cancel();
        }
    }
}

/// Drain cycle outcomes until the registration goes away. Failures reach the
/// handler; cancellation is expected and logged quieter than a dead channel.
fn watch_outcomes(
    scheduler: &str,
    registration: &FixedRateHandle,
    outcomes: &Receiver<CycleOutcome>,
    handler: &dyn FailureHandler,
) {
    for outcome in outcomes {
        match outcome {
            CycleOutcome::Completed => {
                trace!(scheduler = scheduler, "scheduled run completed");
            }
            CycleOutcome::Failed(error) => handler.on_task_failure(scheduler, error),
        }
    }
    if registration.is_cancelled() {
        info!(scheduler = scheduler, "scheduled task cancelled");
    } else {
        warn!(scheduler = scheduler, "outcome channel closed while armed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::ExecutorBuilder;
    use crate::config::TimeUnit;
    use crossbeam_channel::unbounded;

    fn scheduler(name: &str, autostart: bool) -> RecurringScheduler {
        let pool = Arc::new(
            ExecutorBuilder::named(name)
                .min_pool_size(1)
                .build_scheduled()
                .unwrap(),
        );
        let spec = ScheduleSpec::new(name, 1, TimeUnit::Hours).with_autostart(autostart);
        RecurringScheduler::new(spec, pool, || Ok(()))
    }

    #[test]
    fn start_walks_the_lifecycle() {
        let recurring = scheduler("lifecycle", false);
        assert_eq!(recurring.phase(), SchedulerPhase::Initialized);

        recurring.start().unwrap();
        assert_eq!(recurring.phase(), SchedulerPhase::Armed);

        recurring.suspend().unwrap();
        assert_eq!(recurring.phase(), SchedulerPhase::Suspended);

        recurring.resume().unwrap();
        assert_eq!(recurring.phase(), SchedulerPhase::Armed);

        recurring.stop();
        assert_eq!(recurring.phase(), SchedulerPhase::Stopped);
    }

    #[test]
    fn double_start_is_an_illegal_transition() {
        let recurring = scheduler("twice", false);
        recurring.start().unwrap();
        match recurring.start() {
            Err(PoolError::IllegalTransition { action, phase, .. }) => {
                assert_eq!(action, "start");
                assert_eq!(phase, "armed");
            }
            other => panic!("expected an illegal transition, got {other:?}"),
        }
        recurring.stop();
    }

    #[test]
    fn suspend_requires_an_armed_schedule() {
        let recurring = scheduler("idle", false);
        let error = recurring.suspend().unwrap_err();
        assert!(error.to_string().contains("cannot suspend"));
        assert_eq!(recurring.phase(), SchedulerPhase::Initialized);
    }

    #[test]
    fn initialize_honours_autostart() {
        let recurring = scheduler("auto", true);
        recurring.initialize().unwrap();
        assert_eq!(recurring.phase(), SchedulerPhase::Armed);
        recurring.stop();

        let manual = scheduler("manual", false);
        manual.initialize().unwrap();
        assert_eq!(manual.phase(), SchedulerPhase::Initialized);
    }

    #[test]
    fn initialize_rejects_an_invalid_spec() {
        let pool = Arc::new(
            ExecutorBuilder::named("invalid")
                .min_pool_size(1)
                .build_scheduled()
                .unwrap(),
        );
        let spec = ScheduleSpec::new("invalid", 0, TimeUnit::Seconds);
        let recurring = RecurringScheduler::new(spec, pool, || Ok(()));
        assert!(matches!(
            recurring.initialize(),
            Err(PoolError::Configuration(_))
        ));
    }

    #[test]
    fn stop_is_idempotent() {
        let recurring = scheduler("stopper", false);
        recurring.start().unwrap();
        recurring.stop();
        recurring.stop();
        assert_eq!(recurring.phase(), SchedulerPhase::Stopped);
        assert!(matches!(
            recurring.start(),
            Err(PoolError::IllegalTransition { .. })
        ));
    }

    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<String>>,
    }

    impl FailureHandler for RecordingHandler {
        fn on_task_failure(&self, origin: &str, error: anyhow::Error) {
            self.seen.lock().push(format!("{origin}: {error}"));
        }
    }

    #[test]
    fn watcher_routes_failures_to_the_handler() {
        let handler = RecordingHandler::default();
        let registration = FixedRateHandle::new();
        let (tx, rx) = unbounded();
        tx.send(CycleOutcome::Completed).unwrap();
        tx.send(CycleOutcome::Failed(anyhow::anyhow!("boom"))).unwrap();
        registration.cancel();
        drop(tx);

        watch_outcomes("watched", &registration, &rx, &handler);

        let seen = handler.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], "watched: boom");
    }
}
