//! Integration tests for fixed-rate and calendar-driven scheduling.
//!
//! These tests validate:
//! 1. Fixed-rate registrations fire repeatedly and report per-cycle outcomes
//! 2. Failing cycles never cancel the schedule
//! 3. Cycles do not overlap, however slow the task is
//! 4. Cancellation stops future fires and disconnects the outcome channel
//! 5. The recurring scheduler walks its lifecycle and computes next fires

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use workforce::builders::ExecutorBuilder;
use workforce::config::{CalendarSpec, ScheduleSpec, TimeUnit};
use workforce::schedule::{next_occurrence, CycleOutcome, RecurringScheduler, ScheduledPool, SchedulerPhase};

fn scheduled_pool(name: &str) -> ScheduledPool {
    ExecutorBuilder::named(name)
        .min_pool_size(1)
        .build_scheduled()
        .unwrap()
}

#[test]
fn test_fixed_rate_fires_repeatedly() {
    let pool = scheduled_pool("metronome");
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);

    let (handle, outcomes) = pool
        .schedule_at_fixed_rate(
            Duration::from_millis(5),
            Duration::from_millis(15),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
        .unwrap();

    for _ in 0..4 {
        let outcome = outcomes.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(outcome, CycleOutcome::Completed));
    }
    handle.cancel();
    assert!(fired.load(Ordering::SeqCst) >= 4);
    assert!(pool.shutdown(Duration::from_secs(5)));
}

#[test]
fn test_failed_cycles_keep_the_schedule_alive() {
    let pool = scheduled_pool("resilient");
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);

    let (handle, outcomes) = pool
        .schedule_at_fixed_rate(
            Duration::from_millis(1),
            Duration::from_millis(10),
            Arc::new(move || {
                let run = counter.fetch_add(1, Ordering::SeqCst);
                anyhow::ensure!(run % 2 == 1, "even runs fail");
                Ok(())
            }),
        )
        .unwrap();

    let first = outcomes.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(matches!(first, CycleOutcome::Failed(_)));
    let second = outcomes.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(matches!(second, CycleOutcome::Completed));

    handle.cancel();
    assert!(pool.shutdown(Duration::from_secs(5)));
}

#[test]
fn test_slow_cycles_never_overlap() {
    // two workers, so only the timer serializes cycles
    let pool = ExecutorBuilder::named("plodding")
        .min_pool_size(2)
        .build_scheduled()
        .unwrap();
    let running = Arc::new(AtomicUsize::new(0));
    let overlapped = Arc::new(AtomicUsize::new(0));
    let in_flight = Arc::clone(&running);
    let clashes = Arc::clone(&overlapped);

    // period shorter than the cycle itself
    let (handle, outcomes) = pool
        .schedule_at_fixed_rate(
            Duration::from_millis(1),
            Duration::from_millis(5),
            Arc::new(move || {
                if in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                    clashes.fetch_add(1, Ordering::SeqCst);
                }
                thread::sleep(Duration::from_millis(25));
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }),
        )
        .unwrap();

    for _ in 0..3 {
        outcomes.recv_timeout(Duration::from_secs(5)).unwrap();
    }
    handle.cancel();
    assert_eq!(overlapped.load(Ordering::SeqCst), 0);
    assert!(pool.shutdown(Duration::from_secs(5)));
}

#[test]
fn test_cancel_stops_future_fires() {
    let pool = scheduled_pool("halted");
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);

    let (handle, outcomes) = pool
        .schedule_at_fixed_rate(
            Duration::from_millis(1),
            Duration::from_millis(10),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
        .unwrap();

    outcomes.recv_timeout(Duration::from_secs(5)).unwrap();
    handle.cancel();

    // the channel disconnects once the timer notices
    while outcomes.recv_timeout(Duration::from_secs(5)).is_ok() {}
    let settled = fired.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(fired.load(Ordering::SeqCst), settled);
    assert!(pool.shutdown(Duration::from_secs(5)));
}

#[test]
fn test_recurring_scheduler_walks_the_lifecycle() {
    let pool = Arc::new(scheduled_pool("calendar"));
    let spec = ScheduleSpec::new("nightly", 1, TimeUnit::Days)
        .with_calendar(CalendarSpec::default().with_hour(2).with_minute(30));
    let scheduler = RecurringScheduler::new(spec, Arc::clone(&pool), || Ok(()));

    scheduler.initialize().unwrap();
    assert_eq!(scheduler.phase(), SchedulerPhase::Initialized);

    scheduler.start().unwrap();
    assert_eq!(scheduler.phase(), SchedulerPhase::Armed);
    assert!(scheduler.start().is_err());

    scheduler.suspend().unwrap();
    scheduler.resume().unwrap();
    scheduler.stop();
    scheduler.stop();
    assert_eq!(scheduler.phase(), SchedulerPhase::Stopped);
    assert!(pool.shutdown(Duration::from_secs(5)));
}

#[test]
fn test_two_schedules_share_one_pool() {
    let pool = Arc::new(scheduled_pool("shared-ticker"));

    let hourly = RecurringScheduler::new(
        ScheduleSpec::new("hourly", 1, TimeUnit::Hours).with_autostart(true),
        Arc::clone(&pool),
        || Ok(()),
    );
    let weekly = RecurringScheduler::new(
        ScheduleSpec::new("weekly", 7, TimeUnit::Days)
            .with_calendar(CalendarSpec::default().with_day(1).with_hour(4)),
        Arc::clone(&pool),
        || Ok(()),
    );

    hourly.initialize().unwrap();
    weekly.initialize().unwrap();
    weekly.start().unwrap();
    assert_eq!(hourly.phase(), SchedulerPhase::Armed);
    assert_eq!(weekly.phase(), SchedulerPhase::Armed);

    hourly.stop();
    weekly.stop();
    assert!(pool.shutdown(Duration::from_secs(5)));
}

#[test]
fn test_next_occurrence_examples() {
    let at = |h: u32, m: u32| {
        NaiveDate::from_ymd_opt(2026, 8, 21)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    };

    // 03:00 is past 02:30, so the fire moves to the next day
    let nightly = CalendarSpec::default().with_hour(2).with_minute(30);
    let next = next_occurrence(at(3, 0), &nightly).unwrap();
    assert_eq!(
        next,
        NaiveDate::from_ymd_opt(2026, 8, 22)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap()
    );

    // 10:20 is past 10:15, so the fire moves to the next hour
    let quarterly = CalendarSpec::default().with_minute(15);
    assert_eq!(next_occurrence(at(10, 20), &quarterly).unwrap(), at(11, 15));
}
