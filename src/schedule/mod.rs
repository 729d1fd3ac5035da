//! Fixed-rate repetition and calendar-driven recurring schedules.

pub mod calendar;
pub mod fixed_rate;
pub mod recurring;

pub use calendar::next_occurrence;
pub use fixed_rate::{CycleOutcome, FixedRateHandle, RepeatingTask, ScheduledPool};
pub use recurring::{RecurringScheduler, SchedulerPhase};
