//! Configuration models for pools, schedules, and the thread scope.

pub mod spec;

pub use spec::{CalendarSpec, PoolSpec, RegistryConfig, ScheduleSpec, ScopeSpec, TimeUnit};
