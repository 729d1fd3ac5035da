//! Pool, schedule, and scope configuration structures.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::core::queue::QueueStrategy;

/// Wire sentinel for an unbounded maximum pool size.
const UNBOUNDED: i64 = -1;

/// Time unit for configured durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    /// Billionths of a second.
    Nanoseconds,
    /// Millionths of a second.
    Microseconds,
    /// Thousandths of a second.
    Milliseconds,
    /// Whole seconds.
    Seconds,
    /// Sixty seconds.
    Minutes,
    /// Sixty minutes.
    Hours,
    /// Twenty-four hours.
    Days,
}

impl TimeUnit {
    /// Convert `amount` of this unit into a `Duration`, saturating on
    /// overflow.
    #[must_use]
    pub const fn duration(self, amount: u64) -> Duration {
        match self {
            Self::Nanoseconds => Duration::from_nanos(amount),
            Self::Microseconds => Duration::from_micros(amount),
            Self::Milliseconds => Duration::from_millis(amount),
            Self::Seconds => Duration::from_secs(amount),
            Self::Minutes => Duration::from_secs(amount.saturating_mul(60)),
            Self::Hours => Duration::from_secs(amount.saturating_mul(3600)),
            Self::Days => Duration::from_secs(amount.saturating_mul(86400)),
        }
    }
}

/// Immutable configuration bundle for one named worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSpec {
    /// Pool name, unique within a registry. Filled from the map key when
    /// parsed as part of a [`RegistryConfig`].
    #[serde(default)]
    pub name: String,
    /// Threads kept alive even when idle.
    #[serde(default = "default_min_pool_size")]
    pub min_pool_size: usize,
    /// Upper bound on threads; `None` means unbounded (wire sentinel `-1`).
    #[serde(
        default,
        deserialize_with = "de_max_pool_size",
        serialize_with = "ser_max_pool_size"
    )]
    pub max_pool_size: Option<usize>,
    /// Idle time after which threads above the core size retire.
    #[serde(default = "default_keep_alive_time")]
    pub keep_alive_time: u64,
    /// Unit for `keep_alive_time`.
    #[serde(default = "default_seconds")]
    pub keep_alive_time_unit: TimeUnit,
    /// Queue discipline for pending jobs.
    #[serde(default = "default_queue_mode")]
    pub queue_mode: QueueStrategy,
    /// Queue capacity; required for `static`, optional for `blocking`,
    /// rejected for `synchronous` and `priority`.
    pub queue_capacity: Option<usize>,
    /// Bound on the graceful drain during dispose.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
    /// Unit for `shutdown_timeout`.
    #[serde(default = "default_seconds")]
    pub shutdown_timeout_unit: TimeUnit,
}

impl PoolSpec {
    /// Spec named `name` with defaults: core size equal to the logical CPU
    /// count, unbounded maximum, 60 second keep-alive, unbounded blocking
    /// queue, 30 second shutdown drain.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_pool_size: default_min_pool_size(),
            max_pool_size: None,
            keep_alive_time: default_keep_alive_time(),
            keep_alive_time_unit: TimeUnit::Seconds,
            queue_mode: default_queue_mode(),
            queue_capacity: None,
            shutdown_timeout: default_shutdown_timeout(),
            shutdown_timeout_unit: TimeUnit::Seconds,
        }
    }

    /// Set the core pool size.
    #[must_use]
    pub fn with_min_pool_size(mut self, size: usize) -> Self {
        self.min_pool_size = size;
        self
    }

    /// Bound the pool to `size` threads.
    #[must_use]
    pub fn with_max_pool_size(mut self, size: usize) -> Self {
        self.max_pool_size = Some(size);
        self
    }

    /// Set the idle keep-alive window for threads above the core size.
    #[must_use]
    pub fn with_keep_alive(mut self, amount: u64, unit: TimeUnit) -> Self {
        self.keep_alive_time = amount;
        self.keep_alive_time_unit = unit;
        self
    }

    /// Select the queue discipline.
    #[must_use]
    pub fn with_queue_mode(mut self, mode: QueueStrategy) -> Self {
        self.queue_mode = mode;
        self
    }

    /// Bound the queue to `capacity` pending jobs.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Bound the graceful drain during dispose.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, amount: u64, unit: TimeUnit) -> Self {
        self.shutdown_timeout = amount;
        self.shutdown_timeout_unit = unit;
        self
    }

    /// Keep-alive window as a `Duration`.
    #[must_use]
    pub const fn keep_alive(&self) -> Duration {
        self.keep_alive_time_unit.duration(self.keep_alive_time)
    }

    /// Shutdown drain bound as a `Duration`.
    #[must_use]
    pub const fn drain_timeout(&self) -> Duration {
        self.shutdown_timeout_unit.duration(self.shutdown_timeout)
    }

    /// Validate pool configuration values.
    ///
    /// # Errors
    /// Returns a message for an empty name, a maximum below the core size,
    /// or an unsupported queue/capacity combination.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("pool name must not be empty".into());
        }
        if let Some(max) = self.max_pool_size {
            if max == 0 {
                return Err("max_pool_size must be greater than 0 or unbounded".into());
            }
            if max < self.min_pool_size {
                return Err(format!(
                    "max_pool_size {max} is below min_pool_size {}",
                    self.min_pool_size
                ));
            }
        }
        self.queue_mode.check_capacity(self.queue_capacity)?;
        Ok(())
    }
}

/// Calendar filter: the set fields select when a schedule fires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarSpec {
    /// Month of year, 1 = January through 12 = December.
    pub month: Option<u32>,
    /// Week of month, 1-based. Week 1 is the Monday-aligned week containing
    /// the 1st.
    pub week: Option<u32>,
    /// Day of week, 1 = Monday through 7 = Sunday.
    pub day: Option<u32>,
    /// Hour of day, 0 through 23.
    pub hour: Option<u32>,
    /// Minute of hour, 0 through 59; unset behaves as 0.
    pub minute: Option<u32>,
}

impl CalendarSpec {
    /// Fix the month of year.
    #[must_use]
    pub const fn with_month(mut self, month: u32) -> Self {
        self.month = Some(month);
        self
    }

    /// Fix the week of month.
    #[must_use]
    pub const fn with_week(mut self, week: u32) -> Self {
        self.week = Some(week);
        self
    }

    /// Fix the day of week.
    #[must_use]
    pub const fn with_day(mut self, day: u32) -> Self {
        self.day = Some(day);
        self
    }

    /// Fix the hour of day.
    #[must_use]
    pub const fn with_hour(mut self, hour: u32) -> Self {
        self.hour = Some(hour);
        self
    }

    /// Fix the minute of hour.
    #[must_use]
    pub const fn with_minute(mut self, minute: u32) -> Self {
        self.minute = Some(minute);
        self
    }

    /// Validate field ranges.
    ///
    /// # Errors
    /// Returns a message naming the first field out of range.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(month) = self.month {
            if !(1..=12).contains(&month) {
                return Err(format!("month must be 1 through 12, got {month}"));
            }
        }
        if let Some(week) = self.week {
            if !(1..=6).contains(&week) {
                return Err(format!("week must be 1 through 6, got {week}"));
            }
        }
        if let Some(day) = self.day {
            if !(1..=7).contains(&day) {
                return Err(format!("day must be 1 through 7, got {day}"));
            }
        }
        if let Some(hour) = self.hour {
            if hour > 23 {
                return Err(format!("hour must be 0 through 23, got {hour}"));
            }
        }
        if let Some(minute) = self.minute {
            if minute > 59 {
                return Err(format!("minute must be 0 through 59, got {minute}"));
            }
        }
        Ok(())
    }
}

/// Configuration for one recurring schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSpec {
    /// Scheduler name used in logs and errors.
    #[serde(default)]
    pub name: String,
    /// Arm automatically during initialize.
    #[serde(default)]
    pub autostart: bool,
    /// Calendar filter selecting the first occurrence.
    #[serde(flatten)]
    pub calendar: CalendarSpec,
    /// Fixed-rate period between runs.
    pub period: u64,
    /// Unit for `period`.
    pub period_unit: TimeUnit,
}

impl ScheduleSpec {
    /// Spec named `name` repeating every `period` `period_unit`, autostart
    /// off, empty calendar.
    #[must_use]
    pub fn new(name: impl Into<String>, period: u64, period_unit: TimeUnit) -> Self {
        Self {
            name: name.into(),
            autostart: false,
            calendar: CalendarSpec::default(),
            period,
            period_unit,
        }
    }

    /// Arm automatically during initialize.
    #[must_use]
    pub fn with_autostart(mut self, autostart: bool) -> Self {
        self.autostart = autostart;
        self
    }

    /// Use `calendar` for the first occurrence.
    #[must_use]
    pub fn with_calendar(mut self, calendar: CalendarSpec) -> Self {
        self.calendar = calendar;
        self
    }

    /// Period as a `Duration`.
    #[must_use]
    pub const fn period_duration(&self) -> Duration {
        self.period_unit.duration(self.period)
    }

    /// Validate schedule configuration values.
    ///
    /// # Errors
    /// Returns a message for an empty name, a zero period, or calendar
    /// fields out of range.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("schedule name must not be empty".into());
        }
        if self.period == 0 {
            return Err("period must be greater than 0".into());
        }
        self.calendar.validate()
    }
}

/// Configuration for the thread scope sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeSpec {
    /// Time between sweeps of dead thread contexts.
    #[serde(default = "default_sweep_period")]
    pub sweep_period: u64,
    /// Unit for `sweep_period`.
    #[serde(default = "default_seconds")]
    pub sweep_period_unit: TimeUnit,
}

impl Default for ScopeSpec {
    fn default() -> Self {
        Self {
            sweep_period: default_sweep_period(),
            sweep_period_unit: TimeUnit::Seconds,
        }
    }
}

impl ScopeSpec {
    /// Sweep period as a `Duration`.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.sweep_period_unit.duration(self.sweep_period)
    }

    /// Validate scope configuration values.
    ///
    /// # Errors
    /// Returns a message for a zero sweep period.
    pub fn validate(&self) -> Result<(), String> {
        if self.sweep_period == 0 {
            return Err("sweep_period must be greater than 0".into());
        }
        Ok(())
    }
}

/// Root configuration: one pool spec per name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Map of pool name to spec.
    pub pools: HashMap<String, PoolSpec>,
}

impl RegistryConfig {
    /// Validate all pools and ensure at least one pool exists.
    ///
    /// # Errors
    /// Returns the first validation failure, prefixed with the pool name.
    pub fn validate(&self) -> Result<(), String> {
        if self.pools.is_empty() {
            return Err("at least one pool must be defined".into());
        }
        for (name, spec) in &self.pools {
            spec.validate()
                .map_err(|e| format!("pool `{name}` invalid: {e}"))?;
        }
        Ok(())
    }

    /// Parse registry configuration from a JSON string and validate.
    ///
    /// Specs missing a `name` field take the map key as their name.
    ///
    /// # Errors
    /// Returns a message for malformed JSON or an invalid spec.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let mut cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        for (name, spec) in &mut cfg.pools {
            if spec.name.is_empty() {
                spec.name.clone_from(name);
            }
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn default_min_pool_size() -> usize {
    num_cpus::get()
}

const fn default_keep_alive_time() -> u64 {
    60
}

const fn default_shutdown_timeout() -> u64 {
    30
}

const fn default_sweep_period() -> u64 {
    5
}

const fn default_seconds() -> TimeUnit {
    TimeUnit::Seconds
}

const fn default_queue_mode() -> QueueStrategy {
    QueueStrategy::Blocking
}

fn de_max_pool_size<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<i64>::deserialize(deserializer)? {
        None | Some(UNBOUNDED) => Ok(None),
        Some(n) if n >= 0 => usize::try_from(n).map(Some).map_err(serde::de::Error::custom),
        Some(n) => Err(serde::de::Error::custom(format!(
            "max_pool_size must be -1 or non-negative, got {n}"
        ))),
    }
}

fn ser_max_pool_size<S>(value: &Option<usize>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(n) => serializer.serialize_i64(i64::try_from(*n).unwrap_or(i64::MAX)),
        None => serializer.serialize_i64(UNBOUNDED),
    }
}
