//! # Workforce
//!
//! Named worker pools with pluggable queue disciplines, managed lifecycles,
//! and calendar-driven recurring scheduling.
//!
//! This library provisions pools of dedicated OS threads by name, declared
//! once in typed configuration and built lazily on first use. Pools grow
//! under load, retire idle surplus threads, and drain within a bounded
//! window on disposal. On top of them sit a fixed-rate scheduler with
//! calendar filtering, a per-thread scoped cache with dead-thread sweeping,
//! and an asynchronous listener notifier.
//!
//! ## Core Problem Solved
//!
//! Long-running services accumulate background work with conflicting
//! concurrency needs:
//!
//! - **Unbounded thread creation**: a thread per task exhausts memory exactly when the service is busiest
//! - **One queue fits nothing**: CPU-bound batches, direct handoffs, and urgent jobs want different queue disciplines
//! - **Lifecycle drift**: ad-hoc pools are rarely shut down, and never within a deadline
//! - **Calendar work**: "every day at 02:30" needs calendar arithmetic, not just a fixed period
//!
//! ## Key Features
//!
//! - **Named Pools, Built Once**: a registry hands out exactly one lazily built executor per name, however many threads race for it
//! - **Four Queue Disciplines**: unbounded, bounded, synchronous handoff, and priority ordering with FIFO tie-break
//! - **Elastic Sizing**: pools top up to a core size, overflow to a maximum under pressure, and shrink back after the keep-alive window
//! - **Bounded Teardown**: disposal stops admission, drains within a timeout, then detaches what remains and says so
//! - **Calendar Scheduling**: month / week / day / hour / minute filters with strict next-fire semantics
//! - **Failure Isolation**: a panicking or failing task reaches a failure handler and never kills its pool or schedule
//!
//! ## Worker Pools
//!
//! Declare pools in configuration, fetch executors by name:
//!
//! ```rust,ignore
//! use workforce::config::RegistryConfig;
//! use workforce::core::{ExecutorRegistry, Priority};
//!
//! let config = RegistryConfig::from_json_str(r#"{
//!     "pools": {
//!         "render": { "min_pool_size": 2, "max_pool_size": 8, "queue_mode": "priority" }
//!     }
//! }"#)?;
//! let registry = ExecutorRegistry::from_config(&config)?;
//!
//! // Built on first access, reused afterwards
//! let render = registry.get("render")?;
//! render.execute_prioritized(|| rebuild_thumbnails(), Priority::High)?;
//!
//! // Submit when the result matters
//! let handle = render.submit(|| encode_frame())?;
//! let frame = handle.join()?;
//! ```
//!
//! ## Recurring Schedules
//!
//! Run a task every period, first at the next calendar match:
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use workforce::builders::ExecutorBuilder;
//! use workforce::config::{CalendarSpec, ScheduleSpec, TimeUnit};
//! use workforce::schedule::RecurringScheduler;
//!
//! let pool = Arc::new(ExecutorBuilder::named("nightly").min_pool_size(1).build_scheduled()?);
//! let spec = ScheduleSpec::new("nightly-report", 1, TimeUnit::Days)
//!     .with_calendar(CalendarSpec::default().with_hour(2).with_minute(30))
//!     .with_autostart(true);
//!
//! let scheduler = RecurringScheduler::new(spec, pool, || {
//!     build_report()?;
//!     Ok(())
//! });
//! scheduler.initialize()?;
//! ```
//!
//! For complete examples, see:
//! - `tests/registry_test.rs` - Declaring, building, and disposing pools
//! - `tests/scheduler_test.rs` - Fixed-rate and calendar-driven scheduling

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core pool, queue, registry, and lifecycle abstractions.
pub mod core;
/// Configuration models for pools, schedules, and the thread scope.
pub mod config;
/// Builders to construct pools from configuration.
pub mod builders;
/// Fixed-rate and calendar-driven scheduling.
pub mod schedule;
/// Per-thread scoped values with liveness-based reclamation.
pub mod scope;
/// Asynchronous listener notification.
pub mod notify;
/// Shared utilities.
pub mod util;
