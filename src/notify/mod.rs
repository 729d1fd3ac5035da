//! Asynchronous listener notification.

pub mod async_notifier;

pub use async_notifier::{AsyncNotifier, ListenerSource};
