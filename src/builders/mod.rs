//! Builders assembling pools from specs.

pub mod executor_builder;

pub use executor_builder::ExecutorBuilder;
