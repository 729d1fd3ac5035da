//! Tracing setup for pool and scheduler diagnostics.

/// Install the default env-filtered subscriber unless the host application
/// already set one. Worker and timer threads carry their factory-assigned
/// names, so thread names are part of the output format.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_thread_names(true)
        .try_init();
}
