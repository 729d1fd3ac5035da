//! Thread-scoped caching with liveness-based reclamation.

pub mod thread_scope;

pub use thread_scope::ThreadScope;
