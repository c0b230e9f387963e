//! Process-wide tracing setup shared by the washline binaries.

pub mod tracing;

pub use crate::tracing::LogFormat;

/// Initialize tracing/logging from the environment.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init(LogFormat::from_env());
}
