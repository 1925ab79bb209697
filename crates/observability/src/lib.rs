//! Process-wide tracing setup shared by every binary.

/// Tracing subscriber configuration (filter, output format).
pub mod tracing;

pub use crate::tracing::LogFormat;

/// Initialize process-wide tracing from `RUST_LOG` and `LOG_FORMAT`.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    crate::tracing::init(LogFormat::from_env());
}
