//! Tracing setup shared by the binaries.

/// Subscriber configuration (filters, output format).
pub mod subscriber;

pub use subscriber::{LogFormat, LoggingConfig};

/// Initialize process-wide logging from the environment.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    subscriber::init(&LoggingConfig::from_env());
}
