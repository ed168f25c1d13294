//! Tracing and logging setup shared by every binary.

/// Initialize process-wide JSON logging.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    self::tracing::init_with(LogFormat::Json);
}

pub use self::tracing::{LogFormat, ParseLogFormatError, init_with};

/// Subscriber configuration (filters, formats).
pub mod tracing;
