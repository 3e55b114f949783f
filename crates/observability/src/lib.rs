//! Process-wide tracing setup shared by engine hosts, tests and benches.

pub mod subscriber;

pub use subscriber::{LogFormat, LogSettings};

/// Install the default subscriber: JSON lines filtered by `RUST_LOG`
/// (falling back to `info`).
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    subscriber::install(&LogSettings::default());
}

/// Install a compact subscriber writing through the test harness capture.
pub fn init_for_tests() {
    subscriber::install(&LogSettings {
        default_directive: "debug".to_string(),
        format: LogFormat::Compact,
        test_writer: true,
    });
}
