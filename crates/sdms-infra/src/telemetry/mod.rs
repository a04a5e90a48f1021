//! Telemetry initialization
//!
//! Installs the global tracing subscriber: an `EnvFilter` (from `RUST_LOG`,
//! falling back to the configured directive) and a pretty or JSON fmt layer.

mod init_basic;

pub use init_basic::{init_telemetry, shutdown_telemetry, TelemetryConfig};
