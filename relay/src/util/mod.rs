//! Process-level helpers for the relay binary.
//!
//! | Module | Description | Feature |
//! |--------|-------------|---------|
//! | [`sig_down`] | Graceful shutdown on SIGTERM/SIGINT | - |
//! | [`telemetry`] | Logging and OpenTelemetry export | `telemetry` |

pub mod sig_down;
#[cfg(feature = "telemetry")]
pub mod telemetry;

pub use sig_down::*;
#[cfg(feature = "telemetry")]
pub use telemetry::*;
