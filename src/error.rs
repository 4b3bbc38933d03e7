//! Errors surfaced by the telemetry setup path.
//!
//! Transport failures are deliberately absent here: a sink reports delivery
//! failure as a `false` return plus its own diagnostic logging, and that
//! boolean is swallowed before it can reach the instrumented workload.

use thiserror::Error;

/// Errors raised while setting up or looking up telemetry.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TelemetryError {
    /// A sink configuration was missing required settings or named an
    /// unknown backend. Raised synchronously at construction time.
    #[error("invalid sink configuration: {0}")]
    Config(String),

    /// The process-wide telemetry handle was requested before setup ran.
    #[error("telemetry has not been initialized; build a `Telemetry` and call `global::set_telemetry` first")]
    Uninitialized,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_displays_detail() {
        let err = TelemetryError::Config("splunk requires url and token".to_string());
        assert_eq!(
            err.to_string(),
            "invalid sink configuration: splunk requires url and token"
        );
    }
}
