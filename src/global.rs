//! Process-wide telemetry handle.
//!
//! Convenience for applications that want one shared instance without
//! threading a handle through every call site. Nothing forces its use:
//! explicit [`Telemetry`] handles stay first-class, and independent
//! instances (one per test, per tenant) never touch this slot.

use std::sync::{Arc, OnceLock, RwLock};

use crate::trace::Telemetry;
use crate::TelemetryError;

fn slot() -> &'static RwLock<Option<Arc<Telemetry>>> {
    static GLOBAL: OnceLock<RwLock<Option<Arc<Telemetry>>>> = OnceLock::new();
    GLOBAL.get_or_init(|| RwLock::new(None))
}

/// Install `telemetry` as the process-wide instance, returning the shared
/// handle. Replaces any previously installed instance.
pub fn set_telemetry(telemetry: Telemetry) -> Arc<Telemetry> {
    let telemetry = Arc::new(telemetry);
    let mut guard = match slot().write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    *guard = Some(telemetry.clone());
    telemetry
}

/// The process-wide instance. Fails loudly when none has been installed;
/// there is no silent default.
pub fn telemetry() -> Result<Arc<Telemetry>, TelemetryError> {
    let guard = match slot().read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    guard.clone().ok_or(TelemetryError::Uninitialized)
}
