//! The trace core: span model, trace identity, the lifecycle manager, and
//! the instrumentation wrappers built on top of it.

mod context;
mod id_generator;
mod span;
mod telemetry;
pub mod wrappers;

pub use context::SpanInfo;
pub use id_generator::{IdGenerator, RandomIdGenerator};
pub use span::{ErrorInfo, Span, SpanAttributes, SpanStatus, SpanType};
pub use telemetry::{SendSpanOptions, Telemetry, TelemetryBuilder};
