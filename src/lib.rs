//! Tracing for generative-AI applications.
//!
//! This crate instruments the calls a GenAI application makes (model
//! invocations, embedding calls, vector-store lookups, tool calls, whole
//! pipeline or agent runs) and turns each one into a structured span
//! record, grouped into traces, exported to one or more observability
//! backends.
//!
//! Three layers:
//!
//! * [`trace`] — the span model and the [`Telemetry`] manager that tracks
//!   the active trace id and the stack of open spans, plus the
//!   [`trace::wrappers`] that instrument an async operation in one call.
//! * [`export`] — the [`Sink`](export::Sink) contract and the built-in
//!   sinks (console, JSONL file, Splunk HEC, Elasticsearch, OTLP/HTTP,
//!   Datadog, Loki, in-memory for tests), with shared batching.
//! * [`global`] — an optional process-wide handle for applications that
//!   want a single shared instance.
//!
//! Telemetry never fails the instrumented workload: sink trouble is
//! reported as a boolean and logged, not raised.
//!
//! # Example
//!
//! ```
//! use genai_telemetry::trace::wrappers::{self, LlmParams};
//! use genai_telemetry::Telemetry;
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let telemetry = Telemetry::builder("rag-app").build()?;
//!
//! let answer = wrappers::trace_llm_content(
//!     &telemetry,
//!     "answer_question",
//!     &LlmParams::new("gpt-4o"),
//!     || async {
//!         // Call the model here; any JSON response shape works.
//!         Ok::<_, std::io::Error>(json!({
//!             "choices": [{"message": {"content": "42"}}],
//!             "usage": {"prompt_tokens": 12, "completion_tokens": 1},
//!         }))
//!     },
//! )
//! .await?;
//! assert_eq!(answer, "42");
//!
//! telemetry.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod export;
pub mod extract;
pub mod global;
pub mod trace;

pub use error::TelemetryError;
pub use export::{AttributeValue, Sink, SpanRecord};
pub use trace::{
    ErrorInfo, SendSpanOptions, SpanAttributes, SpanInfo, SpanStatus, SpanType, Telemetry,
    TelemetryBuilder,
};
