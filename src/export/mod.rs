//! Span export: the sink contract, batching behavior, and the built-in
//! backend sinks.
//!
//! A sink is the single narrow interface between the trace core and an
//! observability backend: it accepts normalized [`SpanRecord`]s and reports
//! success or failure as a boolean. Transport failures never escape a sink
//! as errors; they are logged and reported as `false`.

use std::fmt;

use futures_util::future::BoxFuture;

mod batch;
mod console;
mod datadog;
mod elasticsearch;
mod factory;
mod file;
mod in_memory;
mod loki;
mod multi;
mod otlp;
mod record;
mod splunk;

pub use batch::BatchConfig;
pub use console::{ConsoleConfig, ConsoleSink};
pub use datadog::{DatadogConfig, DatadogSink};
pub use elasticsearch::{ElasticsearchConfig, ElasticsearchSink};
pub use factory::{build_sink, SinkConfig};
pub use file::{FileConfig, FileSink};
pub use in_memory::InMemorySink;
pub use loki::{LokiConfig, LokiSink};
pub use multi::MultiSink;
pub use otlp::{OtlpConfig, OtlpSink};
pub use record::{is_reserved, AttributeValue, Attributes, SpanRecord, RESERVED_KEYS};
pub use splunk::{SplunkConfig, SplunkSink};

/// The capability set every backend-specific exporter must satisfy,
/// independent of transport.
///
/// Implementations never raise: delivery failure is a `false` return plus
/// the sink's own diagnostic logging. Export calls are safe to issue
/// concurrently from independent call chains; sinks only append to an
/// internal buffer or make an independent outbound call.
pub trait Sink: Send + Sync + fmt::Debug {
    /// Send or enqueue one record. A buffering sink returns `true` on
    /// acceptance, not delivery.
    fn export(&self, record: SpanRecord) -> BoxFuture<'_, bool>;

    /// Send or enqueue a batch of records. The default exports each record
    /// individually and succeeds only if every one succeeds; sinks with a
    /// bulk transport override this.
    fn export_batch(&self, records: Vec<SpanRecord>) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            let mut ok = true;
            for record in records {
                ok &= self.export(record).await;
            }
            ok
        })
    }

    /// Begin any periodic flush work. Idempotent.
    fn start(&self) {}

    /// Cancel periodic work and perform one final flush so no buffered
    /// record is dropped on shutdown. Idempotent: a second call neither
    /// re-sends nor panics.
    fn stop(&self) -> BoxFuture<'_, ()> {
        self.flush()
    }

    /// Send any buffered records now, regardless of the batch-size
    /// threshold.
    fn flush(&self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }

    /// Best-effort liveness probe of the backend. Defaults to healthy for
    /// sinks with no meaningful probe.
    fn health_check(&self) -> BoxFuture<'_, bool> {
        Box::pin(async { true })
    }
}
