//! The telemetry manager: trace identity, span nesting, and delegation to
//! the active sink.

use std::future::Future;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::export::{build_sink, Attributes, ConsoleSink, MultiSink, Sink, SinkConfig, SpanRecord};
use crate::trace::context::{SpanInfo, TraceContext};
use crate::trace::id_generator::{IdGenerator, RandomIdGenerator};
use crate::trace::span::{round2, ErrorInfo, Span, SpanAttributes, SpanStatus, SpanType};
use crate::TelemetryError;

/// Everything a one-shot [`Telemetry::send_span`] may carry besides its
/// type and name.
#[derive(Debug, Clone, Default)]
pub struct SendSpanOptions {
    /// Known duration of the described operation.
    pub duration_ms: Option<f64>,
    /// Start time of the operation; defaults to now.
    pub timestamp: Option<DateTime<Utc>>,
    /// Failure detail; its presence marks the span as an error.
    pub error: Option<ErrorInfo>,
    /// Domain-specific fields.
    pub attrs: SpanAttributes,
    /// Custom attributes merged into the record. Reserved schema names and
    /// empty string values are dropped, not emitted.
    pub attributes: Attributes,
}

/// The trace/span lifecycle manager.
///
/// Owns the active trace id, the LIFO stack of open spans, and the active
/// sink. None of its operations fail the caller's business logic: telemetry
/// errors are contained at the sink boundary.
///
/// One instance assumes at most one logical chain of nested spans open at a
/// time; exports may be issued concurrently from independent call chains.
#[derive(Debug)]
pub struct Telemetry {
    workflow_name: String,
    service_name: String,
    sink: Box<dyn Sink>,
    id_generator: Box<dyn IdGenerator>,
    ctx: Mutex<TraceContext>,
}

impl Telemetry {
    /// Start building a telemetry instance for the given workflow.
    pub fn builder(workflow_name: impl Into<String>) -> TelemetryBuilder {
        TelemetryBuilder {
            workflow_name: workflow_name.into(),
            service_name: None,
            sinks: Vec::new(),
            configs: Vec::new(),
            console: false,
            id_generator: None,
        }
    }

    /// Logical application name stamped on every span.
    pub fn workflow_name(&self) -> &str {
        &self.workflow_name
    }

    /// Service name used by sinks that carry one.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// The active trace id, created lazily on first access.
    pub fn trace_id(&self) -> String {
        let mut ctx = self.lock_ctx();
        ctx.trace_id_or_init(|| self.id_generator.new_trace_id())
    }

    /// Generate a fresh trace id and make it active. The span stack is left
    /// untouched; callers switch traces at chain/agent boundaries where the
    /// stack is empty.
    pub fn new_trace(&self) -> String {
        let trace_id = self.id_generator.new_trace_id();
        self.lock_ctx().replace_trace(trace_id)
    }

    /// The most recently started span still open, or `None`.
    pub fn current_span(&self) -> Option<SpanInfo> {
        self.lock_ctx().current()
    }

    /// Open a span under the current one and make it current. Never blocks
    /// and never fails.
    pub fn start_span(
        &self,
        name: impl Into<String>,
        span_type: SpanType,
        attrs: SpanAttributes,
    ) -> SpanInfo {
        let span_id = self.id_generator.new_span_id();
        let mut ctx = self.lock_ctx();
        let trace_id = ctx.trace_id_or_init(|| self.id_generator.new_trace_id());
        let span = Span::new(
            trace_id.clone(),
            span_id.clone(),
            ctx.parent_id(),
            name.into(),
            span_type,
            Some(self.workflow_name.clone()),
            attrs,
        );
        let info = SpanInfo {
            trace_id,
            span_id,
            parent_span_id: span.parent_span_id().map(String::from),
            name: span.name().to_string(),
            span_type,
        };
        ctx.push(span);
        info
    }

    /// Set a custom attribute on the current open span. No-op when no span
    /// is open; reserved schema names and empty values are ignored.
    pub fn set_span_attribute(
        &self,
        key: impl Into<String>,
        value: impl Into<crate::export::AttributeValue>,
    ) {
        self.lock_ctx()
            .with_current_mut(|span| span.set_attribute(key, value));
    }

    /// Close the current span and export it. A no-op when no span is open.
    ///
    /// The sink's own failure is swallowed here; the sink is responsible
    /// for its own error reporting.
    pub async fn end_span(&self, error: Option<ErrorInfo>) {
        let span = self.lock_ctx().pop();
        let Some(mut span) = span else {
            return;
        };
        span.finish(error);
        let record = span.into_record();
        if !self.sink.export(record).await {
            tracing::debug!("sink reported span export failure");
        }
    }

    /// Build and export a fully-described span in one call, without the
    /// stack-based protocol. The record still takes its parent from the
    /// current stack top so manual and wrapped spans nest correctly.
    pub async fn send_span(
        &self,
        span_type: SpanType,
        name: impl Into<String>,
        options: SendSpanOptions,
    ) -> bool {
        let (trace_id, parent_span_id) = {
            let mut ctx = self.lock_ctx();
            (
                ctx.trace_id_or_init(|| self.id_generator.new_trace_id()),
                ctx.parent_id(),
            )
        };
        let status = if options.error.is_some() {
            SpanStatus::Error
        } else {
            SpanStatus::Ok
        };
        let (error_message, error_type) = match options.error {
            Some(error) => (Some(error.message), Some(error.kind)),
            None => (None, None),
        };
        let (input_tokens, output_tokens, total_tokens) =
            options.attrs.token_fields(span_type);
        let record = SpanRecord {
            trace_id,
            span_id: self.id_generator.new_span_id(),
            parent_span_id,
            span_type,
            name: name.into(),
            workflow_name: Some(self.workflow_name.clone()),
            timestamp: options.timestamp.unwrap_or_else(Utc::now),
            duration_ms: round2(options.duration_ms.unwrap_or(0.0)),
            status,
            is_error: status.as_error_flag(),
            error_message,
            error_type,
            model_name: options.attrs.model_name,
            model_provider: options.attrs.model_provider,
            input_tokens,
            output_tokens,
            total_tokens,
            temperature: options.attrs.temperature,
            max_tokens: options.attrs.max_tokens,
            embedding_model: options.attrs.embedding_model,
            embedding_dimensions: options.attrs.embedding_dimensions,
            vector_store: options.attrs.vector_store,
            documents_retrieved: options.attrs.documents_retrieved,
            relevance_score: options.attrs.relevance_score,
            tool_name: options.attrs.tool_name,
            agent_name: options.attrs.agent_name,
            agent_type: options.attrs.agent_type,
            attributes: SpanRecord::sanitize_attributes(options.attributes),
        };
        self.sink.export(record).await
    }

    /// Run `body` inside a span, guaranteeing exactly one [`end_span`]
    /// call on every exit path. A failure from `body` is recorded on the
    /// span and re-raised unchanged.
    ///
    /// [`end_span`]: Telemetry::end_span
    pub async fn with_span<F, Fut, T, E>(
        &self,
        name: impl Into<String>,
        span_type: SpanType,
        attrs: SpanAttributes,
        body: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.start_span(name, span_type, attrs);
        match body().await {
            Ok(value) => {
                self.end_span(None).await;
                Ok(value)
            }
            Err(error) => {
                self.end_span(Some(ErrorInfo::from_display(&error))).await;
                Err(error)
            }
        }
    }

    /// Force any buffered records out through the active sink.
    pub async fn flush(&self) {
        self.sink.flush().await;
    }

    /// Stop the active sink, flushing whatever it still buffers.
    pub async fn shutdown(&self) {
        self.sink.stop().await;
    }

    /// Probe the active sink's backend(s).
    pub async fn health_check(&self) -> bool {
        self.sink.health_check().await
    }

    fn lock_ctx(&self) -> std::sync::MutexGuard<'_, TraceContext> {
        // The context mutex is never held across an await, so contention is
        // bounded to the synchronous stack operations.
        match self.ctx.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Configures and assembles a [`Telemetry`] instance.
pub struct TelemetryBuilder {
    workflow_name: String,
    service_name: Option<String>,
    sinks: Vec<Box<dyn Sink>>,
    configs: Vec<SinkConfig>,
    console: bool,
    id_generator: Option<Box<dyn IdGenerator>>,
}

impl TelemetryBuilder {
    /// Service name reported by sinks that carry one; defaults to the
    /// workflow name.
    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    /// Add an already-constructed sink.
    pub fn with_sink(mut self, sink: Box<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Add a sink built from declarative configuration.
    pub fn with_sink_config(mut self, config: SinkConfig) -> Self {
        self.configs.push(config);
        self
    }

    /// Also write spans to the console.
    pub fn with_console(mut self) -> Self {
        self.console = true;
        self
    }

    /// Replace the random id generator, e.g. for deterministic tests.
    pub fn with_id_generator(mut self, id_generator: Box<dyn IdGenerator>) -> Self {
        self.id_generator = Some(id_generator);
        self
    }

    /// Assemble the instance. Multiple sinks are composed behind a
    /// [`MultiSink`]; with none configured the console sink is the
    /// default. The final sink is started before this returns.
    pub fn build(self) -> Result<Telemetry, TelemetryError> {
        let mut sinks = self.sinks;
        for config in self.configs {
            sinks.push(build_sink(config)?);
        }
        if self.console || sinks.is_empty() {
            sinks.push(Box::new(ConsoleSink::new()));
        }
        let sink: Box<dyn Sink> = if sinks.len() > 1 {
            Box::new(MultiSink::new(sinks))
        } else {
            sinks.remove(0)
        };
        sink.start();
        Ok(Telemetry {
            service_name: self
                .service_name
                .unwrap_or_else(|| self.workflow_name.clone()),
            workflow_name: self.workflow_name,
            sink,
            id_generator: self
                .id_generator
                .unwrap_or_else(|| Box::new(RandomIdGenerator::default())),
            ctx: Mutex::new(TraceContext::default()),
        })
    }
}

impl std::fmt::Debug for TelemetryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryBuilder")
            .field("workflow_name", &self.workflow_name)
            .field("sinks", &self.sinks.len())
            .field("configs", &self.configs.len())
            .finish()
    }
}
