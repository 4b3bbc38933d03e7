//! The mutable span under construction and its finished-record conversion.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::export::{Attributes, SpanRecord};

/// Classification of a traced operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpanType {
    /// A model invocation.
    Llm,
    /// An embedding call.
    Embedding,
    /// A vector-store lookup.
    Retriever,
    /// A tool call.
    Tool,
    /// A multi-step pipeline.
    Chain,
    /// An agent run.
    Agent,
}

impl SpanType {
    /// The wire name of this span type.
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanType::Llm => "LLM",
            SpanType::Embedding => "EMBEDDING",
            SpanType::Retriever => "RETRIEVER",
            SpanType::Tool => "TOOL",
            SpanType::Chain => "CHAIN",
            SpanType::Agent => "AGENT",
        }
    }
}

impl std::fmt::Display for SpanType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a traced operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpanStatus {
    /// The operation completed normally.
    #[default]
    Ok,
    /// The operation failed.
    Error,
}

impl SpanStatus {
    /// The redundant numeric encoding kept for backend compatibility.
    pub fn as_error_flag(&self) -> u8 {
        match self {
            SpanStatus::Ok => 0,
            SpanStatus::Error => 1,
        }
    }

    /// The wire name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanStatus::Ok => "OK",
            SpanStatus::Error => "ERROR",
        }
    }
}

/// Message and kind of a failure recorded on a span.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorInfo {
    /// Human-readable failure message.
    pub message: String,
    /// Short failure kind, typically the error's type name.
    pub kind: String,
}

impl ErrorInfo {
    /// Build error info from an explicit message and kind.
    pub fn new(message: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: kind.into(),
        }
    }

    /// Build error info from any displayable error, using the error's
    /// unqualified type name as its kind.
    pub fn from_display<E: std::fmt::Display>(error: &E) -> Self {
        Self {
            message: error.to_string(),
            kind: short_type_name::<E>().to_string(),
        }
    }
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

/// Domain-specific optional span fields, grouped by span type. Types other
/// than the one a group belongs to simply leave that group unset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpanAttributes {
    /// Model name (LLM).
    pub model_name: Option<String>,
    /// Model provider (LLM).
    pub model_provider: Option<String>,
    /// Input token count (LLM, EMBEDDING).
    pub input_tokens: Option<u64>,
    /// Output token count (LLM).
    pub output_tokens: Option<u64>,
    /// Sampling temperature (LLM).
    pub temperature: Option<f64>,
    /// Token limit (LLM).
    pub max_tokens: Option<u64>,
    /// Embedding model (EMBEDDING).
    pub embedding_model: Option<String>,
    /// Embedding dimensionality (EMBEDDING).
    pub embedding_dimensions: Option<u64>,
    /// Vector store name (RETRIEVER).
    pub vector_store: Option<String>,
    /// Number of documents returned (RETRIEVER).
    pub documents_retrieved: Option<u64>,
    /// Best relevance score (RETRIEVER).
    pub relevance_score: Option<f64>,
    /// Tool name (TOOL).
    pub tool_name: Option<String>,
    /// Agent name (AGENT).
    pub agent_name: Option<String>,
    /// Agent kind (AGENT).
    pub agent_type: Option<String>,
}

impl SpanAttributes {
    /// Token totals for the exported record. LLM records always carry
    /// input/output counts (defaulting to zero); other span types emit
    /// them only when set, and a total only when both parts are known.
    pub(crate) fn token_fields(&self, span_type: SpanType) -> (Option<u64>, Option<u64>, Option<u64>) {
        if span_type == SpanType::Llm {
            let input = self.input_tokens.unwrap_or(0);
            let output = self.output_tokens.unwrap_or(0);
            return (Some(input), Some(output), Some(input + output));
        }
        let total = match (self.input_tokens, self.output_tokens) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        };
        (self.input_tokens, self.output_tokens, total)
    }
}

/// A single timed, named operation within a trace.
///
/// A span is mutable until [`finish`](Span::finish) runs, and only the call
/// frame that opened it may mutate it. An unfinished span is never exported.
#[derive(Debug, Clone)]
pub struct Span {
    trace_id: String,
    span_id: String,
    parent_span_id: Option<String>,
    name: String,
    span_type: SpanType,
    workflow_name: Option<String>,
    started_at: DateTime<Utc>,
    start_instant: Instant,
    duration_ms: Option<f64>,
    status: SpanStatus,
    error: Option<ErrorInfo>,
    attrs: SpanAttributes,
    custom: Attributes,
}

impl Span {
    pub(crate) fn new(
        trace_id: String,
        span_id: String,
        parent_span_id: Option<String>,
        name: String,
        span_type: SpanType,
        workflow_name: Option<String>,
        attrs: SpanAttributes,
    ) -> Self {
        Self {
            trace_id,
            span_id,
            parent_span_id,
            name,
            span_type,
            workflow_name,
            started_at: Utc::now(),
            start_instant: Instant::now(),
            duration_ms: None,
            status: SpanStatus::Ok,
            error: None,
            attrs,
            custom: Attributes::new(),
        }
    }

    /// Trace identity, generated once and never mutated.
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Span identity, generated once and never mutated.
    pub fn span_id(&self) -> &str {
        &self.span_id
    }

    /// Identity of the parent span, if this span is nested.
    pub fn parent_span_id(&self) -> Option<&str> {
        self.parent_span_id.as_deref()
    }

    /// Operation label.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Operation classification.
    pub fn span_type(&self) -> SpanType {
        self.span_type
    }

    /// Whether [`finish`](Span::finish) has run.
    pub fn is_finished(&self) -> bool {
        self.duration_ms.is_some()
    }

    /// Set a custom attribute. Reserved schema names and empty string
    /// values are ignored.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<crate::export::AttributeValue>) {
        let key = key.into();
        let value = value.into();
        if crate::export::is_reserved(&key) || value.is_empty() {
            return;
        }
        self.custom.insert(key, value);
    }

    /// Record a failure on this span.
    pub fn set_error(&mut self, error: ErrorInfo) {
        self.status = SpanStatus::Error;
        self.error = Some(error);
    }

    /// Complete the span, fixing its duration. Passing an error marks the
    /// span failed.
    pub fn finish(&mut self, error: Option<ErrorInfo>) {
        self.duration_ms = Some(round2(self.start_instant.elapsed().as_secs_f64() * 1000.0));
        if let Some(error) = error {
            self.set_error(error);
        }
    }

    /// Convert the finished span into the normalized record.
    pub(crate) fn into_record(self) -> SpanRecord {
        let (input_tokens, output_tokens, total_tokens) = self.attrs.token_fields(self.span_type);
        let (error_message, error_type) = match self.error {
            Some(error) => (Some(error.message), Some(error.kind)),
            None => (None, None),
        };
        SpanRecord {
            trace_id: self.trace_id,
            span_id: self.span_id,
            parent_span_id: self.parent_span_id,
            span_type: self.span_type,
            name: self.name,
            workflow_name: self.workflow_name,
            timestamp: self.started_at,
            duration_ms: self.duration_ms.unwrap_or(0.0),
            status: self.status,
            is_error: self.status.as_error_flag(),
            error_message,
            error_type,
            model_name: self.attrs.model_name,
            model_provider: self.attrs.model_provider,
            input_tokens,
            output_tokens,
            total_tokens,
            temperature: self.attrs.temperature,
            max_tokens: self.attrs.max_tokens,
            embedding_model: self.attrs.embedding_model,
            embedding_dimensions: self.attrs.embedding_dimensions,
            vector_store: self.attrs.vector_store,
            documents_retrieved: self.attrs.documents_retrieved,
            relevance_score: self.attrs.relevance_score,
            tool_name: self.attrs.tool_name,
            agent_name: self.attrs.agent_name,
            agent_type: self.attrs.agent_type,
            attributes: SpanRecord::sanitize_attributes(self.custom),
        }
    }
}

/// Round to two decimal places, the precision used for `duration_ms`.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
