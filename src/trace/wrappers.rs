//! Instrumentation wrappers.
//!
//! Each wrapper runs a caller-supplied async operation and emits exactly
//! one span for it: wall-clock start is recorded, the operation is awaited,
//! kind-specific attributes are extracted from its result, and the finished
//! record goes out through [`Telemetry::send_span`]. A failing operation is
//! recorded as an ERROR span and re-raised unchanged.
//!
//! Chain and agent wrappers are the trace boundaries: they call
//! [`Telemetry::new_trace`] before invoking the operation, so each
//! top-level pipeline or agent run gets its own trace id. The other
//! wrappers only add spans under whatever trace is active.

use std::future::Future;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;

use crate::extract::{extract_content, extract_embedding_tokens, extract_tokens};
use crate::trace::span::{ErrorInfo, SpanAttributes, SpanType};
use crate::trace::telemetry::{SendSpanOptions, Telemetry};

/// Model identity and sampling settings recorded on LLM spans.
#[derive(Debug, Clone)]
pub struct LlmParams {
    /// Model name, e.g. `gpt-4o` or `claude-sonnet-4-5`.
    pub model: String,
    /// Provider label; also selects the content extraction ordering.
    pub provider: String,
    /// Sampling temperature, if known.
    pub temperature: Option<f64>,
    /// Token limit, if known.
    pub max_tokens: Option<u64>,
}

impl LlmParams {
    /// Parameters for the given model, provider `openai`.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            provider: "openai".to_string(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Set the provider label.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Record the sampling temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Record the token limit.
    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    fn attrs(&self) -> SpanAttributes {
        SpanAttributes {
            model_name: Some(self.model.clone()),
            model_provider: Some(self.provider.clone()),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            ..Default::default()
        }
    }
}

/// Vector-store identity recorded on retrieval spans.
#[derive(Debug, Clone, Default)]
pub struct RetrievalParams {
    /// Backing store label, e.g. `pinecone` or `chroma`.
    pub vector_store: Option<String>,
}

impl RetrievalParams {
    /// Parameters naming the backing vector store.
    pub fn new(vector_store: impl Into<String>) -> Self {
        Self {
            vector_store: Some(vector_store.into()),
        }
    }
}

/// Agent identity recorded on agent spans.
#[derive(Debug, Clone)]
pub struct AgentParams {
    /// Agent name, also used as the span name.
    pub name: String,
    /// Agent kind, e.g. `react` or `planner`.
    pub agent_type: Option<String>,
}

impl AgentParams {
    /// Parameters for the named agent.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            agent_type: None,
        }
    }

    /// Set the agent kind.
    pub fn with_agent_type(mut self, agent_type: impl Into<String>) -> Self {
        self.agent_type = Some(agent_type.into());
        self
    }
}

struct Timer {
    started_at: chrono::DateTime<Utc>,
    start: Instant,
}

impl Timer {
    fn begin() -> Self {
        Self {
            started_at: Utc::now(),
            start: Instant::now(),
        }
    }

    fn options(&self, error: Option<ErrorInfo>, attrs: SpanAttributes) -> SendSpanOptions {
        SendSpanOptions {
            duration_ms: Some(self.start.elapsed().as_secs_f64() * 1000.0),
            timestamp: Some(self.started_at),
            error,
            attrs,
            ..Default::default()
        }
    }
}

async fn emit(
    telemetry: &Telemetry,
    span_type: SpanType,
    name: &str,
    timer: &Timer,
    error: Option<ErrorInfo>,
    attrs: SpanAttributes,
) {
    if !telemetry
        .send_span(span_type, name, timer.options(error, attrs))
        .await
    {
        tracing::debug!(name, "sink reported span export failure");
    }
}

/// Run a model invocation and emit an LLM span with token counts taken
/// from the JSON response.
pub async fn trace_llm<F, Fut, E>(
    telemetry: &Telemetry,
    name: &str,
    params: &LlmParams,
    op: F,
) -> Result<Value, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, E>>,
    E: std::fmt::Display,
{
    let timer = Timer::begin();
    match op().await {
        Ok(response) => {
            let (input, output) = extract_tokens(&response);
            let mut attrs = params.attrs();
            attrs.input_tokens = Some(input);
            attrs.output_tokens = Some(output);
            emit(telemetry, SpanType::Llm, name, &timer, None, attrs).await;
            Ok(response)
        }
        Err(error) => {
            let info = ErrorInfo::from_display(&error);
            emit(telemetry, SpanType::Llm, name, &timer, Some(info), params.attrs()).await;
            Err(error)
        }
    }
}

/// Like [`trace_llm`], but returns the extracted text content instead of
/// the raw response. Token counts are still taken from the full response
/// before extraction.
pub async fn trace_llm_content<F, Fut, E>(
    telemetry: &Telemetry,
    name: &str,
    params: &LlmParams,
    op: F,
) -> Result<String, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, E>>,
    E: std::fmt::Display,
{
    let response = trace_llm(telemetry, name, params, op).await?;
    Ok(extract_content(&response, &params.provider))
}

/// Run an embedding call and emit an EMBEDDING span. Input tokens come
/// from the response's usage object when present, defaulting to zero.
pub async fn trace_embedding<F, Fut, E>(
    telemetry: &Telemetry,
    name: &str,
    model: &str,
    op: F,
) -> Result<Value, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, E>>,
    E: std::fmt::Display,
{
    let timer = Timer::begin();
    let attrs = SpanAttributes {
        embedding_model: Some(model.to_string()),
        ..Default::default()
    };
    match op().await {
        Ok(response) => {
            let mut attrs = attrs;
            attrs.input_tokens = Some(extract_embedding_tokens(&response));
            emit(telemetry, SpanType::Embedding, name, &timer, None, attrs).await;
            Ok(response)
        }
        Err(error) => {
            let info = ErrorInfo::from_display(&error);
            emit(telemetry, SpanType::Embedding, name, &timer, Some(info), attrs).await;
            Err(error)
        }
    }
}

/// Run a vector-store lookup and emit a RETRIEVER span with the number of
/// documents returned.
pub async fn trace_retrieval<F, Fut, D, E>(
    telemetry: &Telemetry,
    name: &str,
    params: &RetrievalParams,
    op: F,
) -> Result<Vec<D>, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<D>, E>>,
    E: std::fmt::Display,
{
    let timer = Timer::begin();
    let base = SpanAttributes {
        vector_store: params.vector_store.clone(),
        ..Default::default()
    };
    match op().await {
        Ok(documents) => {
            let mut attrs = base;
            attrs.documents_retrieved = Some(documents.len() as u64);
            emit(telemetry, SpanType::Retriever, name, &timer, None, attrs).await;
            Ok(documents)
        }
        Err(error) => {
            let info = ErrorInfo::from_display(&error);
            emit(telemetry, SpanType::Retriever, name, &timer, Some(info), base).await;
            Err(error)
        }
    }
}

/// Run a tool invocation and emit a TOOL span.
pub async fn trace_tool<F, Fut, T, E>(
    telemetry: &Telemetry,
    tool_name: &str,
    op: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let timer = Timer::begin();
    let attrs = SpanAttributes {
        tool_name: Some(tool_name.to_string()),
        ..Default::default()
    };
    match op().await {
        Ok(value) => {
            emit(telemetry, SpanType::Tool, tool_name, &timer, None, attrs).await;
            Ok(value)
        }
        Err(error) => {
            let info = ErrorInfo::from_display(&error);
            emit(telemetry, SpanType::Tool, tool_name, &timer, Some(info), attrs).await;
            Err(error)
        }
    }
}

/// Run a pipeline step and emit a CHAIN span under a fresh trace id.
pub async fn trace_chain<F, Fut, T, E>(
    telemetry: &Telemetry,
    name: &str,
    op: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    telemetry.new_trace();
    let timer = Timer::begin();
    match op().await {
        Ok(value) => {
            emit(telemetry, SpanType::Chain, name, &timer, None, SpanAttributes::default()).await;
            Ok(value)
        }
        Err(error) => {
            let info = ErrorInfo::from_display(&error);
            emit(telemetry, SpanType::Chain, name, &timer, Some(info), SpanAttributes::default())
                .await;
            Err(error)
        }
    }
}

/// Run an agent turn and emit an AGENT span under a fresh trace id.
pub async fn trace_agent<F, Fut, T, E>(
    telemetry: &Telemetry,
    params: &AgentParams,
    op: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    telemetry.new_trace();
    let timer = Timer::begin();
    let attrs = SpanAttributes {
        agent_name: Some(params.name.clone()),
        agent_type: params.agent_type.clone(),
        ..Default::default()
    };
    match op().await {
        Ok(value) => {
            emit(telemetry, SpanType::Agent, &params.name, &timer, None, attrs).await;
            Ok(value)
        }
        Err(error) => {
            let info = ErrorInfo::from_display(&error);
            emit(telemetry, SpanType::Agent, &params.name, &timer, Some(info), attrs).await;
            Err(error)
        }
    }
}
