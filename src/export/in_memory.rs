//! An in-memory sink that stores exported records, for tests and debugging.

use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;

use crate::export::{Sink, SpanRecord};

/// Stores every exported record in a shared vec.
///
/// Clones share the same storage, so a clone kept by the test observes what
/// the telemetry pipeline exported.
///
/// ```
/// use genai_telemetry::export::{InMemorySink, Sink};
/// # use genai_telemetry::{SpanType, Telemetry};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let sink = InMemorySink::default();
/// let telemetry = Telemetry::builder("demo")
///     .with_sink(Box::new(sink.clone()))
///     .build()
///     .unwrap();
///
/// telemetry.start_span("step", SpanType::Tool, Default::default());
/// telemetry.end_span(None).await;
///
/// assert_eq!(sink.finished_records().len(), 1);
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct InMemorySink {
    records: Arc<Mutex<Vec<SpanRecord>>>,
    healthy: bool,
}

impl Default for InMemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySink {
    /// Create a sink that reports success for every operation.
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
            healthy: true,
        }
    }

    /// Create a sink that accepts records but reports failure, for
    /// exercising partial-failure paths.
    pub fn failing() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
            healthy: false,
        }
    }

    /// Snapshot of everything exported so far.
    pub fn finished_records(&self) -> Vec<SpanRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Drop all stored records.
    pub fn reset(&self) {
        if let Ok(mut records) = self.records.lock() {
            records.clear();
        }
    }
}

impl Sink for InMemorySink {
    fn export(&self, record: SpanRecord) -> BoxFuture<'_, bool> {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
        let healthy = self.healthy;
        Box::pin(async move { healthy })
    }

    fn health_check(&self) -> BoxFuture<'_, bool> {
        let healthy = self.healthy;
        Box::pin(async move { healthy })
    }
}

#[cfg(test)]
pub(crate) fn test_record(name: &str) -> SpanRecord {
    use crate::export::Attributes;
    use crate::trace::{SpanStatus, SpanType};

    SpanRecord {
        trace_id: "0af7651916cd43dd8448eb211c80319c".to_string(),
        span_id: "b7ad6b7169203331".to_string(),
        parent_span_id: None,
        span_type: SpanType::Tool,
        name: name.to_string(),
        workflow_name: Some("test-app".to_string()),
        timestamp: chrono::Utc::now(),
        duration_ms: 1.0,
        status: SpanStatus::Ok,
        is_error: 0,
        error_message: None,
        error_type: None,
        model_name: None,
        model_provider: None,
        input_tokens: None,
        output_tokens: None,
        total_tokens: None,
        temperature: None,
        max_tokens: None,
        embedding_model: None,
        embedding_dimensions: None,
        vector_store: None,
        documents_retrieved: None,
        relevance_score: None,
        tool_name: None,
        agent_name: None,
        agent_type: None,
        attributes: Attributes::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_share_storage() {
        let sink = InMemorySink::new();
        let observer = sink.clone();
        assert!(sink.export(test_record("a")).await);
        assert_eq!(observer.finished_records().len(), 1);
        observer.reset();
        assert!(sink.finished_records().is_empty());
    }

    #[tokio::test]
    async fn failing_sink_keeps_records_but_reports_false() {
        let sink = InMemorySink::failing();
        assert!(!sink.export(test_record("a")).await);
        assert!(!sink.health_check().await);
        assert_eq!(sink.finished_records().len(), 1);
    }
}
