//! Datadog sink sending spans straight to the trace-agent intake API.

use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::TelemetryError;
use crate::export::batch::{BatchConfig, BatchTransport, Batcher};
use crate::export::{Sink, SpanRecord};

fn default_site() -> String {
    "datadoghq.com".to_string()
}

fn default_service_name() -> String {
    "genai-app".to_string()
}

fn default_env() -> String {
    "production".to_string()
}

/// Datadog sink settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DatadogConfig {
    /// Datadog API key.
    pub api_key: String,
    /// Datadog site, e.g. `datadoghq.com` or `datadoghq.eu`.
    #[serde(default = "default_site")]
    pub site: String,
    /// Service name attached to every span.
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Environment tag.
    #[serde(default = "default_env")]
    pub env: String,
    /// Buffering behavior.
    #[serde(flatten)]
    pub batch: BatchConfig,
}

/// Datadog span ids are 64-bit integers; ours are hex strings, so the
/// first 16 hex characters are taken.
fn id_to_u64(id: &str) -> u64 {
    let prefix = &id[..id.len().min(16)];
    u64::from_str_radix(prefix, 16).unwrap_or(0)
}

#[derive(Debug)]
pub(crate) struct DatadogTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    service_name: String,
    env: String,
}

impl DatadogTransport {
    fn dd_span(&self, record: &SpanRecord) -> Value {
        let start_ns = record
            .timestamp
            .timestamp_nanos_opt()
            .unwrap_or_else(|| record.timestamp.timestamp_micros().saturating_mul(1_000));
        let mut span = json!({
            "trace_id": id_to_u64(&record.trace_id),
            "span_id": id_to_u64(&record.span_id),
            "name": record.name,
            "resource": record.name,
            "service": self.service_name,
            "type": "custom",
            "start": start_ns,
            "duration": (record.duration_ms * 1e6) as i64,
            "meta": {
                "env": self.env,
                "span_type": record.span_type.as_str(),
                "model_name": record.model_name.as_deref().unwrap_or(""),
                "model_provider": record.model_provider.as_deref().unwrap_or(""),
                "workflow_name": record.workflow_name.as_deref().unwrap_or(""),
            },
            "metrics": {
                "input_tokens": record.input_tokens.unwrap_or(0),
                "output_tokens": record.output_tokens.unwrap_or(0),
                "duration_ms": record.duration_ms,
            },
        });
        if record.is_error == 1 {
            span["error"] = json!(1);
            span["meta"]["error.message"] = json!(record.error_message.as_deref().unwrap_or(""));
            span["meta"]["error.type"] = json!(record.error_type.as_deref().unwrap_or(""));
        }
        if let Some(parent) = &record.parent_span_id {
            span["parent_id"] = json!(id_to_u64(parent));
        }
        span
    }

    /// Intake expects a list of traces, each a list of spans.
    fn payload(&self, batch: &[SpanRecord]) -> Value {
        Value::Array(
            batch
                .iter()
                .map(|record| Value::Array(vec![self.dd_span(record)]))
                .collect(),
        )
    }
}

impl BatchTransport for DatadogTransport {
    fn send_batch(&self, batch: Vec<SpanRecord>) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            if batch.is_empty() {
                return true;
            }
            let response = self
                .client
                .put(&self.endpoint)
                .header("DD-API-KEY", &self.api_key)
                .json(&self.payload(&batch))
                .send()
                .await;
            match response {
                Ok(response) if response.status().is_success() => true,
                Ok(response) => {
                    tracing::warn!(status = %response.status(), "datadog rejected batch");
                    false
                }
                Err(err) => {
                    tracing::warn!(error = %err, "datadog request failed");
                    false
                }
            }
        })
    }
}

/// Sends span records to the Datadog trace-agent intake.
#[derive(Debug)]
pub struct DatadogSink {
    batcher: Batcher<DatadogTransport>,
}

impl DatadogSink {
    /// Build the sink. Fails when the API key is empty or the HTTP client
    /// cannot be constructed.
    pub fn new(config: DatadogConfig) -> Result<Self, TelemetryError> {
        if config.api_key.is_empty() {
            return Err(TelemetryError::Config(
                "datadog requires api_key".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| TelemetryError::Config(format!("datadog http client: {err}")))?;
        let transport = DatadogTransport {
            client,
            endpoint: format!("https://trace.agent.{}/api/v0.2/traces", config.site),
            api_key: config.api_key,
            service_name: config.service_name,
            env: config.env,
        };
        Ok(Self {
            batcher: Batcher::new(transport, config.batch),
        })
    }
}

impl Sink for DatadogSink {
    fn export(&self, record: SpanRecord) -> BoxFuture<'_, bool> {
        Box::pin(self.batcher.export(record))
    }

    fn export_batch(&self, records: Vec<SpanRecord>) -> BoxFuture<'_, bool> {
        Box::pin(self.batcher.send_now(records))
    }

    fn start(&self) {
        self.batcher.start();
    }

    fn stop(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.batcher.stop())
    }

    fn flush(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.batcher.flush())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::in_memory::test_record;
    use crate::trace::SpanStatus;

    fn sink() -> DatadogSink {
        DatadogSink::new(DatadogConfig {
            api_key: "key".to_string(),
            site: default_site(),
            service_name: default_service_name(),
            env: default_env(),
            batch: BatchConfig::default(),
        })
        .unwrap()
    }

    #[test]
    fn missing_api_key_fails_construction() {
        let result = DatadogSink::new(DatadogConfig {
            api_key: String::new(),
            site: default_site(),
            service_name: default_service_name(),
            env: default_env(),
            batch: BatchConfig::default(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn ids_truncate_to_64_bits() {
        assert_eq!(id_to_u64("00000000000000ff"), 255);
        assert_eq!(id_to_u64("00000000000000ffdeadbeefdeadbeef"), 255);
        assert_eq!(id_to_u64("not-hex"), 0);
    }

    #[test]
    fn span_maps_identity_and_tags() {
        let sink = sink();
        let mut record = test_record("step");
        record.parent_span_id = Some("0000000000000010".to_string());
        let span = sink.batcher.transport().dd_span(&record);
        assert_eq!(span["service"], "genai-app");
        assert_eq!(span["meta"]["env"], "production");
        assert_eq!(span["meta"]["span_type"], "TOOL");
        assert_eq!(span["parent_id"], 16);
        assert!(span.get("error").is_none());
    }

    #[test]
    fn error_spans_carry_error_meta() {
        let sink = sink();
        let mut record = test_record("fail");
        record.status = SpanStatus::Error;
        record.is_error = 1;
        record.error_message = Some("boom".to_string());
        record.error_type = Some("ApiError".to_string());
        let span = sink.batcher.transport().dd_span(&record);
        assert_eq!(span["error"], 1);
        assert_eq!(span["meta"]["error.message"], "boom");
        assert_eq!(span["meta"]["error.type"], "ApiError");
    }

    #[test]
    fn payload_is_one_trace_per_span() {
        let sink = sink();
        let payload = sink
            .batcher
            .transport()
            .payload(&[test_record("a"), test_record("b")]);
        assert_eq!(payload.as_array().unwrap().len(), 2);
        assert_eq!(payload[0].as_array().unwrap().len(), 1);
    }

    #[test]
    fn endpoint_uses_the_site() {
        let sink = sink();
        assert_eq!(
            sink.batcher.transport().endpoint,
            "https://trace.agent.datadoghq.com/api/v0.2/traces"
        );
    }
}
