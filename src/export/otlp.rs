//! OTLP/HTTP sink, compatible with any OpenTelemetry collector.

use std::collections::BTreeMap;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::TelemetryError;
use crate::export::batch::{BatchConfig, BatchTransport, Batcher};
use crate::export::{Sink, SpanRecord};

fn default_endpoint() -> String {
    "http://localhost:4318".to_string()
}

fn default_service_name() -> String {
    "genai-app".to_string()
}

/// OTLP sink settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OtlpConfig {
    /// Collector endpoint; `/v1/traces` is appended when missing.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Extra headers, typically for authentication.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// `service.name` resource attribute.
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Skip TLS certificate verification.
    #[serde(default)]
    pub insecure_tls: bool,
    /// Buffering behavior.
    #[serde(flatten)]
    pub batch: BatchConfig,
}

impl Default for OtlpConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            headers: BTreeMap::new(),
            service_name: default_service_name(),
            insecure_tls: false,
            batch: BatchConfig::default(),
        }
    }
}

/// Record fields carried outside the OTLP attribute list.
const NON_ATTRIBUTE_KEYS: &[&str] = &[
    "trace_id",
    "span_id",
    "parent_span_id",
    "timestamp",
    "duration_ms",
    "name",
    "status",
];

fn otlp_attribute_value(value: &Value) -> Value {
    match value {
        Value::Bool(b) => json!({"boolValue": b}),
        Value::Number(n) if n.is_i64() || n.is_u64() => json!({"intValue": n.to_string()}),
        Value::Number(n) => json!({"doubleValue": n.as_f64()}),
        Value::String(s) => json!({"stringValue": s}),
        other => json!({"stringValue": other.to_string()}),
    }
}

fn otlp_span(record: &SpanRecord) -> Value {
    let start_ns = record
        .timestamp
        .timestamp_nanos_opt()
        .unwrap_or_else(|| record.timestamp.timestamp_micros().saturating_mul(1_000));
    let end_ns = start_ns + (record.duration_ms * 1e6) as i64;

    let mut attributes = Vec::new();
    if let Value::Object(fields) = serde_json::to_value(record).unwrap_or_default() {
        for (key, value) in fields {
            if NON_ATTRIBUTE_KEYS.contains(&key.as_str()) {
                continue;
            }
            attributes.push(json!({"key": key, "value": otlp_attribute_value(&value)}));
        }
    }

    let mut span = json!({
        "traceId": record.trace_id,
        "spanId": record.span_id,
        "name": record.name,
        // INTERNAL
        "kind": 1,
        "startTimeUnixNano": start_ns.to_string(),
        "endTimeUnixNano": end_ns.to_string(),
        "attributes": attributes,
        "status": {
            "code": if record.is_error == 1 { 2 } else { 1 },
        },
    });
    if let Some(parent) = &record.parent_span_id {
        span["parentSpanId"] = json!(parent);
    }
    span
}

#[derive(Debug)]
pub(crate) struct OtlpTransport {
    client: reqwest::Client,
    endpoint: String,
    headers: BTreeMap<String, String>,
    service_name: String,
}

impl OtlpTransport {
    fn payload(&self, batch: &[SpanRecord]) -> Value {
        json!({
            "resourceSpans": [{
                "resource": {
                    "attributes": [
                        {"key": "service.name", "value": {"stringValue": self.service_name}}
                    ]
                },
                "scopeSpans": [{
                    "scope": {
                        "name": "genai-telemetry",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                    "spans": batch.iter().map(otlp_span).collect::<Vec<_>>(),
                }]
            }]
        })
    }
}

impl BatchTransport for OtlpTransport {
    fn send_batch(&self, batch: Vec<SpanRecord>) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            if batch.is_empty() {
                return true;
            }
            let mut request = self.client.post(&self.endpoint).json(&self.payload(&batch));
            for (key, value) in &self.headers {
                request = request.header(key, value);
            }
            match request.send().await {
                Ok(response) if response.status().is_success() => true,
                Ok(response) => {
                    tracing::warn!(status = %response.status(), "otlp collector rejected batch");
                    false
                }
                Err(err) => {
                    tracing::warn!(error = %err, "otlp request failed");
                    false
                }
            }
        })
    }
}

/// Sends span records to an OpenTelemetry collector as OTLP/HTTP JSON.
#[derive(Debug)]
pub struct OtlpSink {
    batcher: Batcher<OtlpTransport>,
}

impl OtlpSink {
    /// Build the sink. Fails only when the HTTP client cannot be
    /// constructed.
    pub fn new(config: OtlpConfig) -> Result<Self, TelemetryError> {
        let mut endpoint = config.endpoint.trim_end_matches('/').to_string();
        if !endpoint.ends_with("/v1/traces") {
            endpoint.push_str("/v1/traces");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .danger_accept_invalid_certs(config.insecure_tls)
            .build()
            .map_err(|err| TelemetryError::Config(format!("otlp http client: {err}")))?;
        let transport = OtlpTransport {
            client,
            endpoint,
            headers: config.headers,
            service_name: config.service_name,
        };
        Ok(Self {
            batcher: Batcher::new(transport, config.batch),
        })
    }
}

impl Sink for OtlpSink {
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

    #[test]
    fn endpoint_path_is_appended_once() {
        let sink = OtlpSink::new(OtlpConfig::default()).unwrap();
        assert_eq!(
            sink.batcher.transport().endpoint,
            "http://localhost:4318/v1/traces"
        );
        let sink = OtlpSink::new(OtlpConfig {
            endpoint: "http://collector:4318/v1/traces".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            sink.batcher.transport().endpoint,
            "http://collector:4318/v1/traces"
        );
    }

    #[test]
    fn span_carries_identity_and_times() {
        let mut record = test_record("step");
        record.parent_span_id = Some("1111111111111111".to_string());
        record.duration_ms = 2.0;
        let span = otlp_span(&record);
        assert_eq!(span["traceId"], record.trace_id);
        assert_eq!(span["spanId"], record.span_id);
        assert_eq!(span["parentSpanId"], "1111111111111111");
        assert_eq!(span["status"]["code"], 1);
        let start: i64 = span["startTimeUnixNano"].as_str().unwrap().parse().unwrap();
        let end: i64 = span["endTimeUnixNano"].as_str().unwrap().parse().unwrap();
        assert_eq!(end - start, 2_000_000);
    }

    #[test]
    fn error_records_map_to_status_code_two() {
        let mut record = test_record("fail");
        record.status = SpanStatus::Error;
        record.is_error = 1;
        record.error_message = Some("boom".to_string());
        let span = otlp_span(&record);
        assert_eq!(span["status"]["code"], 2);
    }

    #[test]
    fn identity_fields_stay_out_of_attributes() {
        let span = otlp_span(&test_record("step"));
        let attributes = span["attributes"].as_array().unwrap();
        let keys: Vec<&str> = attributes
            .iter()
            .map(|attr| attr["key"].as_str().unwrap())
            .collect();
        assert!(!keys.contains(&"trace_id"));
        assert!(!keys.contains(&"duration_ms"));
        assert!(keys.contains(&"span_type"));
        assert!(keys.contains(&"is_error"));
    }

    #[test]
    fn attribute_values_use_otlp_kinds() {
        assert_eq!(otlp_attribute_value(&json!(true)), json!({"boolValue": true}));
        assert_eq!(otlp_attribute_value(&json!(5)), json!({"intValue": "5"}));
        assert_eq!(otlp_attribute_value(&json!(1.5)), json!({"doubleValue": 1.5}));
        assert_eq!(otlp_attribute_value(&json!("x")), json!({"stringValue": "x"}));
    }

    #[test]
    fn payload_names_the_service() {
        let sink = OtlpSink::new(OtlpConfig::default()).unwrap();
        let payload = sink.batcher.transport().payload(&[test_record("step")]);
        let resource = &payload["resourceSpans"][0]["resource"]["attributes"][0];
        assert_eq!(resource["key"], "service.name");
        assert_eq!(resource["value"]["stringValue"], "genai-app");
    }
}
