//! Grafana Loki sink pushing records as labeled log lines.

use std::collections::BTreeMap;
use std::time::Duration;

use base64::Engine as _;
use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::TelemetryError;
use crate::export::batch::{BatchConfig, BatchTransport, Batcher};
use crate::export::{Sink, SpanRecord};

fn default_url() -> String {
    "http://localhost:3100".to_string()
}

fn default_labels() -> BTreeMap<String, String> {
    BTreeMap::from([("job".to_string(), "genai-telemetry".to_string())])
}

/// Loki sink settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LokiConfig {
    /// Loki base url; the push path is appended.
    #[serde(default = "default_url")]
    pub url: String,
    /// Multi-tenant organization id, sent as `X-Scope-OrgID`.
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Basic auth user.
    #[serde(default)]
    pub username: Option<String>,
    /// Basic auth password.
    #[serde(default)]
    pub password: Option<String>,
    /// Base labels attached to every stream.
    #[serde(default = "default_labels")]
    pub labels: BTreeMap<String, String>,
    /// Buffering behavior.
    #[serde(flatten)]
    pub batch: BatchConfig,
}

impl Default for LokiConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            tenant_id: None,
            username: None,
            password: None,
            labels: default_labels(),
            batch: BatchConfig::default(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct LokiTransport {
    client: reqwest::Client,
    endpoint: String,
    tenant_id: Option<String>,
    authorization: Option<String>,
    labels: BTreeMap<String, String>,
}

impl LokiTransport {
    fn record_labels(&self, record: &SpanRecord) -> BTreeMap<String, String> {
        let mut labels = self.labels.clone();
        labels.insert("span_type".to_string(), record.span_type.as_str().to_string());
        labels.insert(
            "model_name".to_string(),
            record.model_name.clone().unwrap_or_else(|| "unknown".to_string()),
        );
        labels.insert(
            "workflow_name".to_string(),
            record
                .workflow_name
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
        );
        labels
    }

    /// Group records into one stream per label set, values as
    /// `[ns_timestamp, json_line]` pairs.
    fn payload(&self, batch: &[SpanRecord]) -> Value {
        let mut streams: BTreeMap<String, (BTreeMap<String, String>, Vec<Value>)> =
            BTreeMap::new();
        for record in batch {
            let labels = self.record_labels(record);
            let key = labels
                .iter()
                .map(|(k, v)| format!("{k}=\"{v}\""))
                .collect::<Vec<_>>()
                .join(",");
            let ts_ns = record
                .timestamp
                .timestamp_nanos_opt()
                .unwrap_or_else(|| record.timestamp.timestamp_micros().saturating_mul(1_000));
            let line = serde_json::to_string(record).unwrap_or_default();
            streams
                .entry(key)
                .or_insert_with(|| (labels, Vec::new()))
                .1
                .push(json!([ts_ns.to_string(), line]));
        }
        json!({
            "streams": streams
                .into_values()
                .map(|(stream, values)| json!({"stream": stream, "values": values}))
                .collect::<Vec<_>>(),
        })
    }
}

impl BatchTransport for LokiTransport {
    fn send_batch(&self, batch: Vec<SpanRecord>) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            if batch.is_empty() {
                return true;
            }
            let mut request = self.client.post(&self.endpoint).json(&self.payload(&batch));
            if let Some(tenant) = &self.tenant_id {
                request = request.header("X-Scope-OrgID", tenant);
            }
            if let Some(authorization) = &self.authorization {
                request = request.header("Authorization", authorization);
            }
            match request.send().await {
                Ok(response) if response.status().is_success() => true,
                Ok(response) => {
                    tracing::warn!(status = %response.status(), "loki rejected batch");
                    false
                }
                Err(err) => {
                    tracing::warn!(error = %err, "loki request failed");
                    false
                }
            }
        })
    }
}

/// Sends span records to Grafana Loki as log streams.
#[derive(Debug)]
pub struct LokiSink {
    batcher: Batcher<LokiTransport>,
}

impl LokiSink {
    /// Build the sink. Fails only when the HTTP client cannot be
    /// constructed.
    pub fn new(config: LokiConfig) -> Result<Self, TelemetryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| TelemetryError::Config(format!("loki http client: {err}")))?;
        let authorization = match (&config.username, &config.password) {
            (Some(user), Some(pass)) => {
                let credentials =
                    base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
                Some(format!("Basic {credentials}"))
            }
            _ => None,
        };
        let transport = LokiTransport {
            client,
            endpoint: format!("{}/loki/api/v1/push", config.url.trim_end_matches('/')),
            tenant_id: config.tenant_id,
            authorization,
            labels: config.labels,
        };
        Ok(Self {
            batcher: Batcher::new(transport, config.batch),
        })
    }
}

impl Sink for LokiSink {
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
