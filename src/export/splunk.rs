//! Splunk HTTP Event Collector (HEC) sink.

use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;

use crate::error::TelemetryError;
use crate::export::batch::{BatchConfig, BatchTransport, Batcher};
use crate::export::{Sink, SpanRecord};

fn default_index() -> String {
    "genai_traces".to_string()
}

fn default_sourcetype() -> String {
    "genai:trace".to_string()
}

/// Splunk HEC sink settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SplunkConfig {
    /// HEC base url, e.g. `http://splunk:8088`. The collector path is
    /// appended when missing.
    pub url: String,
    /// HEC authentication token.
    pub token: String,
    /// Index events are written to.
    #[serde(default = "default_index")]
    pub index: String,
    /// Sourcetype assigned to events.
    #[serde(default = "default_sourcetype")]
    pub sourcetype: String,
    /// Skip TLS certificate verification.
    #[serde(default)]
    pub insecure_tls: bool,
    /// Buffering behavior.
    #[serde(flatten)]
    pub batch: BatchConfig,
}

#[derive(Debug)]
pub(crate) struct SplunkTransport {
    client: reqwest::Client,
    endpoint: String,
    token: String,
    index: String,
    sourcetype: String,
}

impl SplunkTransport {
    /// HEC takes newline-separated event envelopes in one request body.
    fn envelope(&self, record: &SpanRecord) -> serde_json::Value {
        json!({
            "index": self.index,
            "sourcetype": self.sourcetype,
            "source": "genai-telemetry",
            "event": record,
        })
    }

    async fn send_payload(&self, payload: String) -> bool {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Splunk {}", self.token))
            .header("Content-Type", "application/json")
            .body(payload)
            .send()
            .await;
        match response {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!(status = %response.status(), "splunk hec rejected batch");
                false
            }
            Err(err) => {
                tracing::warn!(error = %err, "splunk hec request failed");
                false
            }
        }
    }

    async fn probe(&self) -> bool {
        let event = json!({
            "sourcetype": "genai:health",
            "event": "health_check",
        });
        self.send_payload(event.to_string()).await
    }
}

impl BatchTransport for SplunkTransport {
    fn send_batch(&self, batch: Vec<SpanRecord>) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            if batch.is_empty() {
                return true;
            }
            let payload = batch
                .iter()
                .map(|record| self.envelope(record).to_string())
                .collect::<Vec<_>>()
                .join("\n");
            self.send_payload(payload).await
        })
    }
}

/// Sends span records to Splunk via the HTTP Event Collector.
#[derive(Debug)]
pub struct SplunkSink {
    batcher: Batcher<SplunkTransport>,
}

impl SplunkSink {
    /// Build the sink. Fails when the url or token is empty or the HTTP
    /// client cannot be constructed.
    pub fn new(config: SplunkConfig) -> Result<Self, TelemetryError> {
        if config.url.is_empty() || config.token.is_empty() {
            return Err(TelemetryError::Config(
                "splunk requires url and token".to_string(),
            ));
        }
        let mut endpoint = config.url.trim_end_matches('/').to_string();
        if !endpoint.ends_with("/services/collector/event") {
            endpoint.push_str("/services/collector/event");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .danger_accept_invalid_certs(config.insecure_tls)
            .build()
            .map_err(|err| TelemetryError::Config(format!("splunk http client: {err}")))?;
        let transport = SplunkTransport {
            client,
            endpoint,
            token: config.token,
            index: config.index,
            sourcetype: config.sourcetype,
        };
        Ok(Self {
            batcher: Batcher::new(transport, config.batch),
        })
    }
}

impl Sink for SplunkSink {
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

    fn health_check(&self) -> BoxFuture<'_, bool> {
        Box::pin(self.batcher.transport().probe())
    }
}
