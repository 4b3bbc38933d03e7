//! Elasticsearch sink using the bulk API and daily indices.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use base64::Engine as _;
use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;

use crate::error::TelemetryError;
use crate::export::batch::{BatchConfig, BatchTransport, Batcher};
use crate::export::{Sink, SpanRecord};

fn default_hosts() -> Vec<String> {
    vec!["http://localhost:9200".to_string()]
}

fn default_index() -> String {
    "genai-traces".to_string()
}

/// Elasticsearch sink settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ElasticsearchConfig {
    /// Hosts used in round-robin order.
    #[serde(default = "default_hosts")]
    pub hosts: Vec<String>,
    /// Index name prefix; the write date is appended as `-YYYY.MM.DD`.
    #[serde(default = "default_index")]
    pub index: String,
    /// ApiKey authentication. Takes precedence over basic auth.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Basic auth user.
    #[serde(default)]
    pub username: Option<String>,
    /// Basic auth password.
    #[serde(default)]
    pub password: Option<String>,
    /// Skip TLS certificate verification.
    #[serde(default)]
    pub insecure_tls: bool,
    /// Buffering behavior.
    #[serde(flatten)]
    pub batch: BatchConfig,
}

#[derive(Debug)]
pub(crate) struct ElasticsearchTransport {
    client: reqwest::Client,
    hosts: Vec<String>,
    index: String,
    authorization: Option<String>,
    next_host: AtomicUsize,
}

impl ElasticsearchTransport {
    fn next_host(&self) -> &str {
        let i = self.next_host.fetch_add(1, Ordering::Relaxed);
        &self.hosts[i % self.hosts.len()]
    }

    /// Bulk body: alternating index-action and document lines.
    fn bulk_body(&self, batch: &[SpanRecord]) -> String {
        let index_name = format!("{}-{}", self.index, chrono::Utc::now().format("%Y.%m.%d"));
        let mut lines = Vec::with_capacity(batch.len() * 2);
        for record in batch {
            lines.push(json!({"index": {"_index": index_name}}).to_string());
            let mut doc = serde_json::to_value(record).unwrap_or_default();
            if let Some(map) = doc.as_object_mut() {
                map.insert("@timestamp".to_string(), json!(record.timestamp));
            }
            lines.push(doc.to_string());
        }
        lines.join("\n") + "\n"
    }

    fn request(&self, url: String) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        if let Some(authorization) = &self.authorization {
            request = request.header("Authorization", authorization);
        }
        request
    }

    async fn probe(&self) -> bool {
        let url = format!("{}/_cluster/health", self.next_host());
        let mut request = self.client.get(url);
        if let Some(authorization) = &self.authorization {
            request = request.header("Authorization", authorization);
        }
        matches!(request.send().await, Ok(response) if response.status().is_success())
    }
}

impl BatchTransport for ElasticsearchTransport {
    fn send_batch(&self, batch: Vec<SpanRecord>) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            if batch.is_empty() {
                return true;
            }
            let url = format!("{}/_bulk", self.next_host());
            let response = self.request(url).body(self.bulk_body(&batch)).send().await;
            match response {
                Ok(response) if response.status().is_success() => true,
                Ok(response) => {
                    tracing::warn!(status = %response.status(), "elasticsearch rejected bulk request");
                    false
                }
                Err(err) => {
                    tracing::warn!(error = %err, "elasticsearch request failed");
                    false
                }
            }
        })
    }
}

/// Sends span records to Elasticsearch via the bulk API.
#[derive(Debug)]
pub struct ElasticsearchSink {
    batcher: Batcher<ElasticsearchTransport>,
}

impl ElasticsearchSink {
    /// Build the sink. Fails when no host is configured or the HTTP client
    /// cannot be constructed.
    pub fn new(config: ElasticsearchConfig) -> Result<Self, TelemetryError> {
        if config.hosts.is_empty() {
            return Err(TelemetryError::Config(
                "elasticsearch requires at least one host".to_string(),
            ));
        }
        let authorization = match (&config.api_key, &config.username, &config.password) {
            (Some(api_key), _, _) => Some(format!("ApiKey {api_key}")),
            (None, Some(user), Some(pass)) => {
                let credentials =
                    base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
                Some(format!("Basic {credentials}"))
            }
            _ => None,
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .danger_accept_invalid_certs(config.insecure_tls)
            .build()
            .map_err(|err| TelemetryError::Config(format!("elasticsearch http client: {err}")))?;
        let transport = ElasticsearchTransport {
            client,
            hosts: config
                .hosts
                .into_iter()
                .map(|host| host.trim_end_matches('/').to_string())
                .collect(),
            index: config.index,
            authorization,
            next_host: AtomicUsize::new(0),
        };
        Ok(Self {
            batcher: Batcher::new(transport, config.batch),
        })
    }
}

impl Sink for ElasticsearchSink {
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
