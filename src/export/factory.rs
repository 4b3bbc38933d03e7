//! Sink construction from declarative configuration.

use serde::Deserialize;
use serde_json::Value;

use crate::error::TelemetryError;
use crate::export::{
    ConsoleConfig, ConsoleSink, DatadogConfig, DatadogSink, ElasticsearchConfig,
    ElasticsearchSink, FileConfig, FileSink, LokiConfig, LokiSink, OtlpConfig, OtlpSink, Sink,
    SplunkConfig, SplunkSink,
};

/// Declarative configuration for one backend sink, tagged by `type`.
///
/// ```
/// use genai_telemetry::export::SinkConfig;
/// use serde_json::json;
///
/// let config = SinkConfig::from_value(json!({
///     "type": "splunk",
///     "url": "http://splunk:8088",
///     "token": "hec-token",
///     "batch_size": 10,
/// }))
/// .unwrap();
/// assert!(matches!(config, SinkConfig::Splunk(_)));
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SinkConfig {
    /// Console output.
    Console(ConsoleConfig),
    /// JSONL file output.
    File(FileConfig),
    /// Splunk HTTP Event Collector.
    Splunk(SplunkConfig),
    /// Elasticsearch bulk API.
    Elasticsearch(ElasticsearchConfig),
    /// OpenTelemetry collector (OTLP/HTTP).
    Otlp(OtlpConfig),
    /// Datadog trace-agent intake.
    Datadog(DatadogConfig),
    /// Grafana Loki push API.
    Loki(LokiConfig),
}

impl SinkConfig {
    /// Parse a configuration value. Unknown `type` tags and missing
    /// required fields are configuration errors.
    pub fn from_value(value: Value) -> Result<Self, TelemetryError> {
        serde_json::from_value(value).map_err(|err| TelemetryError::Config(err.to_string()))
    }
}

/// Construct a sink from its configuration.
///
/// Fails with [`TelemetryError::Config`] when required fields for the
/// backend are missing or empty.
pub fn build_sink(config: SinkConfig) -> Result<Box<dyn Sink>, TelemetryError> {
    Ok(match config {
        SinkConfig::Console(config) => Box::new(ConsoleSink::with_config(config)),
        SinkConfig::File(config) => Box::new(FileSink::with_config(config)),
        SinkConfig::Splunk(config) => Box::new(SplunkSink::new(config)?),
        SinkConfig::Elasticsearch(config) => Box::new(ElasticsearchSink::new(config)?),
        SinkConfig::Otlp(config) => Box::new(OtlpSink::new(config)?),
        SinkConfig::Datadog(config) => Box::new(DatadogSink::new(config)?),
        SinkConfig::Loki(config) => Box::new(LokiSink::new(config)?),
    })
}
