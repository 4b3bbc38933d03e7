//! The normalized span record handed to sinks.
//!
//! Field names on the wire are fixed for backend compatibility; every sink
//! serializes this exact shape (or converts it to its own envelope).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::trace::{SpanStatus, SpanType};

/// Field names that custom attributes may not shadow. A custom key that
/// collides with one of these is discarded when merging into the record.
pub const RESERVED_KEYS: &[&str] = &[
    "trace_id",
    "span_id",
    "parent_span_id",
    "span_type",
    "name",
    "workflow_name",
    "timestamp",
    "duration_ms",
    "status",
    "is_error",
    "error_message",
    "error_type",
    "model_name",
    "model_provider",
    "input_tokens",
    "output_tokens",
    "total_tokens",
    "temperature",
    "max_tokens",
    "embedding_model",
    "embedding_dimensions",
    "vector_store",
    "documents_retrieved",
    "relevance_score",
    "tool_name",
    "agent_name",
    "agent_type",
];

/// Returns true when `key` is part of the fixed record schema.
pub fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// A custom attribute value. The set of permitted kinds is deliberately
/// closed; values are validated at the boundary instead of accepting
/// arbitrary payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// UTF-8 string value.
    Str(String),
    /// Signed integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Boolean value.
    Bool(bool),
}

impl AttributeValue {
    /// Empty strings are dropped at the boundary rather than emitted.
    pub(crate) fn is_empty(&self) -> bool {
        matches!(self, AttributeValue::Str(s) if s.is_empty())
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Str(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Str(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

/// Ordered custom attribute bag merged into the record on export.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// `SpanRecord` contains everything collected for one finished span and is
/// the standard input for every [`Sink`](crate::export::Sink).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanRecord {
    /// Trace identity, 32 lowercase hex characters.
    pub trace_id: String,
    /// Span identity, 16 lowercase hex characters.
    pub span_id: String,
    /// Identity of the span that was open when this one started.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parent_span_id: Option<String>,
    /// Operation classification.
    pub span_type: SpanType,
    /// Operation label.
    pub name: String,
    /// Logical application name.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub workflow_name: Option<String>,
    /// Span start time.
    pub timestamp: DateTime<Utc>,
    /// Elapsed wall-clock time, rounded to two decimal places.
    pub duration_ms: f64,
    /// Span outcome.
    pub status: SpanStatus,
    /// Redundant numeric encoding of `status`, kept for backend
    /// compatibility.
    pub is_error: u8,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    /// Failure message, present only on error spans.
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    /// Failure kind, present only on error spans.
    pub error_type: Option<String>,

    // LLM fields.
    /// Model name.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub model_name: Option<String>,
    /// Model provider label.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub model_provider: Option<String>,
    /// Input (prompt) token count.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub input_tokens: Option<u64>,
    /// Output (completion) token count.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub output_tokens: Option<u64>,
    /// Total token count.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub total_tokens: Option<u64>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub temperature: Option<f64>,
    /// Token limit.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_tokens: Option<u64>,

    // Embedding fields.
    /// Embedding model name.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub embedding_model: Option<String>,
    /// Embedding dimensionality.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub embedding_dimensions: Option<u64>,

    // Retrieval fields.
    /// Vector store name.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub vector_store: Option<String>,
    /// Number of documents returned.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub documents_retrieved: Option<u64>,
    /// Best relevance score.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub relevance_score: Option<f64>,

    // Tool fields.
    /// Tool name.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_name: Option<String>,

    // Agent fields.
    /// Agent name.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub agent_name: Option<String>,
    /// Agent kind.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub agent_type: Option<String>,

    /// Caller-supplied custom attributes, flattened into the record.
    #[serde(flatten)]
    pub attributes: Attributes,
}

impl SpanRecord {
    /// Sanitize a custom attribute bag for merging into a record: reserved
    /// keys and empty string values are dropped.
    pub(crate) fn sanitize_attributes(attributes: Attributes) -> Attributes {
        attributes
            .into_iter()
            .filter(|(key, value)| !is_reserved(key) && !value.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_record() -> SpanRecord {
        SpanRecord {
            trace_id: "0af7651916cd43dd8448eb211c80319c".to_string(),
            span_id: "b7ad6b7169203331".to_string(),
            parent_span_id: None,
            span_type: SpanType::Tool,
            name: "lookup".to_string(),
            workflow_name: Some("rag-app".to_string()),
            timestamp: Utc::now(),
            duration_ms: 12.34,
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
            tool_name: Some("search".to_string()),
            agent_name: None,
            agent_type: None,
            attributes: Attributes::new(),
        }
    }

    #[test]
    fn absent_fields_are_omitted() {
        let value = serde_json::to_value(base_record()).unwrap();
        let map = value.as_object().unwrap();
        assert!(!map.contains_key("error_message"));
        assert!(!map.contains_key("input_tokens"));
        assert!(!map.contains_key("model_name"));
        assert_eq!(map["span_type"], "TOOL");
        assert_eq!(map["status"], "OK");
        assert_eq!(map["is_error"], 0);
        assert_eq!(map["tool_name"], "search");
    }

    #[test]
    fn custom_attributes_are_flattened() {
        let mut record = base_record();
        record
            .attributes
            .insert("user_id".to_string(), AttributeValue::from("u-17"));
        record
            .attributes
            .insert("cache_hit".to_string(), AttributeValue::from(true));
        let value = serde_json::to_value(record).unwrap();
        assert_eq!(value["user_id"], "u-17");
        assert_eq!(value["cache_hit"], true);
    }

    #[test]
    fn sanitize_drops_reserved_and_empty() {
        let mut attributes = Attributes::new();
        attributes.insert("trace_id".to_string(), AttributeValue::from("spoof"));
        attributes.insert("note".to_string(), AttributeValue::from(""));
        attributes.insert("tenant".to_string(), AttributeValue::from("acme"));
        let clean = SpanRecord::sanitize_attributes(attributes);
        assert_eq!(clean.len(), 1);
        assert_eq!(clean["tenant"], AttributeValue::from("acme"));
    }

    #[test]
    fn roundtrips_through_json() {
        let mut record = base_record();
        record
            .attributes
            .insert("retries".to_string(), AttributeValue::from(2_i64));
        let json = serde_json::to_string(&record).unwrap();
        let back: SpanRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
