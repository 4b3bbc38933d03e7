//! Console sink for debugging and development.

use futures_util::future::BoxFuture;
use serde::Deserialize;

use crate::export::{Sink, SpanRecord};
use crate::trace::{SpanStatus, SpanType};

fn default_colored() -> bool {
    true
}

/// Console sink settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleConfig {
    /// Use ANSI colors in the output.
    #[serde(default = "default_colored")]
    pub colored: bool,
    /// Additionally print the full record as indented JSON.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            colored: true,
            verbose: false,
        }
    }
}

/// Prints one formatted line per record to stdout. Always succeeds.
#[derive(Debug, Default)]
pub struct ConsoleSink {
    config: ConsoleConfig,
}

const RESET: &str = "\x1b[0m";
const GREEN: &str = "\x1b[92m";
const RED: &str = "\x1b[91m";

fn type_color(span_type: SpanType) -> &'static str {
    match span_type {
        SpanType::Llm => "\x1b[94m",
        SpanType::Embedding => "\x1b[95m",
        SpanType::Retriever => "\x1b[96m",
        SpanType::Tool => "\x1b[93m",
        SpanType::Chain => GREEN,
        SpanType::Agent => RED,
    }
}

impl ConsoleSink {
    /// Console sink with default settings (colored, not verbose).
    pub fn new() -> Self {
        Self::default()
    }

    /// Console sink with explicit settings.
    pub fn with_config(config: ConsoleConfig) -> Self {
        Self { config }
    }

    fn format_line(&self, record: &SpanRecord) -> String {
        let model = record.model_name.as_deref().unwrap_or("");
        let input = record.input_tokens.unwrap_or(0);
        let output = record.output_tokens.unwrap_or(0);
        let total = input + output;
        if self.config.colored {
            let status_color = match record.status {
                SpanStatus::Ok => GREEN,
                SpanStatus::Error => RED,
            };
            format!(
                "{}[{:<12}]{} {:<30} | {:>8.1}ms | {}{:<5}{} | {} | in:{} out:{} total:{}",
                type_color(record.span_type),
                record.span_type.as_str(),
                RESET,
                record.name,
                record.duration_ms,
                status_color,
                record.status.as_str(),
                RESET,
                model,
                input,
                output,
                total,
            )
        } else {
            format!(
                "[{:<12}] {:<30} | {:>8.1}ms | {:<5} | {} | in:{} out:{} total:{}",
                record.span_type.as_str(),
                record.name,
                record.duration_ms,
                record.status.as_str(),
                model,
                input,
                output,
                total,
            )
        }
    }
}

impl Sink for ConsoleSink {
    fn export(&self, record: SpanRecord) -> BoxFuture<'_, bool> {
        println!("{}", self.format_line(&record));
        if self.config.verbose {
            if let Ok(json) = serde_json::to_string_pretty(&record) {
                println!("    {json}");
            }
        }
        Box::pin(async { true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::in_memory::test_record;

    #[test]
    fn plain_line_carries_the_essentials() {
        let sink = ConsoleSink::with_config(ConsoleConfig {
            colored: false,
            verbose: false,
        });
        let mut record = test_record("summarize");
        record.model_name = Some("gpt-4o".to_string());
        record.input_tokens = Some(10);
        record.output_tokens = Some(4);
        let line = sink.format_line(&record);
        assert!(line.contains("TOOL"));
        assert!(line.contains("summarize"));
        assert!(line.contains("gpt-4o"));
        assert!(line.contains("in:10 out:4 total:14"));
        assert!(!line.contains("\x1b["));
    }

    #[test]
    fn colored_line_marks_errors_red() {
        let sink = ConsoleSink::new();
        let mut record = test_record("fail");
        record.status = SpanStatus::Error;
        record.is_error = 1;
        let line = sink.format_line(&record);
        assert!(line.contains(RED));
        assert!(line.contains("ERROR"));
    }

    #[tokio::test]
    async fn export_always_succeeds() {
        let sink = ConsoleSink::new();
        assert!(sink.export(test_record("ok")).await);
    }
}
