//! Token and content extraction from provider response payloads.
//!
//! Responses are consumed as [`serde_json::Value`] so one code path covers
//! every provider SDK's JSON shape. Each extractor is an ordered list of
//! named strategies tried in a fixed priority order until one matches.

use serde_json::Value;

type TokenStrategy = fn(&Value) -> Option<(u64, u64)>;

/// Token strategies in priority order. The first matching shape wins.
const TOKEN_STRATEGIES: &[(&str, TokenStrategy)] = &[
    ("openai-usage", openai_usage),
    ("anthropic-usage", anthropic_usage),
    ("total-split", total_usage),
    ("usage-metadata", usage_metadata),
];

/// Extract `(input_tokens, output_tokens)` from an LLM response payload.
///
/// Recognizes, in order: an OpenAI-style usage object
/// (`prompt_tokens`/`completion_tokens`), an Anthropic-style usage object
/// (`input_tokens`/`output_tokens`), a bare `total_tokens` count split
/// evenly (floor to input, ceil to output), and a nested
/// `usageMetadata` block. Returns `(0, 0)` when nothing matches.
pub fn extract_tokens(response: &Value) -> (u64, u64) {
    TOKEN_STRATEGIES
        .iter()
        .find_map(|(_, strategy)| strategy(response))
        .unwrap_or((0, 0))
}

fn openai_usage(response: &Value) -> Option<(u64, u64)> {
    let usage = response.get("usage")?;
    let input = usage.get("prompt_tokens")?.as_u64()?;
    let output = usage
        .get("completion_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    Some((input, output))
}

fn anthropic_usage(response: &Value) -> Option<(u64, u64)> {
    let usage = response.get("usage")?;
    let input = usage.get("input_tokens")?.as_u64()?;
    let output = usage
        .get("output_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    Some((input, output))
}

fn total_usage(response: &Value) -> Option<(u64, u64)> {
    let total = response.get("usage")?.get("total_tokens")?.as_u64()?;
    Some((total / 2, total - total / 2))
}

fn usage_metadata(response: &Value) -> Option<(u64, u64)> {
    let usage = response.get("usageMetadata")?;
    let input = usage.get("promptTokenCount")?.as_u64()?;
    let output = usage
        .get("candidatesTokenCount")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    Some((input, output))
}

/// Extract the input token count from an embedding response's usage object,
/// preferring `prompt_tokens` and falling back to `total_tokens`.
pub fn extract_embedding_tokens(response: &Value) -> u64 {
    let usage = match response.get("usage") {
        Some(usage) => usage,
        None => return 0,
    };
    usage
        .get("prompt_tokens")
        .and_then(Value::as_u64)
        .filter(|n| *n > 0)
        .or_else(|| usage.get("total_tokens").and_then(Value::as_u64))
        .unwrap_or(0)
}

type ContentStrategy = fn(&Value) -> Option<String>;

const OPENAI_CONTENT: &[(&str, ContentStrategy)] = &[
    ("openai-chat", openai_chat_content),
    ("openai-legacy", openai_legacy_content),
    ("anthropic-blocks", anthropic_blocks_content),
];

const ANTHROPIC_CONTENT: &[(&str, ContentStrategy)] = &[
    ("anthropic-blocks", anthropic_blocks_content),
    ("openai-chat", openai_chat_content),
    ("openai-legacy", openai_legacy_content),
];

/// Extract text content from an LLM response payload.
///
/// Provider-aware: Anthropic-style providers try the content-block array
/// first, everything else tries the OpenAI choices array first. A plain
/// JSON string passes through unchanged, and the final fallback serializes
/// the whole payload.
pub fn extract_content(response: &Value, provider: &str) -> String {
    if let Value::String(text) = response {
        return text.clone();
    }
    let provider = provider.to_ascii_lowercase();
    let strategies = if provider.contains("anthropic") || provider.contains("claude") {
        ANTHROPIC_CONTENT
    } else {
        OPENAI_CONTENT
    };
    strategies
        .iter()
        .find_map(|(_, strategy)| strategy(response))
        .unwrap_or_else(|| response.to_string())
}

fn openai_chat_content(response: &Value) -> Option<String> {
    let choice = response.get("choices")?.get(0)?;
    choice
        .get("message")?
        .get("content")
        .and_then(Value::as_str)
        .map(String::from)
}

fn openai_legacy_content(response: &Value) -> Option<String> {
    response
        .get("choices")?
        .get(0)?
        .get("text")
        .and_then(Value::as_str)
        .map(String::from)
}

fn anthropic_blocks_content(response: &Value) -> Option<String> {
    let blocks = response.get("content")?.as_array()?;
    let text: String = blocks
        .iter()
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect();
    Some(text)
}
