//! Translates buffered Anthropic Messages responses into OpenAI chat
//! completion format.

use claudine_types::{ResponseTranslator, TranslateError};
use serde_json::{json, Value};

/// Translator from an Anthropic message to an OpenAI chat completion
/// response.
pub struct AnthropicToOpenAi;

/// Map an Anthropic `stop_reason` to an OpenAI `finish_reason`.
pub(crate) fn map_finish_reason(stop_reason: Option<&str>) -> &'static str {
    match stop_reason {
        Some("max_tokens") => "length",
        Some("tool_use") => "tool_calls",
        Some("refusal") => "content_filter",
        // end_turn, stop_sequence, and anything unrecognized.
        _ => "stop",
    }
}

/// Map Anthropic usage counters onto OpenAI's usage object.
pub(crate) fn map_usage(input_tokens: u64, output_tokens: u64) -> Value {
    json!({
        "prompt_tokens": input_tokens,
        "completion_tokens": output_tokens,
        "total_tokens": input_tokens + output_tokens,
    })
}

/// Synthesize a response id when Anthropic did not provide one.
pub(crate) fn new_response_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

impl ResponseTranslator for AnthropicToOpenAi {
    fn translate_response(&self, res: Value) -> Result<Value, TranslateError> {
        let mut text_parts: Vec<&str> = Vec::new();
        let mut tool_calls: Vec<Value> = Vec::new();

        if let Some(blocks) = res.get("content").and_then(Value::as_array) {
            for block in blocks {
                match block.get("type").and_then(Value::as_str).unwrap_or("") {
                    "text" => {
                        if let Some(text) = block.get("text").and_then(Value::as_str) {
                            if !text.is_empty() {
                                text_parts.push(text);
                            }
                        }
                    }
                    "tool_use" => {
                        let id = block.get("id").and_then(Value::as_str).unwrap_or("");
                        let name = block.get("name").and_then(Value::as_str).unwrap_or("");
                        let input = block.get("input").unwrap_or(&Value::Null);
                        let arguments = serde_json::to_string(input)
                            .map_err(|e| TranslateError::InvalidJson(e.to_string()))?;
                        tool_calls.push(json!({
                            "id": id,
                            "type": "function",
                            "function": {"name": name, "arguments": arguments},
                        }));
                    }
                    // thinking, redacted_thinking, server_tool_use, and
                    // web_search_tool_result have no OpenAI equivalent.
                    // Mapping thinking into content would corrupt round-trips:
                    // clients would echo it back as assistant history.
                    _ => {}
                }
            }
        }

        let content = if text_parts.is_empty() {
            Value::Null
        } else {
            Value::String(text_parts.join("\n"))
        };

        let mut message = json!({"role": "assistant", "content": content});
        if !tool_calls.is_empty() {
            message["tool_calls"] = Value::Array(tool_calls);
        }

        let finish_reason = map_finish_reason(res.get("stop_reason").and_then(Value::as_str));

        let id = res
            .get("id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map_or_else(new_response_id, String::from);

        let model = res.get("model").and_then(Value::as_str).unwrap_or("");
        let input_tokens = res
            .pointer("/usage/input_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let output_tokens = res
            .pointer("/usage/output_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0);

        Ok(json!({
            "id": id,
            "object": "chat.completion",
            // The Anthropic response carries no creation timestamp.
            "created": 0,
            "model": model,
            "choices": [{
                "index": 0,
                "message": message,
                "finish_reason": finish_reason,
                "logprobs": null,
            }],
            "usage": map_usage(input_tokens, output_tokens),
        }))
    }
}
