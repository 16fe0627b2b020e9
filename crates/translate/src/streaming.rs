//! Stateful translation of Anthropic streaming events into OpenAI chunks.
//!
//! Anthropic numbers content blocks by position in the message (text=0,
//! tool=1, thinking=2, ...) while OpenAI numbers tool calls alone (0, 1,
//! ...). [`StreamContext`] carries the index remapping plus the message
//! metadata that OpenAI repeats on every chunk, and accumulates nothing
//! else; content arrays are never rebuilt.

use crate::response::{map_finish_reason, map_usage, new_response_id};
use claudine_types::StreamError;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Remapping entry for one `tool_use` block.
struct ToolIndexMapping {
    id: String,
    name: String,
    openai_index: u64,
}

/// Per-response state for the streaming translator. Created when a streaming
/// call begins and dropped when the upstream stream ends or the client
/// disconnects; accessed by a single task throughout.
#[derive(Default)]
pub struct StreamContext {
    next_tool_call_index: u64,
    tool_index: HashMap<u64, ToolIndexMapping>,

    /// URLs from web search results keyed by encrypted content, for citation
    /// lookups.
    web_search_urls: HashMap<String, String>,
    citation_numbers: HashMap<String, u32>,
    next_citation_number: u32,
    /// Set after a web search result block so the next text delta gets a
    /// blank line in front of it.
    just_finished_web_search: bool,

    // Message metadata only; content never accumulates here.
    message_id: String,
    model: String,
    stop_reason: Option<String>,
    input_tokens: u64,
    output_tokens: u64,
}

impl StreamContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_citation_number: 1,
            ..Self::default()
        }
    }

    /// Build an OpenAI streaming chunk with this response's metadata.
    fn chunk(&self, delta: Value, finish_reason: Option<&str>, usage: Option<Value>) -> Value {
        let mut chunk = json!({
            "id": self.message_id,
            "object": "chat.completion.chunk",
            "created": 0,
            "model": self.model,
            "choices": [{
                "index": 0,
                "delta": delta,
                "finish_reason": finish_reason,
                "logprobs": null,
            }],
        });
        if let Some(usage) = usage {
            chunk["usage"] = usage;
        }
        chunk
    }
}

/// Translate one Anthropic stream event into at most one OpenAI chunk.
///
/// Event mapping:
/// - `message_start`: capture id/model/usage, emit the role-only chunk
/// - `content_block_start` (tool_use): assign the next OpenAI tool index,
///   emit the initial id/name chunk
/// - `content_block_start` (web_search_tool_result): record result URLs
/// - `content_block_delta`: text, tool-argument, and citation deltas
/// - `message_delta`: capture stop_reason/usage, emit the final chunk
/// - everything else (ping, content_block_stop, message_stop, thinking and
///   signature deltas): dropped
///
/// # Errors
///
/// Returns [`StreamError::UpstreamProtocol`] for upstream `error` events.
pub fn translate_event(
    ctx: &mut StreamContext,
    event: &Value,
) -> Result<Option<Value>, StreamError> {
    match event.get("type").and_then(Value::as_str).unwrap_or("") {
        "message_start" => {
            let message = event.get("message").unwrap_or(&Value::Null);
            ctx.message_id = message
                .get("id")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map_or_else(new_response_id, String::from);
            ctx.model = message
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            if let Some(input) = message.pointer("/usage/input_tokens").and_then(Value::as_u64) {
                ctx.input_tokens = input;
            }

            // OpenAI protocol: the first chunk carries only the role.
            Ok(Some(ctx.chunk(json!({"role": "assistant"}), None, None)))
        }

        "content_block_start" => {
            let index = event.get("index").and_then(Value::as_u64).unwrap_or(0);
            let block = event.get("content_block").unwrap_or(&Value::Null);

            match block.get("type").and_then(Value::as_str).unwrap_or("") {
                "tool_use" => {
                    let id = block.get("id").and_then(Value::as_str).unwrap_or("");
                    let name = block.get("name").and_then(Value::as_str).unwrap_or("");

                    let openai_index = ctx.next_tool_call_index;
                    ctx.next_tool_call_index += 1;
                    ctx.tool_index.insert(
                        index,
                        ToolIndexMapping {
                            id: id.to_string(),
                            name: name.to_string(),
                            openai_index,
                        },
                    );

                    // OpenAI clients expect an initial chunk carrying id and
                    // name with empty arguments before any argument deltas.
                    let mapping = &ctx.tool_index[&index];
                    Ok(Some(ctx.chunk(
                        json!({"tool_calls": [{
                            "index": mapping.openai_index,
                            "id": mapping.id,
                            "type": "function",
                            "function": {"name": mapping.name, "arguments": ""},
                        }]}),
                        None,
                        None,
                    )))
                }

                "web_search_tool_result" => {
                    if let Some(results) = block.get("content").and_then(Value::as_array) {
                        for result in results {
                            let url = result.get("url").and_then(Value::as_str).unwrap_or("");
                            let key = result
                                .get("encrypted_content")
                                .and_then(Value::as_str)
                                .unwrap_or("");
                            if !url.is_empty() && !key.is_empty() {
                                ctx.web_search_urls.insert(key.to_string(), url.to_string());
                            }
                        }
                    }
                    ctx.just_finished_web_search = true;
                    // Citations arrive inline via citations_delta.
                    Ok(None)
                }

                // text content arrives via deltas; server_tool_use and
                // thinking blocks have no client-side counterpart.
                _ => Ok(None),
            }
        }

        "content_block_delta" => {
            let index = event.get("index").and_then(Value::as_u64).unwrap_or(0);
            let delta = event.get("delta").unwrap_or(&Value::Null);

            match delta.get("type").and_then(Value::as_str).unwrap_or("") {
                "text_delta" => {
                    let text = delta.get("text").and_then(Value::as_str).unwrap_or("");
                    if text.is_empty() {
                        return Ok(None);
                    }
                    let text = if ctx.just_finished_web_search {
                        ctx.just_finished_web_search = false;
                        format!("\n\n{text}")
                    } else {
                        text.to_string()
                    };
                    Ok(Some(ctx.chunk(json!({"content": text}), None, None)))
                }

                "input_json_delta" => {
                    // Server-side tools (web search) stream argument deltas
                    // too, but were never registered; drop those.
                    let Some(mapping) = ctx.tool_index.get(&index) else {
                        return Ok(None);
                    };
                    let partial = delta
                        .get("partial_json")
                        .and_then(Value::as_str)
                        .unwrap_or("");
                    Ok(Some(ctx.chunk(
                        json!({"tool_calls": [{
                            "index": mapping.openai_index,
                            "function": {"arguments": partial},
                        }]}),
                        None,
                        None,
                    )))
                }

                "citations_delta" => {
                    let citation = delta.get("citation").unwrap_or(&Value::Null);
                    if citation.get("type").and_then(Value::as_str)
                        != Some("web_search_result_location")
                    {
                        return Ok(None);
                    }
                    let url = citation.get("url").and_then(Value::as_str).unwrap_or("");
                    if url.is_empty() {
                        return Ok(None);
                    }

                    let number = match ctx.citation_numbers.get(url) {
                        Some(n) => *n,
                        None => {
                            let n = ctx.next_citation_number;
                            ctx.citation_numbers.insert(url.to_string(), n);
                            ctx.next_citation_number += 1;
                            n
                        }
                    };

                    // Renders as [N] linking to the source, with a trailing
                    // space separating it from the following text.
                    let content = format!("[[{number}]]({url}) ");
                    Ok(Some(ctx.chunk(json!({"content": content}), None, None)))
                }

                // thinking_delta / signature_delta would corrupt round-trips
                // if surfaced as content.
                _ => Ok(None),
            }
        }

        "message_delta" => {
            if let Some(stop) = event.pointer("/delta/stop_reason").and_then(Value::as_str) {
                ctx.stop_reason = Some(stop.to_string());
            }
            if let Some(output) = event.pointer("/usage/output_tokens").and_then(Value::as_u64) {
                ctx.output_tokens = output;
            }
            if let Some(input) = event.pointer("/usage/input_tokens").and_then(Value::as_u64) {
                ctx.input_tokens = input;
            }

            let finish_reason = map_finish_reason(ctx.stop_reason.as_deref());
            Ok(Some(ctx.chunk(
                json!({}),
                Some(finish_reason),
                Some(map_usage(ctx.input_tokens, ctx.output_tokens)),
            )))
        }

        "error" => {
            let message = event
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("upstream error")
                .to_string();
            Err(StreamError::UpstreamProtocol(message))
        }

        // content_block_stop, message_stop, ping, and future event types.
        _ => Ok(None),
    }
}
