//! Translates OpenAI chat completion requests into Anthropic Messages format.
//!
//! The transformation runs in three steps: each OpenAI message becomes an
//! intermediate `TransformedMessage` preserving conversation order,
//! consecutive tool results are merged into single user messages to satisfy
//! Anthropic's strict role alternation, and system/developer blocks are
//! hoisted into the top-level `system` field.

use claudine_types::{RequestTranslator, TranslateError};
use serde_json::{json, Value};

/// Environment variable that force-enables the Anthropic web search server
/// tool for every request.
pub const WEB_SEARCH_ENV: &str = "CLAUDINE_ENABLE_WEB_SEARCH";

/// Anthropic requires `max_tokens`; used when the client specifies neither
/// `max_completion_tokens` nor the deprecated `max_tokens`.
const DEFAULT_MAX_TOKENS: u64 = 8192;

/// Translator from OpenAI chat completion requests to Anthropic Messages
/// requests.
pub struct OpenAiToAnthropic {
    web_search: bool,
}

impl OpenAiToAnthropic {
    /// Translator with web search controlled solely by the request body.
    #[must_use]
    pub fn new() -> Self {
        Self { web_search: false }
    }

    /// Read the web-search override from the environment. The variable is
    /// consulted per construction (one per request) so tests can toggle it
    /// without restarting the process.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            web_search: std::env::var(WEB_SEARCH_ENV).is_ok_and(|v| v == "true"),
        }
    }
}

impl Default for OpenAiToAnthropic {
    fn default() -> Self {
        Self::new()
    }
}

/// A single OpenAI message after conversion, before hoisting. `payload` is a
/// `{"type":"text",...}` block for system/developer roles and a full message
/// param for user/assistant/tool roles.
struct TransformedMessage {
    role: String,
    payload: Value,
}

impl RequestTranslator for OpenAiToAnthropic {
    fn translate_request(&self, req: Value) -> Result<Value, TranslateError> {
        let model = req
            .get("model")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| TranslateError::InvalidRequest("model is required".into()))?
            .to_string();

        let messages = req
            .get("messages")
            .and_then(Value::as_array)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| {
                TranslateError::InvalidRequest("messages array cannot be empty".into())
            })?;

        let transformed = transform_messages(messages)?;
        let transformed = merge_consecutive_tool_messages(transformed);
        let (system, messages) = hoist_system_prompts(transformed);

        let mut out = serde_json::Map::new();
        out.insert("model".into(), Value::String(model));

        let max_tokens = req
            .get("max_completion_tokens")
            .and_then(Value::as_u64)
            .or_else(|| req.get("max_tokens").and_then(Value::as_u64))
            .unwrap_or(DEFAULT_MAX_TOKENS);
        out.insert("max_tokens".into(), max_tokens.into());
        out.insert("messages".into(), Value::Array(messages));

        if !system.is_empty() {
            out.insert("system".into(), Value::Array(system));
        }

        // Sampling parameters are copied as raw JSON numbers, so the value
        // the client sent is the value Anthropic sees.
        for key in ["temperature", "top_p"] {
            if let Some(v) = req.get(key) {
                out.insert(key.into(), v.clone());
            }
        }

        match req.get("stop") {
            Some(Value::String(s)) if !s.is_empty() => {
                out.insert("stop_sequences".into(), json!([s]));
            }
            Some(Value::Array(seqs)) if !seqs.is_empty() => {
                out.insert("stop_sequences".into(), Value::Array(seqs.clone()));
            }
            _ => {}
        }

        if let Some(tools) = req.get("tools").and_then(Value::as_array) {
            let translated = translate_tools(tools);
            if !translated.is_empty() {
                out.insert("tools".into(), Value::Array(translated));
            }
        }

        if let Some(choice) = req.get("tool_choice").and_then(translate_tool_choice) {
            out.insert("tool_choice".into(), choice);
        }

        // OpenAI expresses "sequential tools only" on the request; Anthropic
        // expresses it on the tool choice.
        if req.get("parallel_tool_calls").and_then(Value::as_bool) == Some(false) {
            let choice = out
                .entry("tool_choice".to_string())
                .or_insert_with(|| json!({"type": "auto"}));
            let kind = choice.get("type").and_then(Value::as_str).unwrap_or("");
            if kind == "auto" || kind == "any" {
                choice["disable_parallel_tool_use"] = Value::Bool(true);
            }
        }

        // safety_identifier supersedes the deprecated user field.
        if let Some(user_id) = req
            .get("safety_identifier")
            .and_then(Value::as_str)
            .or_else(|| req.get("user").and_then(Value::as_str))
        {
            out.insert("metadata".into(), json!({"user_id": user_id}));
        }

        // Only auto/default have an Anthropic equivalent; flex/scale/priority
        // are dropped.
        if let Some(tier) = req.get("service_tier").and_then(Value::as_str) {
            if tier == "auto" || tier == "default" {
                out.insert("service_tier".into(), json!("auto"));
            }
        }

        if let Some(thinking) = build_thinking(&req)? {
            out.insert("thinking".into(), thinking);
        }

        if self.web_search || req.get("web_search_options").is_some() {
            let tool = web_search_tool(&req);
            match out.get_mut("tools") {
                Some(Value::Array(tools)) => tools.push(tool),
                _ => {
                    out.insert("tools".into(), json!([tool]));
                }
            }
        }

        // Fields with no Anthropic equivalent (logit_bias, frequency_penalty,
        // presence_penalty, n, seed, logprobs, audio, modalities,
        // response_format, prompt_cache_key, prediction, store, verbosity)
        // are dropped.

        Ok(Value::Object(out))
    }
}

/// Convert each OpenAI message into a [`TransformedMessage`], preserving
/// order. Messages whose content reduces to nothing are skipped, with one
/// exception: tool messages are never skipped, because the `tool_call_id`
/// must close the invocation even when the result is empty.
fn transform_messages(messages: &[Value]) -> Result<Vec<TransformedMessage>, TranslateError> {
    let mut transformed = Vec::with_capacity(messages.len());

    for (idx, msg) in messages.iter().enumerate() {
        let role = msg.get("role").and_then(Value::as_str).ok_or_else(|| {
            TranslateError::InvalidRequest(format!("message {idx} is missing a role"))
        })?;
        let content = msg.get("content").unwrap_or(&Value::Null);

        match role {
            // Anthropic has no developer role; it shares system semantics.
            "system" | "developer" => {
                let text = text_from_content(content);
                if text.is_empty() {
                    continue;
                }
                transformed.push(TransformedMessage {
                    role: role.to_string(),
                    payload: json!({"type": "text", "text": text}),
                });
            }

            "user" => {
                let blocks = user_content_blocks(content);
                if blocks.is_empty() {
                    continue;
                }
                transformed.push(TransformedMessage {
                    role: role.to_string(),
                    payload: json!({"role": "user", "content": blocks}),
                });
            }

            "assistant" => {
                if msg.get("function_call").is_some_and(|v| !v.is_null()) {
                    return Err(TranslateError::Unsupported(
                        "function_call is deprecated; use tool_calls".into(),
                    ));
                }

                let mut blocks: Vec<Value> = Vec::new();
                let text = text_from_content(content);
                if !text.is_empty() {
                    blocks.push(json!({"type": "text", "text": text}));
                }
                // A refusal in history is kept as text so the conversation
                // still reads coherently on the Anthropic side.
                if let Some(refusal) = msg.get("refusal").and_then(Value::as_str) {
                    if !refusal.is_empty() {
                        blocks.push(json!({"type": "text", "text": refusal}));
                    }
                }
                if let Some(tool_calls) = msg.get("tool_calls").and_then(Value::as_array) {
                    for tc in tool_calls {
                        blocks.push(tool_use_block(tc, idx)?);
                    }
                }
                if blocks.is_empty() {
                    continue;
                }
                transformed.push(TransformedMessage {
                    role: role.to_string(),
                    payload: json!({"role": "assistant", "content": blocks}),
                });
            }

            "tool" => {
                let tool_call_id = msg.get("tool_call_id").and_then(Value::as_str).unwrap_or("");
                let result = text_from_content(content);
                transformed.push(TransformedMessage {
                    role: role.to_string(),
                    payload: json!({
                        "role": "user",
                        "content": [{
                            "type": "tool_result",
                            "tool_use_id": tool_call_id,
                            "content": result,
                        }],
                    }),
                });
            }

            "function" => {
                return Err(TranslateError::Unsupported(
                    "function messages are deprecated; use tool messages".into(),
                ));
            }

            other => {
                return Err(TranslateError::InvalidRequest(format!(
                    "unknown message role {other} at index {idx}"
                )));
            }
        }
    }

    Ok(transformed)
}

/// Combine consecutive tool messages into single user messages. Anthropic
/// enforces strict role alternation, and tool results travel as user
/// messages containing `tool_result` blocks.
fn merge_consecutive_tool_messages(messages: Vec<TransformedMessage>) -> Vec<TransformedMessage> {
    let mut result: Vec<TransformedMessage> = Vec::with_capacity(messages.len());
    let mut tool_blocks: Vec<Value> = Vec::new();

    fn flush(result: &mut Vec<TransformedMessage>, tool_blocks: &mut Vec<Value>) {
        if !tool_blocks.is_empty() {
            result.push(TransformedMessage {
                role: "tool".into(),
                payload: json!({"role": "user", "content": std::mem::take(tool_blocks)}),
            });
        }
    }

    for msg in messages {
        if msg.role == "tool" {
            if let Some(blocks) = msg
                .payload
                .get("content")
                .and_then(Value::as_array)
            {
                tool_blocks.extend(blocks.iter().cloned());
            }
        } else {
            flush(&mut result, &mut tool_blocks);
            result.push(msg);
        }
    }
    flush(&mut result, &mut tool_blocks);

    result
}

/// Separate system/developer text blocks from conversation messages, both in
/// original order.
fn hoist_system_prompts(messages: Vec<TransformedMessage>) -> (Vec<Value>, Vec<Value>) {
    let mut system = Vec::new();
    let mut conversation = Vec::new();
    for msg in messages {
        match msg.role.as_str() {
            "system" | "developer" => system.push(msg.payload),
            _ => conversation.push(msg.payload),
        }
    }
    (system, conversation)
}

/// Extract text from OpenAI content: either a plain string or an array of
/// content parts whose text parts are joined with newlines.
fn text_from_content(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => {
            let texts: Vec<&str> = parts
                .iter()
                .filter(|p| p.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect();
            texts.join("\n")
        }
        _ => String::new(),
    }
}

/// Build Anthropic content blocks from user message content (text and image
/// parts; other part types produce nothing).
fn user_content_blocks(content: &Value) -> Vec<Value> {
    match content {
        Value::String(s) if !s.is_empty() => vec![json!({"type": "text", "text": s})],
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| match part.get("type").and_then(Value::as_str) {
                Some("text") => {
                    let text = part.get("text").and_then(Value::as_str)?;
                    if text.is_empty() {
                        None
                    } else {
                        Some(json!({"type": "text", "text": text}))
                    }
                }
                Some("image_url") => {
                    let url = part.pointer("/image_url/url").and_then(Value::as_str)?;
                    Some(image_block(url))
                }
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Map an OpenAI image URL to an Anthropic image source block. Data URLs
/// become inline base64 sources, anything else a URL source.
fn image_block(url: &str) -> Value {
    if let Some(rest) = url.strip_prefix("data:") {
        if let Some((media_type, data)) = rest.split_once(";base64,") {
            return json!({
                "type": "image",
                "source": {"type": "base64", "media_type": media_type, "data": data},
            });
        }
    }
    json!({"type": "image", "source": {"type": "url", "url": url}})
}

/// Convert one OpenAI tool call to an Anthropic `tool_use` block. Anthropic
/// expects structured input, so the arguments string is parsed; an empty
/// string means no arguments.
fn tool_use_block(tool_call: &Value, msg_index: usize) -> Result<Value, TranslateError> {
    let id = tool_call.get("id").and_then(Value::as_str).unwrap_or("");
    let func = tool_call.get("function").unwrap_or(&Value::Null);
    let name = func.get("name").and_then(Value::as_str).unwrap_or("");
    let args = func
        .get("arguments")
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim();

    let input: Value = if args.is_empty() {
        json!({})
    } else {
        serde_json::from_str(args).map_err(|e| {
            TranslateError::ToolArguments(format!(
                "tool call {id} in message {msg_index}: {e}"
            ))
        })?
    };

    Ok(json!({"type": "tool_use", "id": id, "name": name, "input": input}))
}

/// Translate OpenAI function tools to Anthropic tool definitions.
fn translate_tools(tools: &[Value]) -> Vec<Value> {
    tools
        .iter()
        .filter_map(|t| {
            let func = t.get("function")?;
            let name = func.get("name")?.clone();
            let input_schema = func
                .get("parameters")
                .cloned()
                .unwrap_or_else(|| json!({"type": "object"}));
            let mut tool = json!({"name": name, "input_schema": input_schema});
            if let Some(desc) = func.get("description") {
                if !desc.is_null() {
                    tool["description"] = desc.clone();
                }
            }
            Some(tool)
        })
        .collect()
}

/// Map OpenAI tool_choice to Anthropic's tool choice object.
fn translate_tool_choice(tc: &Value) -> Option<Value> {
    if let Some(s) = tc.as_str() {
        return match s {
            "auto" => Some(json!({"type": "auto"})),
            "required" => Some(json!({"type": "any"})),
            "none" => Some(json!({"type": "none"})),
            _ => None,
        };
    }
    tc.pointer("/function/name")
        .and_then(Value::as_str)
        .map(|name| json!({"type": "tool", "name": name}))
}

/// Build Anthropic's thinking configuration from OpenAI's reasoning effort,
/// with `extra_body.thinking` overrides for callers who want direct control.
///
/// Effort mapping: low = 1,024, medium = 8,192, high = 24,576 budget tokens.
fn build_thinking(req: &Value) -> Result<Option<Value>, TranslateError> {
    let enabled = |budget: i64| json!({"type": "enabled", "budget_tokens": budget});

    let mut thinking = match req.get("reasoning_effort").and_then(Value::as_str) {
        Some("low") => Some(enabled(1024)),
        Some("medium") => Some(enabled(8192)),
        Some("high") => Some(enabled(24576)),
        // Unknown efforts leave thinking unset.
        _ => None,
    };

    if let Some(cfg) = req.pointer("/extra_body/thinking") {
        match cfg.get("type").and_then(Value::as_str) {
            Some("enabled") => {
                let budget: i64 = match cfg.get("budget_tokens") {
                    Some(Value::Number(n)) => {
                        n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or(0)
                    }
                    Some(Value::String(s)) => s.parse().map_err(|_| {
                        TranslateError::InvalidRequest(
                            "invalid budget_tokens: must be a valid integer".into(),
                        )
                    })?,
                    _ => 0,
                };
                if budget > 0 {
                    thinking = Some(enabled(budget));
                } else if thinking.is_none() {
                    return Err(TranslateError::InvalidRequest(
                        "extra_body.thinking.type is 'enabled' but budget_tokens \
                         not specified and no reasoning_effort set"
                            .into(),
                    ));
                }
            }
            Some("disabled") => thinking = Some(json!({"type": "disabled"})),
            // Unknown thinking types are ignored.
            _ => {}
        }
    }

    Ok(thinking)
}

/// Build the Anthropic web search server tool, carrying over the user's city
/// if the OpenAI request provided one. `search_context_size` has no
/// equivalent and is not mapped.
fn web_search_tool(req: &Value) -> Value {
    let mut tool = json!({"type": "web_search_20250305", "name": "web_search"});
    if let Some(city) = req
        .pointer("/web_search_options/user_location/approximate/city")
        .and_then(Value::as_str)
    {
        tool["user_location"] = json!({"type": "approximate", "city": city});
    }
    tool
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn translate(req: Value) -> Value {
        OpenAiToAnthropic::new().translate_request(req).unwrap()
    }

    #[test]
    fn test_basic_translation() {
        let out = translate(json!({
            "model": "claude-sonnet-4-5",
            "messages": [{"role": "user", "content": "Hello"}],
            "max_tokens": 100
        }));
        assert_eq!(out["model"], "claude-sonnet-4-5");
        assert_eq!(out["max_tokens"], 100);
        assert_eq!(out["messages"][0]["role"], "user");
        assert_eq!(out["messages"][0]["content"][0]["text"], "Hello");
    }

    #[test]
    fn test_missing_model_error() {
        let err = OpenAiToAnthropic::new()
            .translate_request(json!({"messages": [{"role": "user", "content": "hi"}]}))
            .unwrap_err();
        assert!(err.to_string().contains("model"));
    }

    #[test]
    fn test_empty_messages_error() {
        assert!(OpenAiToAnthropic::new()
            .translate_request(json!({"model": "m", "messages": []}))
            .is_err());
    }

    #[test]
    fn test_system_hoisted_as_text_block() {
        let out = translate(json!({
            "model": "m",
            "messages": [
                {"role": "system", "content": "You are helpful."},
                {"role": "user", "content": "Hi"}
            ]
        }));
        assert_eq!(out["system"], json!([{"type": "text", "text": "You are helpful."}]));
        assert_eq!(out["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_developer_treated_as_system() {
        let out = translate(json!({
            "model": "m",
            "messages": [
                {"role": "system", "content": "First."},
                {"role": "developer", "content": "Second."},
                {"role": "user", "content": "Hi"}
            ]
        }));
        let system = out["system"].as_array().unwrap();
        assert_eq!(system.len(), 2);
        assert_eq!(system[1]["text"], "Second.");
    }

    #[test]
    fn test_max_completion_tokens_preferred() {
        let out = translate(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "max_tokens": 100,
            "max_completion_tokens": 200
        }));
        assert_eq!(out["max_tokens"], 200);
    }

    #[test]
    fn test_default_max_tokens() {
        let out = translate(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}]
        }));
        assert_eq!(out["max_tokens"], 8192);
    }

    #[test]
    fn test_sampling_params_copied_verbatim() {
        let out = translate(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "temperature": 0.7,
            "top_p": 0.95
        }));
        assert_eq!(out["temperature"], 0.7);
        assert_eq!(out["top_p"], 0.95);
    }

    #[test]
    fn test_stop_string_and_array() {
        let out = translate(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "stop": "END"
        }));
        assert_eq!(out["stop_sequences"], json!(["END"]));

        let out = translate(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "stop": ["A", "B"]
        }));
        assert_eq!(out["stop_sequences"], json!(["A", "B"]));

        let out = translate(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "stop": ""
        }));
        assert!(out.get("stop_sequences").is_none());
    }

    #[test]
    fn test_consecutive_tool_messages_merged() {
        let out = translate(json!({
            "model": "m",
            "messages": [
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "a", "type": "function", "function": {"name": "f", "arguments": "{}"}},
                    {"id": "b", "type": "function", "function": {"name": "g", "arguments": "{}"}}
                ]},
                {"role": "tool", "tool_call_id": "a", "content": "R1"},
                {"role": "tool", "tool_call_id": "b", "content": "R2"},
                {"role": "assistant", "content": "done"}
            ]
        }));
        let messages = out["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1]["content"].as_array().unwrap().len(), 2);
        let merged = &messages[2];
        assert_eq!(merged["role"], "user");
        let blocks = merged["content"].as_array().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0]["tool_use_id"], "a");
        assert_eq!(blocks[1]["tool_use_id"], "b");
        assert_eq!(messages[3]["role"], "assistant");
    }

    #[test]
    fn test_empty_tool_message_not_skipped() {
        let out = translate(json!({
            "model": "m",
            "messages": [
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "a", "type": "function", "function": {"name": "f", "arguments": "{}"}}
                ]},
                {"role": "tool", "tool_call_id": "a", "content": ""}
            ]
        }));
        let messages = out["messages"].as_array().unwrap();
        let result = &messages[2]["content"][0];
        assert_eq!(result["type"], "tool_result");
        assert_eq!(result["tool_use_id"], "a");
        assert_eq!(result["content"], "");
    }

    #[test]
    fn test_tool_arguments_parsed() {
        let out = translate(json!({
            "model": "m",
            "messages": [
                {"role": "user", "content": "weather?"},
                {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "c1", "type": "function",
                     "function": {"name": "get_weather", "arguments": "{\"city\":\"Tokyo\"}"}}
                ]}
            ]
        }));
        let block = &out["messages"][1]["content"][0];
        assert_eq!(block["type"], "tool_use");
        assert_eq!(block["input"]["city"], "Tokyo");
    }

    #[test]
    fn test_empty_tool_arguments_become_empty_object() {
        let out = translate(json!({
            "model": "m",
            "messages": [
                {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "c1", "type": "function", "function": {"name": "f", "arguments": ""}}
                ]}
            ]
        }));
        assert_eq!(out["messages"][0]["content"][0]["input"], json!({}));
    }

    #[test]
    fn test_malformed_tool_arguments_error() {
        let err = OpenAiToAnthropic::new()
            .translate_request(json!({
                "model": "m",
                "messages": [
                    {"role": "assistant", "content": null, "tool_calls": [
                        {"id": "c1", "type": "function", "function": {"name": "f", "arguments": "{not json"}}
                    ]}
                ]
            }))
            .unwrap_err();
        assert!(matches!(err, TranslateError::ToolArguments(_)));
    }

    #[test]
    fn test_function_role_unsupported() {
        let err = OpenAiToAnthropic::new()
            .translate_request(json!({
                "model": "m",
                "messages": [{"role": "function", "name": "f", "content": "x"}]
            }))
            .unwrap_err();
        assert!(matches!(err, TranslateError::Unsupported(_)));
    }

    #[test]
    fn test_refusal_appended_as_text() {
        let out = translate(json!({
            "model": "m",
            "messages": [
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "Sorry.", "refusal": "I cannot do that."}
            ]
        }));
        let blocks = out["messages"][1]["content"].as_array().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1]["text"], "I cannot do that.");
    }

    #[test]
    fn test_image_parts() {
        let out = translate(json!({
            "model": "m",
            "messages": [{"role": "user", "content": [
                {"type": "text", "text": "what is this?"},
                {"type": "image_url", "image_url": {"url": "data:image/png;base64,aGk="}},
                {"type": "image_url", "image_url": {"url": "https://example.com/cat.png"}}
            ]}]
        }));
        let blocks = out["messages"][0]["content"].as_array().unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[1]["source"]["type"], "base64");
        assert_eq!(blocks[1]["source"]["media_type"], "image/png");
        assert_eq!(blocks[2]["source"]["type"], "url");
    }

    #[test]
    fn test_tools_translated() {
        let out = translate(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "tools": [{
                "type": "function",
                "function": {
                    "name": "get_weather",
                    "description": "Get the weather",
                    "parameters": {"type": "object", "properties": {"city": {"type": "string"}}}
                }
            }]
        }));
        let tools = out["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "get_weather");
        assert_eq!(tools[0]["input_schema"]["type"], "object");
        assert!(tools[0].get("function").is_none());
    }

    #[test]
    fn test_tool_choice_mapping() {
        let base = json!({"model": "m", "messages": [{"role": "user", "content": "hi"}]});

        let mut req = base.clone();
        req["tool_choice"] = json!("auto");
        assert_eq!(translate(req)["tool_choice"], json!({"type": "auto"}));

        let mut req = base.clone();
        req["tool_choice"] = json!("required");
        assert_eq!(translate(req)["tool_choice"], json!({"type": "any"}));

        let mut req = base.clone();
        req["tool_choice"] = json!({"type": "function", "function": {"name": "f"}});
        assert_eq!(translate(req)["tool_choice"], json!({"type": "tool", "name": "f"}));
    }

    #[test]
    fn test_parallel_tool_calls_disabled() {
        let out = translate(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "parallel_tool_calls": false
        }));
        assert_eq!(
            out["tool_choice"],
            json!({"type": "auto", "disable_parallel_tool_use": true})
        );

        let out = translate(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "tool_choice": "required",
            "parallel_tool_calls": false
        }));
        assert_eq!(out["tool_choice"]["type"], "any");
        assert_eq!(out["tool_choice"]["disable_parallel_tool_use"], true);
    }

    #[test]
    fn test_safety_identifier_precedence() {
        let out = translate(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "safety_identifier": "safe-1",
            "user": "user-1"
        }));
        assert_eq!(out["metadata"]["user_id"], "safe-1");

        let out = translate(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "user": "user-1"
        }));
        assert_eq!(out["metadata"]["user_id"], "user-1");
    }

    #[test]
    fn test_service_tier_mapping() {
        for tier in ["auto", "default"] {
            let out = translate(json!({
                "model": "m",
                "messages": [{"role": "user", "content": "hi"}],
                "service_tier": tier
            }));
            assert_eq!(out["service_tier"], "auto");
        }
        let out = translate(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "service_tier": "flex"
        }));
        assert!(out.get("service_tier").is_none());
    }

    #[test]
    fn test_reasoning_effort_mapping() {
        for (effort, budget) in [("low", 1024), ("medium", 8192), ("high", 24576)] {
            let out = translate(json!({
                "model": "m",
                "messages": [{"role": "user", "content": "hi"}],
                "reasoning_effort": effort
            }));
            assert_eq!(out["thinking"], json!({"type": "enabled", "budget_tokens": budget}));
        }
    }

    #[test]
    fn test_extra_body_thinking_overrides() {
        let out = translate(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "reasoning_effort": "low",
            "extra_body": {"thinking": {"type": "enabled", "budget_tokens": 16000}}
        }));
        assert_eq!(out["thinking"]["budget_tokens"], 16000);

        // Numeric-string budgets are accepted.
        let out = translate(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "extra_body": {"thinking": {"type": "enabled", "budget_tokens": "2048"}}
        }));
        assert_eq!(out["thinking"]["budget_tokens"], 2048);

        let out = translate(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "reasoning_effort": "high",
            "extra_body": {"thinking": {"type": "disabled"}}
        }));
        assert_eq!(out["thinking"], json!({"type": "disabled"}));
    }

    #[test]
    fn test_thinking_enabled_without_budget_error() {
        let err = OpenAiToAnthropic::new()
            .translate_request(json!({
                "model": "m",
                "messages": [{"role": "user", "content": "hi"}],
                "extra_body": {"thinking": {"type": "enabled"}}
            }))
            .unwrap_err();
        assert!(err.to_string().contains("budget_tokens"));
    }

    #[test]
    fn test_thinking_enabled_falls_back_to_effort_budget() {
        let out = translate(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "reasoning_effort": "medium",
            "extra_body": {"thinking": {"type": "enabled"}}
        }));
        assert_eq!(out["thinking"]["budget_tokens"], 8192);
    }

    #[test]
    fn test_web_search_options_append_tool() {
        let out = translate(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "web_search_options": {"user_location": {"type": "approximate", "approximate": {"city": "Berlin"}}}
        }));
        let tools = out["tools"].as_array().unwrap();
        assert_eq!(tools[0]["type"], "web_search_20250305");
        assert_eq!(tools[0]["user_location"]["city"], "Berlin");
    }

    #[test]
    fn test_web_search_env_override() {
        std::env::set_var(WEB_SEARCH_ENV, "true");
        let translator = OpenAiToAnthropic::from_env();
        std::env::remove_var(WEB_SEARCH_ENV);

        let out = translator
            .translate_request(json!({
                "model": "m",
                "messages": [{"role": "user", "content": "hi"}]
            }))
            .unwrap();
        assert_eq!(out["tools"][0]["type"], "web_search_20250305");

        // Without the flag, nothing is appended.
        let out = translate(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}]
        }));
        assert!(out.get("tools").is_none());
    }

    #[test]
    fn test_web_search_tool_appended_after_client_tools() {
        let out = translate(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "tools": [{"type": "function", "function": {"name": "f"}}],
            "web_search_options": {}
        }));
        let tools = out["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[1]["name"], "web_search");
    }

    #[test]
    fn test_unmappable_fields_dropped() {
        let out = translate(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "logit_bias": {"50256": -100},
            "frequency_penalty": 0.5,
            "presence_penalty": 0.5,
            "n": 3,
            "seed": 42,
            "logprobs": true,
            "response_format": {"type": "json_object"},
            "store": true
        }));
        for key in [
            "logit_bias",
            "frequency_penalty",
            "presence_penalty",
            "n",
            "seed",
            "logprobs",
            "response_format",
            "store",
        ] {
            assert!(out.get(key).is_none(), "{key} should be dropped");
        }
    }
}
