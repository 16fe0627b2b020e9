//! Streaming system-prompt injection for outbound request bodies.
//!
//! The Anthropic API expects OAuth-authenticated clients to open their
//! `system` array with the Claude Code persona element. Request bodies can
//! be arbitrarily large, so the rewrite is a single token-level pass from
//! reader to writer: only the value of the top-level `system` key is ever
//! materialized, everything else streams through as raw bytes.

use serde_json::Value;
use std::io;
use std::sync::LazyLock;
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, AsyncWrite, AsyncWriteExt as _};

/// The system prompt element the Anthropic API expects from the Claude Code
/// client persona.
pub const SYSTEM_PROMPT: &str = "You are Claude Code, Anthropic's official CLI for Claude.";

static PROMPT_ELEMENT: LazyLock<String> =
    LazyLock::new(|| serde_json::json!({"type": "text", "text": SYSTEM_PROMPT}).to_string());
static PROMPT_ARRAY: LazyLock<String> = LazyLock::new(|| format!("[{}]", &*PROMPT_ELEMENT));

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

fn eof() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "unexpected end of JSON input")
}

/// Rewrite a JSON request body, guaranteeing the top-level `system` array
/// starts with the Claude Code prompt element.
///
/// - Empty input and non-object input pass through unchanged.
/// - If the object has no `system` key, one is appended before the closing
///   brace.
/// - Only the top level is inspected; nested `system` keys are untouched.
///
/// Runs in one pass: O(body) time, O(1) memory apart from the `system`
/// value itself.
///
/// # Errors
///
/// Returns an error for malformed JSON or when either side of the pipe
/// fails.
pub async fn inject_system_prompt<R, W>(mut reader: R, mut writer: W) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let Some(first) = peek_non_ws(&mut reader).await? else {
        return Ok(()); // empty body passes through untouched
    };

    if first != b'{' {
        // Not an object (array, scalar, garbage): stream through unchanged.
        tokio::io::copy_buf(&mut reader, &mut writer).await?;
        writer.flush().await?;
        return Ok(());
    }

    read_byte(&mut reader).await?;
    writer.write_all(b"{").await?;

    let mut found_system = false;
    let mut first_member = true;

    loop {
        match peek_non_ws(&mut reader).await?.ok_or_else(eof)? {
            b'}' => {
                read_byte(&mut reader).await?;
                break;
            }
            b',' => {
                read_byte(&mut reader).await?;
            }
            b'"' => {
                let mut key_raw: Vec<u8> = Vec::new();
                copy_string(&mut reader, &mut key_raw).await?;

                if !first_member {
                    writer.write_all(b",").await?;
                }
                first_member = false;
                writer.write_all(&key_raw).await?;

                match peek_non_ws(&mut reader).await?.ok_or_else(eof)? {
                    b':' => {
                        read_byte(&mut reader).await?;
                    }
                    _ => return Err(invalid("expected ':' after object key")),
                }
                writer.write_all(b":").await?;

                let key: String = serde_json::from_slice(&key_raw)
                    .map_err(|e| invalid(&format!("bad object key: {e}")))?;
                if key == "system" {
                    found_system = true;
                    let mut value_raw: Vec<u8> = Vec::new();
                    copy_value(&mut reader, &mut value_raw).await?;
                    ensure_system_prompt(&value_raw, &mut writer).await?;
                } else {
                    copy_value(&mut reader, &mut writer).await?;
                }
            }
            _ => return Err(invalid("expected object key")),
        }
    }

    // Streaming constraint: when no system key was seen during traversal,
    // the only place left to put one is before the closing brace.
    if !found_system {
        if !first_member {
            writer.write_all(b",").await?;
        }
        writer.write_all(b"\"system\":").await?;
        writer.write_all(PROMPT_ARRAY.as_bytes()).await?;
    }

    writer.write_all(b"}").await?;
    writer.flush().await?;
    Ok(())
}

/// Check whether the prompt element already leads the array and write the
/// value accordingly: unchanged when it does, replaced or prepended when it
/// does not.
async fn ensure_system_prompt<W>(raw: &[u8], writer: &mut W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let elements = match serde_json::from_slice::<Value>(raw) {
        Ok(Value::Array(elements)) if !elements.is_empty() => elements,
        // Not an array (or empty): replace with the one-element prompt array.
        _ => return writer.write_all(PROMPT_ARRAY.as_bytes()).await,
    };

    let first_is_prompt = elements[0].get("type").and_then(Value::as_str) == Some("text")
        && elements[0].get("text").and_then(Value::as_str) == Some(SYSTEM_PROMPT);
    if first_is_prompt {
        // Already impersonated: write the original bytes unchanged.
        return writer.write_all(raw).await;
    }

    writer.write_all(b"[").await?;
    writer.write_all(PROMPT_ELEMENT.as_bytes()).await?;
    for element in &elements {
        writer.write_all(b",").await?;
        writer.write_all(&serde_json::to_vec(element)?).await?;
    }
    writer.write_all(b"]").await
}

/// Skip whitespace and return the next byte without consuming it, or `None`
/// at end of input.
async fn peek_non_ws<R>(reader: &mut R) -> io::Result<Option<u8>>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            return Ok(None);
        }
        let ws = buf
            .iter()
            .take_while(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r'))
            .count();
        if ws < buf.len() {
            let next = buf[ws];
            reader.consume(ws);
            return Ok(Some(next));
        }
        let len = buf.len();
        reader.consume(len);
    }
}

async fn read_byte<R>(reader: &mut R) -> io::Result<u8>
where
    R: AsyncBufRead + Unpin,
{
    let buf = reader.fill_buf().await?;
    if buf.is_empty() {
        return Err(eof());
    }
    let byte = buf[0];
    reader.consume(1);
    Ok(byte)
}

/// Copy one complete JSON value (object, array, string, or literal) from
/// reader to writer byte for byte.
async fn copy_value<R, W>(reader: &mut R, writer: &mut W) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match peek_non_ws(reader).await?.ok_or_else(eof)? {
        b'{' | b'[' => copy_structure(reader, writer).await,
        b'"' => copy_string(reader, writer).await,
        _ => copy_literal(reader, writer).await,
    }
}

/// Copy a balanced `{...}` or `[...]` run, tracking string state so braces
/// inside strings don't count.
async fn copy_structure<R, W>(reader: &mut R, writer: &mut W) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            return Err(eof());
        }

        let mut taken = 0;
        let mut done = false;
        for &byte in buf {
            taken += 1;
            if in_string {
                if escaped {
                    escaped = false;
                } else if byte == b'\\' {
                    escaped = true;
                } else if byte == b'"' {
                    in_string = false;
                }
            } else {
                match byte {
                    b'"' => in_string = true,
                    b'{' | b'[' => depth += 1,
                    b'}' | b']' => {
                        depth = depth
                            .checked_sub(1)
                            .ok_or_else(|| invalid("unbalanced brackets"))?;
                        if depth == 0 {
                            done = true;
                            break;
                        }
                    }
                    _ => {}
                }
            }
        }

        writer.write_all(&buf[..taken]).await?;
        reader.consume(taken);
        if done {
            return Ok(());
        }
    }
}

/// Copy a quoted string, inclusive of both quotes, honoring escapes.
async fn copy_string<R, W>(reader: &mut R, writer: &mut W) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if read_byte(reader).await? != b'"' {
        return Err(invalid("expected string"));
    }
    writer.write_all(b"\"").await?;

    let mut escaped = false;
    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            return Err(eof());
        }

        let mut taken = 0;
        let mut done = false;
        for &byte in buf {
            taken += 1;
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                done = true;
                break;
            }
        }

        writer.write_all(&buf[..taken]).await?;
        reader.consume(taken);
        if done {
            return Ok(());
        }
    }
}

/// Copy a bare literal (number, `true`, `false`, `null`), validating it.
async fn copy_literal<R, W>(reader: &mut R, writer: &mut W) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    // Literals are short; over-long runs mean malformed input.
    const MAX_LITERAL: usize = 64;
    let mut literal: Vec<u8> = Vec::new();

    'outer: loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            break; // literal may legally end at end of input
        }
        for (i, &byte) in buf.iter().enumerate() {
            if matches!(byte, b',' | b'}' | b']' | b' ' | b'\t' | b'\n' | b'\r') {
                literal.extend_from_slice(&buf[..i]);
                reader.consume(i);
                break 'outer;
            }
        }
        literal.extend_from_slice(buf);
        let len = buf.len();
        reader.consume(len);
        if literal.len() > MAX_LITERAL {
            return Err(invalid("invalid literal"));
        }
    }

    let valid = matches!(literal.as_slice(), b"true" | b"false" | b"null")
        || serde_json::from_slice::<serde_json::Number>(&literal).is_ok();
    if !valid {
        return Err(invalid("invalid literal"));
    }

    writer.write_all(&literal).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn inject(input: &str) -> io::Result<String> {
        let mut out: Vec<u8> = Vec::new();
        inject_system_prompt(input.as_bytes(), &mut out).await?;
        Ok(String::from_utf8(out).unwrap())
    }

    async fn inject_value(input: &str) -> Value {
        serde_json::from_str(&inject(input).await.unwrap()).unwrap()
    }

    fn prompt_element() -> Value {
        json!({"type": "text", "text": SYSTEM_PROMPT})
    }

    #[tokio::test]
    async fn test_system_missing_appended_at_end() {
        let out = inject_value(
            r#"{"model": "claude-sonnet-4-5", "max_tokens": 1024,
                "messages": [{"role": "user", "content": "Hello"}]}"#,
        )
        .await;
        assert_eq!(
            out,
            json!({
                "model": "claude-sonnet-4-5",
                "max_tokens": 1024,
                "messages": [{"role": "user", "content": "Hello"}],
                "system": [prompt_element()],
            })
        );
    }

    #[tokio::test]
    async fn test_existing_system_gets_prompt_prepended() {
        let out = inject_value(
            r#"{"model": "m", "system": [{"type": "text", "text": "You are a helpful assistant."}]}"#,
        )
        .await;
        assert_eq!(
            out["system"],
            json!([
                prompt_element(),
                {"type": "text", "text": "You are a helpful assistant."},
            ])
        );
    }

    #[tokio::test]
    async fn test_prompt_already_first_is_noop() {
        let input = format!(
            r#"{{"model": "m", "system": [{{"type": "text", "text": "{SYSTEM_PROMPT}"}}, {{"type": "text", "text": "extra"}}]}}"#
        );
        let out: Value = serde_json::from_str(&inject(&input).await.unwrap()).unwrap();
        let system = out["system"].as_array().unwrap();
        assert_eq!(system.len(), 2);
        assert_eq!(system[0], prompt_element());
    }

    #[tokio::test]
    async fn test_prompt_elsewhere_in_array_still_prepended() {
        let input = format!(
            r#"{{"system": [{{"type": "text", "text": "First."}}, {{"type": "text", "text": "{SYSTEM_PROMPT}"}}]}}"#
        );
        let out: Value = serde_json::from_str(&inject(&input).await.unwrap()).unwrap();
        let system = out["system"].as_array().unwrap();
        assert_eq!(system.len(), 3);
        assert_eq!(system[0], prompt_element());
    }

    #[tokio::test]
    async fn test_empty_object() {
        let out = inject_value("{}").await;
        assert_eq!(out, json!({"system": [prompt_element()]}));
    }

    #[tokio::test]
    async fn test_system_key_last_in_object() {
        let out = inject_value(r#"{"model": "m", "messages": [], "system": [{"type": "text", "text": "Custom"}]}"#).await;
        let system = out["system"].as_array().unwrap();
        assert_eq!(system[0], prompt_element());
        assert_eq!(system[1]["text"], "Custom");
        assert_eq!(out["model"], "m");
    }

    #[tokio::test]
    async fn test_non_array_system_replaced() {
        let out = inject_value(r#"{"system": "not an array", "model": "m"}"#).await;
        assert_eq!(out["system"], json!([prompt_element()]));
        assert_eq!(out["model"], "m");
    }

    #[tokio::test]
    async fn test_empty_array_system_replaced() {
        let out = inject_value(r#"{"system": []}"#).await;
        assert_eq!(out["system"], json!([prompt_element()]));
    }

    #[tokio::test]
    async fn test_nested_system_keys_untouched() {
        let out = inject_value(r#"{"model": "m", "config": {"system": []}}"#).await;
        assert_eq!(out["config"]["system"], json!([]));
        assert_eq!(out["system"], json!([prompt_element()]));
    }

    #[tokio::test]
    async fn test_empty_input_passes_through() {
        assert_eq!(inject("").await.unwrap(), "");
        assert_eq!(inject("   ").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_non_object_passes_through() {
        assert_eq!(inject("[1, 2, 3]").await.unwrap(), "[1, 2, 3]");
        assert_eq!(inject("\"hello\"").await.unwrap(), "\"hello\"");
        assert_eq!(inject("42").await.unwrap(), "42");
    }

    #[tokio::test]
    async fn test_other_values_preserved_verbatim() {
        // Values stream through as raw bytes, keeping their formatting.
        let input = r#"{"a": {"deep": [1, 2, {"x": "y"}]}, "b": "quote \" and { brace"}"#;
        let out = inject_value(input).await;
        assert_eq!(out["a"], json!({"deep": [1, 2, {"x": "y"}]}));
        assert_eq!(out["b"], "quote \" and { brace");
        assert_eq!(out["system"], json!([prompt_element()]));
    }

    #[tokio::test]
    async fn test_unicode_and_escapes_in_strings() {
        let input = r#"{"text": "newline \n brace } quote \" done", "emoji": "héllo"}"#;
        let out = inject_value(input).await;
        assert_eq!(out["text"], "newline \n brace } quote \" done");
        assert_eq!(out["emoji"], "héllo");
    }

    #[tokio::test]
    async fn test_truncated_json_errors() {
        assert!(inject(r#"{"model": "claude""#).await.is_err());
        assert!(inject(r#"{"model""#).await.is_err());
    }

    #[tokio::test]
    async fn test_malformed_literal_errors() {
        assert!(inject(r#"{"model": invalid}"#).await.is_err());
    }

    #[tokio::test]
    async fn test_large_body_streams() {
        // 1000 messages of ~1KB each; the injector must handle it and still
        // append the system array.
        let mut input = String::from(r#"{"model": "m", "messages": ["#);
        for i in 0..1000 {
            if i > 0 {
                input.push(',');
            }
            input.push_str(r#"{"role": "user", "content": ""#);
            input.push_str(&"x".repeat(1000));
            input.push_str(r#""}"#);
        }
        input.push_str("]}");

        let out = inject_value(&input).await;
        assert_eq!(out["messages"].as_array().unwrap().len(), 1000);
        assert_eq!(out["system"], json!([prompt_element()]));
    }
}
