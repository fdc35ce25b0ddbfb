//! Line framing for streamed chat responses.
//!
//! OpenAI-compatible servers answer with Server-Sent Events (`data: {...}`
//! lines, terminated by `data: [DONE]`). Network chunks do not respect line boundaries, so bytes are
//! buffered until a full line is available.

use anyhow::Context;
use serde_json::Value;

/// Splits a byte stream into complete lines.
#[derive(Debug, Default)]
pub(crate) struct LineFramer {
    buf: Vec<u8>,
}

impl LineFramer {
    /// Feed a network chunk, returning every line it completed.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]);
            lines.push(text.trim_end_matches('\r').to_string());
        }
        lines
    }

    /// Whatever is left once the body has ended without a trailing newline.
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        let text = String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string();
        Some(text)
    }
}

/// What one line of a response contributed.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct Decoded {
    pub token: Option<String>,
    pub done: bool,
}

/// Decode one SSE line from an OpenAI-compatible endpoint.
pub(crate) fn decode_openai_line(line: &str) -> anyhow::Result<Decoded> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        // blank separators, comments (`:`), `event:` and `id:` fields
        return Ok(Decoded::default());
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(Decoded {
            token: None,
            done: true,
        });
    }

    let json: Value = serde_json::from_str(data).context("invalid JSON in SSE data line")?;
    if let Some(err) = json.get("error") {
        return Err(anyhow::anyhow!("LLM server error: {}", error_message(err)));
    }

    let token = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string);
    Ok(Decoded { token, done: false })
}

fn error_message(err: &Value) -> String {
    err.get("message")
        .and_then(|m| m.as_str())
        .or_else(|| err.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framer_joins_lines_split_across_chunks() {
        let mut framer = LineFramer::default();
        assert!(framer.push(b"data: {\"a\"").is_empty());
        let lines = framer.push(b":1}\r\n\r\ndata: [DO");
        assert_eq!(lines, vec!["data: {\"a\":1}".to_string(), String::new()]);
        let lines = framer.push(b"NE]\n");
        assert_eq!(lines, vec!["data: [DONE]".to_string()]);
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn framer_keeps_multibyte_characters_split_across_chunks() {
        let mut framer = LineFramer::default();
        let bytes = "héllo\n".as_bytes();
        assert!(framer.push(&bytes[..2]).is_empty());
        assert_eq!(framer.push(&bytes[2..]), vec!["héllo".to_string()]);
    }

    #[test]
    fn framer_returns_trailing_line_on_finish() {
        let mut framer = LineFramer::default();
        assert!(framer.push(b"{\"done\":true}").is_empty());
        assert_eq!(framer.finish().as_deref(), Some("{\"done\":true}"));
    }

    #[test]
    fn openai_delta_content_is_a_token() {
        let d = decode_openai_line(r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#).unwrap();
        assert_eq!(d.token.as_deref(), Some("Hi"));
        assert!(!d.done);
    }

    #[test]
    fn openai_role_only_delta_and_comments_are_skipped() {
        let d = decode_openai_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap();
        assert_eq!(d, Decoded::default());
        assert_eq!(decode_openai_line(": keep-alive").unwrap(), Decoded::default());
        assert_eq!(decode_openai_line("").unwrap(), Decoded::default());
    }

    #[test]
    fn openai_done_marker_ends_stream() {
        let d = decode_openai_line("data: [DONE]").unwrap();
        assert!(d.done);
        assert!(d.token.is_none());
    }

    #[test]
    fn openai_error_payload_is_an_error() {
        let err = decode_openai_line(r#"data: {"error":{"message":"quota exceeded"}}"#).unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }
}
