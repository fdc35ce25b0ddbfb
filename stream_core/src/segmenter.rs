//! Grouping of generated tokens into text segments.

use segtok::segmenter::{split_single, SegmentConfig};

/// How tokens become segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentPolicy {
    /// Every non-empty token is its own segment.
    PerToken,
    /// Accumulate until a sentence is followed by the start of another.
    /// Text longer than `max_chars` (0 = unlimited) is cut at the last
    /// whitespace before the limit.
    Sentence { max_chars: usize },
}

impl SegmentPolicy {
    /// Parse `token` or `sentence`.
    pub fn parse(name: &str, max_chars: usize) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "token" | "per_token" => Some(Self::PerToken),
            "sentence" => Some(Self::Sentence { max_chars }),
            _ => None,
        }
    }
}

/// Splits a token stream into segments according to a [`SegmentPolicy`].
#[derive(Debug, Clone)]
pub struct Segmenter {
    policy: SegmentPolicy,
    buf: String,
}

impl Segmenter {
    pub fn new(policy: SegmentPolicy) -> Self {
        Self {
            policy,
            buf: String::new(),
        }
    }

    /// Feed one token; returns the segments it completed, in order.
    /// Sentence segments come back trimmed.
    pub fn push(&mut self, token: &str) -> Vec<String> {
        match self.policy {
            SegmentPolicy::PerToken => {
                if token.is_empty() {
                    Vec::new()
                } else {
                    vec![token.to_string()]
                }
            }
            SegmentPolicy::Sentence { max_chars } => {
                self.buf.push_str(token);
                let mut sents = split_single(&self.buf, SegmentConfig::default());
                // the last sentence may still grow, so it stays buffered
                let Some(last) = sents.pop() else {
                    return Vec::new();
                };
                let tail = match self.buf.rfind(last.as_str()) {
                    Some(start) => self.buf[start..].to_string(),
                    None => last,
                };
                self.buf = tail;

                let mut out = Vec::new();
                for sent in sents {
                    out.extend(cap(sent, max_chars));
                }
                if max_chars > 0 {
                    while self.buf.chars().count() > max_chars {
                        let end = overflow_end(&self.buf, max_chars);
                        let piece: String = self.buf.drain(..end).collect();
                        if !piece.trim().is_empty() {
                            out.push(piece.trim().to_string());
                        }
                    }
                }
                out
            }
        }
    }

    /// Flush whatever is buffered once generation has finished.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        let rest = rest.trim();
        if rest.is_empty() {
            None
        } else {
            Some(rest.to_string())
        }
    }

    /// Text held back waiting for a sentence boundary.
    pub fn pending(&self) -> &str {
        &self.buf
    }
}

/// Cut `text` into trimmed pieces of at most `max_chars` characters
/// (0 = no limit).
fn cap(mut text: String, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    if max_chars > 0 {
        while text.chars().count() > max_chars {
            let end = overflow_end(&text, max_chars);
            pieces.push(text.drain(..end).collect::<String>());
        }
    }
    pieces.push(text);
    pieces
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Byte offset to cut an over-long text at: the last whitespace or clause
/// mark before the limit, or the limit itself.
fn overflow_end(text: &str, max_chars: usize) -> usize {
    let limit = text
        .char_indices()
        .nth(max_chars)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let mut cut = 0;
    for (i, ch) in text[..limit].char_indices() {
        if ch.is_whitespace() || matches!(ch, '，' | '、' | '；' | '：') {
            cut = i + ch.len_utf8();
        }
    }
    if cut == 0 {
        limit
    } else {
        cut
    }
}
