//! Incremental text download.

use anyhow::Context;
use async_stream::try_stream;
use futures::{Stream, StreamExt};
use reqwest::Client;

/// GET `url` and yield the text received so far after every body chunk.
///
/// Each item is the full accumulated text, not the delta. A non-success
/// status is an error. Dropping the stream drops the in-flight request.
pub fn fetch_text_stream(client: Client, url: String) -> impl Stream<Item = anyhow::Result<String>> {
    try_stream! {
        let response = client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;
        let status = response.status();
        if !status.is_success() {
            Err::<(), _>(anyhow::anyhow!("HTTP error! status: {}", status.as_u16()))?;
        }

        let mut body = response.bytes_stream();
        let mut text = Utf8Accumulator::default();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.context("response body interrupted")?;
            text.push(&chunk);
            yield text.as_str().to_string();
        }
        if text.finish() {
            yield text.as_str().to_string();
        }
    }
}

/// Decodes UTF-8 that may be split at arbitrary byte positions.
#[derive(Debug, Default)]
struct Utf8Accumulator {
    text: String,
    pending: Vec<u8>,
}

impl Utf8Accumulator {
    fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(s) => {
                    self.text.push_str(s);
                    self.pending.clear();
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    // valid_up_to() guarantees this prefix decodes
                    self.text
                        .push_str(std::str::from_utf8(&self.pending[..valid]).unwrap_or_default());
                    match e.error_len() {
                        Some(bad) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                        None => {
                            // incomplete sequence at the end: wait for more bytes
                            self.pending.drain(..valid);
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Flush a dangling partial sequence. Returns whether the text changed.
    fn finish(&mut self) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        self.pending.clear();
        self.text.push(char::REPLACEMENT_CHARACTER);
        true
    }

    fn as_str(&self) -> &str {
        &self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn accumulator_handles_split_multibyte_sequences() {
        let bytes = "日本".as_bytes();
        let mut acc = Utf8Accumulator::default();
        acc.push(&bytes[..1]);
        assert_eq!(acc.as_str(), "");
        acc.push(&bytes[1..4]);
        assert_eq!(acc.as_str(), "日");
        acc.push(&bytes[4..]);
        assert_eq!(acc.as_str(), "日本");
        assert!(!acc.finish());
    }

    #[test]
    fn accumulator_replaces_invalid_bytes() {
        let mut acc = Utf8Accumulator::default();
        acc.push(&[b'a', 0xff, b'b']);
        assert_eq!(acc.as_str(), "a\u{fffd}b");
        acc.push(&[0xe6]);
        assert!(acc.finish());
        assert_eq!(acc.as_str(), "a\u{fffd}b\u{fffd}");
    }

    async fn serve_raw(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{addr}/stream")
    }

    #[tokio::test]
    async fn yields_accumulated_text() {
        let url = serve_raw("HTTP/1.1 200 OK\r\ncontent-length: 11\r\nconnection: close\r\n\r\nhello world").await;
        let items: Vec<_> = fetch_text_stream(Client::new(), url).collect().await;
        let last = items.last().unwrap().as_ref().unwrap();
        assert_eq!(last, "hello world");
        assert!(items.iter().all(|i| i.is_ok()));
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let url = serve_raw("HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n").await;
        let items: Vec<_> = fetch_text_stream(Client::new(), url).collect().await;
        assert_eq!(items.len(), 1);
        let err = items[0].as_ref().unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}
