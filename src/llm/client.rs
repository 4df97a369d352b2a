//! LLM HTTP Client
//!
//! This module provides a reusable HTTP client for making requests to LLM APIs
//! and a small server-sent-events reader for streamed completions.
//!
//! Retrying is not done here: failed calls surface as [`DbdexError::LLMApiError`]
//! carrying the HTTP status and the provider's error body, and the agent's
//! retrying invoker decides what to do with them.

use crate::error::{DbdexError, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde::Serialize;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Default timeout for HTTP requests (in seconds)
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// HTTP client for LLM API requests
#[derive(Clone)]
pub struct LLMHttpClient {
    /// Reqwest HTTP client
    client: Client,
}

impl LLMHttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    /// Create a new HTTP client with custom timeout
    pub fn with_timeout(timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self { client })
    }

    /// POST a JSON body and return the response text
    ///
    /// Non-success statuses become [`DbdexError::LLMApiError`] for `provider`.
    pub async fn post_json<T: Serialize>(
        &self,
        provider: &str,
        url: &str,
        headers: HeaderMap,
        body: &T,
    ) -> Result<String> {
        let response = self.send(provider, url, headers, body).await?;
        Ok(response.text().await?)
    }

    /// POST a JSON body and return the open response for streaming
    pub async fn post_stream<T: Serialize>(
        &self,
        provider: &str,
        url: &str,
        headers: HeaderMap,
        body: &T,
    ) -> Result<SseStream> {
        let response = self.send(provider, url, headers, body).await?;
        Ok(SseStream::new(response))
    }

    async fn send<T: Serialize>(
        &self,
        provider: &str,
        url: &str,
        headers: HeaderMap,
        body: &T,
    ) -> Result<Response> {
        debug!(provider, url, "sending model request");
        let response = self
            .client
            .post(url)
            .headers(headers)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read response body".to_string());

        Err(DbdexError::LLMApiError {
            provider: provider.to_string(),
            message,
            status: status.as_u16(),
        })
    }

    /// Build standard headers for API requests
    pub fn build_headers(api_key: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if !api_key.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|_| DbdexError::Config("Invalid API key format".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Add custom header to existing headers
    pub fn add_header(mut headers: HeaderMap, key: &str, value: &str) -> Result<HeaderMap> {
        let key_header = HeaderName::from_str(key)
            .map_err(|_| DbdexError::Config(format!("Invalid header name: {}", key)))?;
        let value_header = HeaderValue::from_str(value)
            .map_err(|_| DbdexError::Config(format!("Invalid value for header {}", key)))?;

        headers.insert(key_header, value_header);
        Ok(headers)
    }
}

/// One decoded server-sent event payload
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    /// A `data:` line
    Data(String),
    /// The `data: [DONE]` terminator
    Done,
}

/// Splits a byte stream into `data:` payloads
///
/// Lines are only decoded once complete, so multi-byte characters split across
/// chunks survive intact.
#[derive(Debug, Default)]
pub struct SseBuffer {
    pending: Vec<u8>,
}

impl SseBuffer {
    pub fn push(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// Next complete event, skipping comments, blank lines and other fields
    pub fn next_event(&mut self) -> Option<SseEvent> {
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\r', '\n']);

            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim_start();
                if data == "[DONE]" {
                    return Some(SseEvent::Done);
                }
                return Some(SseEvent::Data(data.to_string()));
            }
        }
        None
    }

    /// Terminate a trailing line that arrived without a newline
    pub fn finish(&mut self) {
        if !self.pending.is_empty() {
            self.pending.push(b'\n');
        }
    }
}

/// Server-sent events read from an open response
pub struct SseStream {
    response: Response,
    buffer: SseBuffer,
    finished: bool,
}

impl SseStream {
    fn new(response: Response) -> Self {
        Self {
            response,
            buffer: SseBuffer::default(),
            finished: false,
        }
    }

    /// Next `data:` payload, `None` once the stream is done
    pub async fn next_data(&mut self) -> Result<Option<String>> {
        loop {
            match self.buffer.next_event() {
                Some(SseEvent::Data(data)) => return Ok(Some(data)),
                Some(SseEvent::Done) => {
                    self.finished = true;
                    return Ok(None);
                }
                None if self.finished => return Ok(None),
                None => {}
            }

            match self.response.chunk().await? {
                Some(bytes) => self.buffer.push(&bytes),
                None => {
                    self.buffer.finish();
                    self.finished = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_client_creation() {
        assert!(LLMHttpClient::new().is_ok());
        assert!(LLMHttpClient::with_timeout(30).is_ok());
    }

    #[test]
    fn test_headers_building() {
        let headers = LLMHttpClient::build_headers("test-key").unwrap();
        assert_eq!(headers.get("content-type").unwrap(), "application/json");
        assert_eq!(headers.get("authorization").unwrap(), "Bearer test-key");

        let headers = LLMHttpClient::build_headers("").unwrap();
        assert!(headers.get("authorization").is_none());
    }

    #[test]
    fn test_add_header() {
        let headers = LLMHttpClient::add_header(HeaderMap::new(), "x-api-key", "abc").unwrap();
        assert_eq!(headers.get("x-api-key").unwrap(), "abc");
        assert!(LLMHttpClient::add_header(HeaderMap::new(), "bad header", "abc").is_err());
    }

    #[test]
    fn test_sse_buffer_splits_chunks() {
        let mut buffer = SseBuffer::default();
        buffer.push(b": keep-alive\n\ndata: {\"a\":");
        assert_eq!(buffer.next_event(), None);

        buffer.push(b"1}\r\n\ndata: [DONE]\n\n");
        assert_eq!(buffer.next_event(), Some(SseEvent::Data("{\"a\":1}".to_string())));
        assert_eq!(buffer.next_event(), Some(SseEvent::Done));
        assert_eq!(buffer.next_event(), None);
    }

    #[test]
    fn test_sse_buffer_keeps_split_utf8() {
        let mut buffer = SseBuffer::default();
        let text = "data: café\n".as_bytes();
        let (head, tail) = text.split_at(10);
        buffer.push(head);
        assert_eq!(buffer.next_event(), None);
        buffer.push(tail);
        assert_eq!(buffer.next_event(), Some(SseEvent::Data("café".to_string())));
    }

    #[test]
    fn test_sse_buffer_trailing_line() {
        let mut buffer = SseBuffer::default();
        buffer.push(b"data: last");
        assert_eq!(buffer.next_event(), None);
        buffer.finish();
        assert_eq!(buffer.next_event(), Some(SseEvent::Data("last".to_string())));
    }
}
