//! Streaming HTTP feed transport.
//!
//! Opens a long-lived POST request against the filter endpoint and turns the
//! chunked response body into newline-delimited lines. Credentials are passed
//! in as an opaque `Authorization` header value; obtaining them is up to the
//! caller.
//!
//! The feed sends a blank keep-alive line every few seconds. A connection
//! that goes quiet for longer than [`HttpConfig::stall_timeout`] is treated as
//! dead: the stream yields [`Error::FeedStalled`] and ends.

use super::{FeedParams, FeedStream, FeedTransport};
use crate::{Error, Result};
use futures::stream;
use reqwest::header::AUTHORIZATION;
use std::time::Duration;

/// Configuration for the HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Filter endpoint URL.
    pub url: String,

    /// Value sent verbatim as the `Authorization` header, if any.
    pub authorization: Option<String>,

    /// Timeout for establishing the TCP/TLS connection.
    pub connect_timeout: Duration,

    /// Longest gap between body chunks before the stream is given up.
    pub stall_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            url: "https://stream.twitter.com/1.1/statuses/filter.json".to_string(),
            authorization: None,
            connect_timeout: Duration::from_secs(30),
            stall_timeout: Duration::from_secs(90),
        }
    }
}

/// Feed transport over a streaming HTTP response.
pub struct HttpTransport {
    client: reqwest::Client,
    config: HttpConfig,
}

impl HttpTransport {
    /// Build a transport with its own connection pool.
    pub fn new(config: HttpConfig) -> Result<Self> {
        if config.url.is_empty() {
            return Err(Error::Config("stream URL must not be empty".to_string()));
        }
        if config.stall_timeout.is_zero() {
            return Err(Error::Config("stall timeout must be non-zero".to_string()));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self { client, config })
    }
}

impl FeedTransport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn open(&self, params: &FeedParams) -> Result<FeedStream> {
        let form = [
            ("track", params.track.join(",")),
            ("language", params.language.clone()),
        ];

        let mut request = self.client.post(&self.config.url).form(&form);
        if let Some(auth) = &self.config.authorization {
            request = request.header(AUTHORIZATION, auth);
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::FeedStatus {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(
            "Subscribed to {} (track={}, language={})",
            self.config.url,
            params.track.join(","),
            params.language
        );

        Ok(Box::pin(into_lines(response, self.config.stall_timeout)))
    }
}

/// Turn a chunked response body into a stream of lines.
///
/// A body read error, or a gap longer than `stall_timeout`, is yielded once,
/// after which the stream ends.
fn into_lines(
    response: reqwest::Response,
    stall_timeout: Duration,
) -> impl futures::Stream<Item = Result<String>> + Send {
    stream::unfold(
        (response, LineBuffer::default(), false),
        move |(mut response, mut buffer, mut done)| async move {
            loop {
                if let Some(line) = buffer.next_line() {
                    return Some((Ok(line), (response, buffer, done)));
                }
                if done {
                    return buffer
                        .take_remainder()
                        .map(|line| (Ok(line), (response, buffer, true)));
                }
                match tokio::time::timeout(stall_timeout, response.chunk()).await {
                    Ok(Ok(Some(chunk))) => buffer.extend(&chunk),
                    Ok(Ok(None)) => done = true,
                    Ok(Err(e)) => return Some((Err(Error::Http(e)), (response, buffer, true))),
                    Err(_) => {
                        let stalled = Error::FeedStalled {
                            idle: stall_timeout,
                        };
                        return Some((Err(stalled), (response, buffer, true)));
                    }
                }
            }
        },
    )
}

/// Accumulates body chunks and splits them into lines.
///
/// Lines end with `\n`; a trailing `\r` is stripped. Chunk boundaries may
/// fall anywhere, including inside a multi-byte character.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    /// Append a chunk of body bytes.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete line, if any.
    pub fn next_line(&mut self) -> Option<String> {
        let end = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=end).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Take whatever is left after the body ended without a final newline.
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string())
    }
}
