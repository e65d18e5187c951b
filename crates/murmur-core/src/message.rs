//! Classification of raw feed lines.
//!
//! The feed is a stream of newline-delimited JSON. Besides posts it carries
//! keep-alive blank lines and a handful of control messages (delete notices,
//! rate-limit notices, stall warnings and a final disconnect notice). Each
//! line decodes into exactly one [`FeedMessage`].

use crate::error::{Error, Result};
use crate::model::FeedPost;
use serde::Deserialize;
use serde_json::Value;

/// A single decoded feed line.
#[derive(Debug, Clone)]
pub enum FeedMessage {
    /// Blank line sent periodically to keep the connection open.
    KeepAlive,
    /// A post, possibly a repost carrying its original.
    Post(Box<FeedPost>),
    /// A post was deleted upstream. Informational only.
    Delete(DeleteNotice),
    /// The feed withheld `missed` matching posts due to rate limiting.
    Limit { missed: u64 },
    /// The feed is about to close the subscription.
    Disconnect { code: Option<i64>, reason: String },
    /// The feed reports a stall or other non-fatal condition.
    Warning(String),
}

/// Payload of a delete notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteNotice {
    pub post_id: String,
    pub user_id: Option<String>,
}

#[derive(Deserialize)]
struct DeleteEnvelope {
    status: DeleteStatus,
}

#[derive(Deserialize)]
struct DeleteStatus {
    id_str: String,
    #[serde(default)]
    user_id_str: Option<String>,
}

impl FeedMessage {
    /// Decode one line of the feed.
    ///
    /// # Errors
    ///
    /// Returns an error if the line is not JSON, or is a JSON object of a
    /// kind the feed is not known to send. Callers treat both as transient
    /// feed errors.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Self::KeepAlive);
        }

        let value: Value = serde_json::from_str(line)?;
        let Value::Object(mut obj) = value else {
            return Err(Error::UnrecognizedMessage(format!(
                "expected a JSON object, got: {}",
                truncate(line, 64)
            )));
        };

        if let Some(delete) = obj.remove("delete") {
            let envelope: DeleteEnvelope = serde_json::from_value(delete)?;
            return Ok(Self::Delete(DeleteNotice {
                post_id: envelope.status.id_str,
                user_id: envelope.status.user_id_str,
            }));
        }

        if let Some(limit) = obj.get("limit") {
            let missed = limit.get("track").and_then(Value::as_u64).unwrap_or(0);
            return Ok(Self::Limit { missed });
        }

        if let Some(disconnect) = obj.get("disconnect") {
            return Ok(Self::Disconnect {
                code: disconnect.get("code").and_then(Value::as_i64),
                reason: disconnect
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or("unspecified")
                    .to_string(),
            });
        }

        if let Some(warning) = obj.get("warning") {
            let message = warning
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unspecified")
                .to_string();
            return Ok(Self::Warning(message));
        }

        if obj.contains_key("id_str") && obj.contains_key("user") {
            let post: FeedPost = serde_json::from_value(Value::Object(obj))?;
            return Ok(Self::Post(Box::new(post)));
        }

        let keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        Err(Error::UnrecognizedMessage(format!("keys: {}", keys.join(","))))
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
