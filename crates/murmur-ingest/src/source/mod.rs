//! Feed subscription: transport and connector.
//!
//! # Components
//!
//! - [`FeedTransport`] - opens a filtered subscription and yields raw lines
//! - [`HttpTransport`] - streaming HTTP implementation used by the daemon
//! - [`StreamConnector`] - decodes lines, dispatches posts to the pipeline and
//!   reports when a subscription is over
//!
//! # Signals
//!
//! Posts go out on the post channel. Delete notices, rate-limit notices,
//! stall warnings and transient errors are logged and counted. The end of a
//! subscription is reported on the signal channel as a [`FeedSignal`], tagged
//! with the generation of the subscription it belongs to.

mod connector;
mod http;

pub use connector::{ConnectorStats, StreamConnector};
pub use http::{HttpConfig, HttpTransport, LineBuffer};

use crate::Result;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;

/// Stream of raw feed lines. An `Err` item is a transient transport error.
pub type FeedStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Subscription filter, fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedParams {
    /// Keywords to track.
    pub track: Vec<String>,

    /// Language tag (e.g., "en").
    pub language: String,
}

impl Default for FeedParams {
    fn default() -> Self {
        Self {
            track: vec!["http".to_string(), "RT".to_string()],
            language: "en".to_string(),
        }
    }
}

/// Terminal notification for one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSignal {
    /// The feed announced it is closing the subscription, or it could not
    /// be opened at all.
    Ended { generation: u64, reason: String },

    /// The underlying stream is gone.
    Destroyed { generation: u64 },
}

impl FeedSignal {
    /// Generation of the subscription this signal belongs to.
    pub fn generation(&self) -> u64 {
        match self {
            Self::Ended { generation, .. } | Self::Destroyed { generation } => *generation,
        }
    }
}

/// Opens feed subscriptions.
pub trait FeedTransport: Send + Sync + 'static {
    /// Human-readable name for this transport (used in logs).
    fn name(&self) -> &'static str;

    /// Open a subscription filtered by `params`.
    fn open(&self, params: &FeedParams) -> impl Future<Output = Result<FeedStream>> + Send;
}
