//! Stream connector: one task per subscription.
//!
//! The connector opens a subscription through a [`FeedTransport`], decodes
//! every line, and hands posts to the ingestion pipeline over an unbounded
//! channel so the transport is never held up by storage. Ingestion runs on
//! its own task; its failures cannot reach the subscription.

use super::{FeedParams, FeedSignal, FeedStream, FeedTransport};
use futures::StreamExt;
use murmur_core::metrics::{
    FEED_DELETE_NOTICES, FEED_LIMITED_POSTS, FEED_SUBSCRIPTIONS, FEED_TRANSIENT_ERRORS, increment,
};
use murmur_core::{FeedMessage, FeedPost};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// Counters shared by every subscription of one connector.
#[derive(Debug, Default)]
pub struct ConnectorStats {
    pub subscriptions: AtomicUsize,
    pub posts: AtomicUsize,
    pub delete_notices: AtomicUsize,
    pub limit_notices: AtomicUsize,
    pub transient_errors: AtomicUsize,
}

/// Manages feed subscriptions and dispatches decoded posts.
pub struct StreamConnector<T> {
    transport: Arc<T>,
    params: Arc<FeedParams>,
    posts: UnboundedSender<FeedPost>,
    signals: UnboundedSender<FeedSignal>,
    stats: Arc<ConnectorStats>,
}

impl<T: FeedTransport> StreamConnector<T> {
    /// Create a connector.
    ///
    /// # Arguments
    ///
    /// * `posts` - receives every decoded post, exactly once
    /// * `signals` - receives terminal notifications for each subscription
    pub fn new(
        transport: Arc<T>,
        params: FeedParams,
        posts: UnboundedSender<FeedPost>,
        signals: UnboundedSender<FeedSignal>,
    ) -> Self {
        Self {
            transport,
            params: Arc::new(params),
            posts,
            signals,
            stats: Arc::new(ConnectorStats::default()),
        }
    }

    /// The subscription filter.
    pub fn params(&self) -> &FeedParams {
        &self.params
    }

    /// Counters across all subscriptions.
    pub fn stats(&self) -> &Arc<ConnectorStats> {
        &self.stats
    }

    /// Open a subscription on a new task.
    ///
    /// The task ends when the subscription does, after sending at least one
    /// [`FeedSignal`] tagged with `generation`.
    pub fn open(&self, generation: u64) -> JoinHandle<()> {
        let subscription = Subscription {
            generation,
            transport: Arc::clone(&self.transport),
            params: Arc::clone(&self.params),
            posts: self.posts.clone(),
            signals: self.signals.clone(),
            stats: Arc::clone(&self.stats),
        };

        tokio::spawn(subscription.run())
    }
}

/// State owned by one subscription task.
struct Subscription<T> {
    generation: u64,
    transport: Arc<T>,
    params: Arc<FeedParams>,
    posts: UnboundedSender<FeedPost>,
    signals: UnboundedSender<FeedSignal>,
    stats: Arc<ConnectorStats>,
}

impl<T: FeedTransport> Subscription<T> {
    async fn run(self) {
        tracing::info!(
            "Opening {} feed stream (generation {})...",
            self.transport.name(),
            self.generation
        );
        self.stats.subscriptions.fetch_add(1, Ordering::Relaxed);
        increment(FEED_SUBSCRIPTIONS, 1);

        let stream = match self.transport.open(&self.params).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("Failed to open feed stream: {}", e);
                self.signal(FeedSignal::Ended {
                    generation: self.generation,
                    reason: e.to_string(),
                });
                return;
            }
        };

        self.pump(stream).await;

        tracing::info!("Feed stream closed (generation {})", self.generation);
        self.signal(FeedSignal::Destroyed {
            generation: self.generation,
        });
    }

    /// Read lines until the stream ends or the feed says it is disconnecting.
    async fn pump(&self, mut stream: FeedStream) {
        while let Some(item) = stream.next().await {
            let line = match item {
                Ok(line) => line,
                Err(e) => {
                    self.transient_error(&e);
                    continue;
                }
            };

            match FeedMessage::parse(&line) {
                Ok(FeedMessage::KeepAlive) => {}
                Ok(FeedMessage::Post(post)) => {
                    self.stats.posts.fetch_add(1, Ordering::Relaxed);
                    if self.posts.send(*post).is_err() {
                        tracing::warn!("Ingestion worker is gone, dropping subscription");
                        return;
                    }
                }
                Ok(FeedMessage::Delete(notice)) => {
                    self.stats.delete_notices.fetch_add(1, Ordering::Relaxed);
                    increment(FEED_DELETE_NOTICES, 1);
                    tracing::info!(
                        "Delete request for post {} (user {})",
                        notice.post_id,
                        notice.user_id.as_deref().unwrap_or("unknown")
                    );
                }
                Ok(FeedMessage::Limit { missed }) => {
                    self.stats.limit_notices.fetch_add(1, Ordering::Relaxed);
                    increment(FEED_LIMITED_POSTS, missed);
                    tracing::warn!("Missed {} posts due to rate limiting", missed);
                }
                Ok(FeedMessage::Warning(message)) => {
                    tracing::warn!("Feed warning: {}", message);
                }
                Ok(FeedMessage::Disconnect { code, reason }) => {
                    tracing::warn!(
                        "Feed is closing the subscription (code {:?}): {}",
                        code,
                        reason
                    );
                    self.signal(FeedSignal::Ended {
                        generation: self.generation,
                        reason,
                    });
                    return;
                }
                Err(e) => self.transient_error(&e),
            }
        }
    }

    fn transient_error(&self, e: &dyn std::fmt::Display) {
        self.stats.transient_errors.fetch_add(1, Ordering::Relaxed);
        increment(FEED_TRANSIENT_ERRORS, 1);
        tracing::warn!("Transient feed error: {}", e);
    }

    fn signal(&self, signal: FeedSignal) {
        if self.signals.send(signal).is_err() {
            tracing::debug!("No supervisor listening for feed signals");
        }
    }
}
