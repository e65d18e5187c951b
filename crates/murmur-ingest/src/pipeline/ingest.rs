//! Dedupe-then-insert ingestion of feed posts.
//!
//! Each post is written in three strictly ordered steps:
//!
//! 1. the author (lookup, insert if absent)
//! 2. for reposts, the original's author and then the original itself
//! 3. the post itself
//!
//! Every step is awaited before the next starts, so a post row is never
//! committed before its author or the original it references.

use crate::error::{Error, Result};
use crate::store::{PersistenceStore, StoreError, StoreResult};
use murmur_core::metrics::{
    INGEST_DUPLICATES, INGEST_FAILURES, INGEST_POSTS_INSERTED, INGEST_POSTS_RECEIVED,
    INGEST_USERS_INSERTED, STORE_RETRIES, increment,
};
use murmur_core::{FeedPost, Post, User};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};

/// Configuration for the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Attempts per store operation before the store is declared unavailable.
    pub store_retry_attempts: u32,

    /// Fixed pause between attempts.
    pub store_retry_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            store_retry_attempts: 3,
            store_retry_delay: Duration::from_millis(500),
        }
    }
}

/// What a single [`IngestionPipeline::ingest`] call wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub users_inserted: usize,
    pub posts_inserted: usize,
    /// Entities that were already stored (found by lookup or by a lost insert race).
    pub duplicates: usize,
}

impl IngestReport {
    fn record_user(&mut self, check: Check) {
        match check {
            Check::Inserted => self.users_inserted += 1,
            Check::AlreadyPresent => self.duplicates += 1,
        }
    }

    fn record_post(&mut self, check: Check) {
        match check {
            Check::Inserted => self.posts_inserted += 1,
            Check::AlreadyPresent => self.duplicates += 1,
        }
    }
}

/// Totals from a [`IngestionPipeline::run`] loop.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub posts_received: usize,
    pub posts_failed: usize,
    pub users_inserted: usize,
    pub posts_inserted: usize,
    pub duplicates: usize,
}

impl PipelineStats {
    fn absorb(&mut self, report: IngestReport) {
        self.users_inserted += report.users_inserted;
        self.posts_inserted += report.posts_inserted;
        self.duplicates += report.duplicates;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Check {
    Inserted,
    AlreadyPresent,
}

/// Dedupes posts and their referenced entities and writes new ones to the store.
pub struct IngestionPipeline<S> {
    store: Arc<S>,
    config: PipelineConfig,
    /// Posts received since the status reporter last looked.
    received: Arc<AtomicU64>,
}

impl<S: PersistenceStore> IngestionPipeline<S> {
    /// Create a pipeline writing through `store`.
    pub fn new(store: Arc<S>, config: PipelineConfig) -> Self {
        Self {
            store,
            config,
            received: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Counter incremented once per post handed to [`Self::ingest`].
    ///
    /// The status reporter swaps it back to zero on every report.
    pub fn received_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.received)
    }

    /// Ingest one post: author, then original (if a repost), then the post.
    ///
    /// Already-stored entities are skipped. A duplicate-key failure on insert
    /// counts as already stored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the post can't be converted to rows (nothing
    /// is written in that case), and [`Error::StoreUnavailable`] once a store
    /// operation has failed on every retry.
    pub async fn ingest(&self, post: &FeedPost) -> Result<IngestReport> {
        self.received.fetch_add(1, Ordering::Relaxed);
        increment(INGEST_POSTS_RECEIVED, 1);

        // Convert up front so a malformed post writes nothing.
        let author = post.user.to_row()?;
        let original = match post.original() {
            Some(original) => {
                let mut row = original.to_row()?;
                // Reposts of reposts are not resolved.
                row.reposted_post_id = None;
                Some((original.user.to_row()?, row))
            }
            None => None,
        };
        let row = post.to_row()?;

        let mut report = IngestReport::default();

        report.record_user(self.check_user(&author).await?);

        if let Some((original_author, original_row)) = &original {
            report.record_user(self.check_user(original_author).await?);
            report.record_post(self.check_post(original_row).await?);
        }

        report.record_post(self.check_post(&row).await?);

        increment(INGEST_USERS_INSERTED, report.users_inserted as u64);
        increment(INGEST_POSTS_INSERTED, report.posts_inserted as u64);
        increment(INGEST_DUPLICATES, report.duplicates as u64);

        debug!(
            "Ingested post {}: {} users, {} posts inserted, {} duplicates",
            row.id, report.users_inserted, report.posts_inserted, report.duplicates
        );

        Ok(report)
    }

    /// Consume posts until the channel closes.
    ///
    /// A post that fails to ingest is logged and skipped. Only an unavailable
    /// store stops the loop.
    pub async fn run(&self, mut posts: UnboundedReceiver<FeedPost>) -> Result<PipelineStats> {
        info!("Ingestion worker started");
        let mut stats = PipelineStats::default();

        while let Some(post) = posts.recv().await {
            stats.posts_received += 1;

            match self.ingest(&post).await {
                Ok(report) => stats.absorb(report),
                Err(e) if e.is_fatal() => {
                    error!("Stopping ingestion at post {}: {}", post.id_str, e);
                    return Err(e);
                }
                Err(e) => {
                    stats.posts_failed += 1;
                    increment(INGEST_FAILURES, 1);
                    warn!("Failed to ingest post {}: {}", post.id_str, e);
                }
            }
        }

        info!(
            "Post channel closed; ingested {} posts ({} failed)",
            stats.posts_received, stats.posts_failed
        );
        Ok(stats)
    }

    async fn check_user(&self, user: &User) -> Result<Check> {
        let existing = self
            .with_retry("get_user", || self.store.get_user(&user.id))
            .await?;
        if existing.is_some() {
            return Ok(Check::AlreadyPresent);
        }

        self.insert("put_user", || self.store.put_user(user)).await
    }

    async fn check_post(&self, post: &Post) -> Result<Check> {
        let existing = self
            .with_retry("get_post", || self.store.get_post(&post.id))
            .await?;
        if existing.is_some() {
            return Ok(Check::AlreadyPresent);
        }

        self.insert("put_post", || self.store.put_post(post)).await
    }

    async fn insert<F, Fut>(&self, op: &'static str, f: F) -> Result<Check>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<()>>,
    {
        match self.with_retry(op, f).await {
            Ok(()) => Ok(Check::Inserted),
            Err(e) if e.is_duplicate_key() => {
                debug!("{} lost an insert race: {}", op, e);
                Ok(Check::AlreadyPresent)
            }
            Err(e) => Err(e),
        }
    }

    /// Run a store operation, retrying backend failures with a fixed delay.
    async fn with_retry<T, F, Fut>(&self, op: &'static str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let max_attempts = self.config.store_retry_attempts.max(1);
        let mut attempt = 1;

        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e @ StoreError::DuplicateKey { .. }) => return Err(e.into()),
                Err(e) if attempt >= max_attempts => {
                    return Err(Error::StoreUnavailable {
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    warn!(
                        "Store {} failed (attempt {}/{}): {}",
                        op, attempt, max_attempts, e
                    );
                    increment(STORE_RETRIES, 1);
                    attempt += 1;
                    tokio::time::sleep(self.config.store_retry_delay).await;
                }
            }
        }
    }
}
