//! Metric names and recording helpers for murmur.
//!
//! Metrics are recorded through the `metrics` facade. Nothing is exported
//! unless the embedding process installs a recorder; the ingestion daemon
//! itself only logs a periodic status line.
//!
//! # Metric Naming Conventions
//!
//! - Prefix: component name (`ingest_`, `feed_`)
//! - Suffix: unit or type (`_total`)

use metrics::describe_counter;

/// Posts handed to the ingestion pipeline.
pub const INGEST_POSTS_RECEIVED: &str = "ingest_posts_received_total";
/// User rows inserted.
pub const INGEST_USERS_INSERTED: &str = "ingest_users_inserted_total";
/// Post rows inserted (originals and the posts themselves).
pub const INGEST_POSTS_INSERTED: &str = "ingest_posts_inserted_total";
/// Entities found already present, by lookup or by a lost insert race.
pub const INGEST_DUPLICATES: &str = "ingest_duplicates_total";
/// Posts dropped after a non-fatal processing failure.
pub const INGEST_FAILURES: &str = "ingest_failures_total";
/// Store operations retried after a backend failure.
pub const STORE_RETRIES: &str = "store_retries_total";
/// Feed subscriptions opened (first connect and every reconnect).
pub const FEED_SUBSCRIPTIONS: &str = "feed_subscriptions_total";
/// Transient feed errors (bad lines, transport hiccups).
pub const FEED_TRANSIENT_ERRORS: &str = "feed_transient_errors_total";
/// Delete notices received.
pub const FEED_DELETE_NOTICES: &str = "feed_delete_notices_total";
/// Posts the feed reported as withheld by rate limiting.
pub const FEED_LIMITED_POSTS: &str = "feed_limited_posts_total";

/// Register descriptions for every murmur metric.
///
/// Safe to call more than once.
pub fn register_descriptions() {
    describe_counter!(INGEST_POSTS_RECEIVED, "Posts handed to the ingestion pipeline");
    describe_counter!(INGEST_USERS_INSERTED, "User rows inserted");
    describe_counter!(INGEST_POSTS_INSERTED, "Post rows inserted");
    describe_counter!(
        INGEST_DUPLICATES,
        "Entities skipped because they were already stored"
    );
    describe_counter!(INGEST_FAILURES, "Posts dropped after a processing failure");
    describe_counter!(STORE_RETRIES, "Store operations retried after a backend failure");
    describe_counter!(FEED_SUBSCRIPTIONS, "Feed subscriptions opened");
    describe_counter!(FEED_TRANSIENT_ERRORS, "Transient feed errors");
    describe_counter!(FEED_DELETE_NOTICES, "Delete notices received from the feed");
    describe_counter!(
        FEED_LIMITED_POSTS,
        "Posts withheld by the feed due to rate limiting"
    );
}

/// Increment a counter.
///
/// Convenience wrapper around `metrics::counter!`.
#[inline]
pub fn increment(name: &'static str, count: u64) {
    metrics::counter!(name).increment(count);
}
