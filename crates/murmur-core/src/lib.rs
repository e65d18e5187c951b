//! Core types and shared utilities for the murmur ingestion pipeline.
//!
//! This crate provides:
//! - Row types for the two persisted entity kinds ([`User`], [`Post`])
//! - Wire types for posts as the feed delivers them ([`FeedPost`], [`FeedUser`])
//! - Classification of raw feed lines ([`FeedMessage`])
//! - Metric names and recording helpers
//! - Shared error types

mod error;
mod message;
pub mod metrics;
mod model;

pub use error::{Error, Result};
pub use message::{DeleteNotice, FeedMessage};
pub use model::{
    FEED_TIMESTAMP_FORMAT, FeedPost, FeedUser, Post, User, parse_feed_timestamp,
};
