//! Murmur live ingestion components.
//!
//! This crate subscribes to a filtered real-time feed of social posts and
//! persists every post, its author and (for reposts) the original post and
//! its author, each exactly once.
//!
//! # Modules
//!
//! - [`source`] - Feed transport and stream connector
//! - [`pipeline`] - Dedupe-then-insert ingestion of posts
//! - [`store`] - Persistence seam and its SQLite implementation
//! - [`supervisor`] - Reopens the subscription after it ends
//! - [`stats`] - Periodic status line
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐  signals  ┌─────────────────────┐
//! │ StreamConnector │──────────▶│ ReconnectSupervisor │
//! └────────┬────────┘◀──────────└─────────────────────┘
//!          │ posts        reopen
//!          ▼
//! ┌─────────────────┐
//! │IngestionPipeline│  author → original → post
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │PersistenceStore │  SQLite, TEXT primary keys
//! └─────────────────┘
//! ```
//!
//! The connector never waits on storage: posts cross an unbounded channel to
//! a single ingestion worker.

pub mod error;
pub mod pipeline;
pub mod source;
pub mod stats;
pub mod store;
pub mod supervisor;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

pub use pipeline::{IngestReport, IngestionPipeline, PipelineConfig, PipelineStats};

pub use source::{
    FeedParams, FeedSignal, FeedStream, FeedTransport, HttpConfig, HttpTransport, StreamConnector,
};

pub use stats::StatusReporter;

pub use store::{EntityKind, PersistenceStore, SqliteStore, StoreError, StoreResult};

pub use supervisor::{ReconnectSupervisor, SupervisorState, SupervisorStats};
