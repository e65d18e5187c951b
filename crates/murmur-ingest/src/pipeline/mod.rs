//! Ingestion pipeline for feed posts.
//!
//! - [`IngestionPipeline`] - dedupe-then-insert of authors, originals and posts
//!
//! # Architecture
//!
//! ```text
//! [StreamConnector] → mpsc → [IngestionPipeline::run] → [PersistenceStore]
//!                                    │
//!                         author → original → post
//! ```
//!
//! The three writes of a post are strictly ordered; different posts are
//! processed one after another by a single worker.

mod ingest;

pub use ingest::{IngestReport, IngestionPipeline, PipelineConfig, PipelineStats};
