//! # remember-jobs
//!
//! Link crawl pipeline and background job processing for remember.
//!
//! This crate provides:
//! - Validation of untrusted `link_crawling` payloads ([`validate`])
//! - The crawl pipeline: fetch, extract metadata, upsert link details
//! - A polling worker that runs crawl jobs concurrently with a per-job timeout
//!
//! ## Logging
//!
//! All events go through `tracing` with a shared field vocabulary: `job_id`,
//! `job_type`, `link_id`, `url`, `subsystem`, `component`, `duration_ms`,
//! `error`.
//!
//! | Level | Used for |
//! |-------|----------|
//! | `error` | Malformed payloads, failed crawls, queue bookkeeping failures |
//! | `warn` | Jobs reported failed to the queue, including timeouts |
//! | `info` | Crawl start and success, job completion, worker lifecycle |
//! | `debug` | Fetch and extraction details, claims, job progress |
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use remember_db::Database;
//! use remember_jobs::{
//!     CrawlLinkHandler, CrawlPipeline, FetchConfig, HtmlMetadataExtractor, HttpFetcher,
//!     JobWorker, WorkerConfig,
//! };
//!
//! let db = Database::connect("postgres://...").await?;
//! let pipeline = CrawlPipeline::new(
//!     Arc::new(HttpFetcher::new(FetchConfig::default())?),
//!     Arc::new(HtmlMetadataExtractor::new()),
//!     Arc::new(db.link_details.clone()),
//! );
//!
//! let handle = JobWorker::new(
//!     Arc::new(db.jobs.clone()),
//!     Arc::new(CrawlLinkHandler::new(Arc::new(pipeline))),
//!     WorkerConfig::from_env(),
//! )
//! .start();
//! // ...
//! handle.shutdown().await?;
//! ```

pub mod crawl_handler;
pub mod crawler;
pub mod fetch;
pub mod handler;
pub mod metadata;
pub mod request;
pub mod worker;

// Re-export core types
pub use remember_core::*;

pub use crawl_handler::CrawlLinkHandler;
pub use crawler::{CrawlError, CrawlJob, CrawlJobError, CrawlPipeline};
pub use fetch::{
    AllowAllUrls, FetchConfig, FetchError, FetchedPage, HttpFetcher, PageFetcher, UrlPolicy,
};
pub use handler::{JobContext, JobHandler, JobResult};
pub use metadata::{ExtractionError, HtmlMetadataExtractor, MetadataExtractor};
pub use request::{validate, CrawlLinkRequest, FieldIssue, ValidationError};
pub use worker::{JobWorker, WorkerConfig, WorkerHandle};
