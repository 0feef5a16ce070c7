//! Centralized default constants for the remember crawler.
//!
//! **This module is the single source of truth** for shared default values.
//! Config structs in the other crates read their fallbacks from here.

// =============================================================================
// JOB PROCESSING
// =============================================================================

/// Default maximum retry count for failed jobs.
pub const JOB_MAX_RETRIES: i32 = 3;

/// Default job worker poll interval in milliseconds when the queue is empty.
pub const JOB_POLL_INTERVAL_MS: u64 = 1_000;

/// Default maximum concurrent jobs per worker.
pub const JOB_MAX_CONCURRENT: usize = 4;

/// Default job execution timeout in seconds.
pub const JOB_TIMEOUT_SECS: u64 = 120;

/// Default priority for crawl jobs (higher runs first).
pub const CRAWL_JOB_PRIORITY: i32 = 5;

// =============================================================================
// CRAWLING
// =============================================================================

/// Timeout for a single page fetch in seconds.
pub const CRAWL_TIMEOUT_SECS: u64 = 30;

/// Maximum number of redirects followed per fetch.
pub const CRAWL_MAX_REDIRECTS: usize = 10;

/// Maximum response body size read per fetch (5 MiB).
pub const CRAWL_MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

/// User-Agent sent with every fetch.
pub const CRAWL_USER_AGENT: &str = concat!("remember-crawler/", env!("CARGO_PKG_VERSION"));

/// Job id rendered in logs when the queue supplies none.
pub const UNKNOWN_JOB_ID: &str = "unknown";

// =============================================================================
// DATABASE
// =============================================================================

/// Default database URL when `DATABASE_URL` is not set.
pub const DATABASE_URL: &str = "postgres://localhost/remember";
