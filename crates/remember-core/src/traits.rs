//! Core traits for remember abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// LINK DETAILS REPOSITORY
// =============================================================================

/// Store of the per-bookmark details record.
///
/// Bookmarks themselves belong to the surrounding application; this
/// repository only writes the details child of an existing bookmark.
#[async_trait]
pub trait LinkDetailsRepository: Send + Sync {
    /// Create or fully replace the details of the bookmark `details.link_id`.
    ///
    /// Must be atomic. Fails with [`crate::Error::LinkNotFound`] when the
    /// bookmark does not exist, without creating anything.
    async fn upsert_details(&self, details: &LinkDetails) -> Result<LinkDetails>;

    /// Get the stored details of a bookmark, if any.
    async fn get_details(&self, link_id: &str) -> Result<Option<LinkDetails>>;
}

// =============================================================================
// JOB REPOSITORY
// =============================================================================

/// Persistent job queue.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Queue a new job.
    async fn queue(
        &self,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
    ) -> Result<Uuid>;

    /// Claim the next pending job whose type is in `job_types`.
    /// An empty slice means "claim any type".
    async fn claim_next_for_types(&self, job_types: &[JobType]) -> Result<Option<Job>>;

    /// Mark job as completed.
    async fn complete(&self, job_id: Uuid, result: Option<JsonValue>) -> Result<()>;

    /// Mark job as failed.
    ///
    /// While retries remain the job goes back to pending; otherwise it is
    /// failed for good.
    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()>;

    /// Get job by ID.
    async fn get(&self, job_id: Uuid) -> Result<Option<Job>>;
}
