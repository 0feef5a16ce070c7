//! The seam between the queue worker and the crawl pipeline.
//!
//! The worker hands one claimed job to a [`JobHandler`] and turns the returned
//! [`JobResult`] into a queue transition.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use remember_core::{Job, JobType};

/// Sink for `(percent, message)` progress updates.
pub type ProgressCallback = Box<dyn Fn(i32, Option<&str>) + Send + Sync>;

/// A claimed job and where its progress goes.
pub struct JobContext {
    job: Job,
    progress: Option<ProgressCallback>,
}

impl JobContext {
    pub fn new(job: Job) -> Self {
        Self {
            job,
            progress: None,
        }
    }

    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(i32, Option<&str>) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    /// No-op when no callback is set.
    pub fn report_progress(&self, percent: i32, message: Option<&str>) {
        if let Some(progress) = &self.progress {
            progress(percent, message);
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job.id
    }

    /// Raw, unvalidated payload as stored in the queue.
    pub fn payload(&self) -> Option<&JsonValue> {
        self.job.payload.as_ref()
    }
}

/// Outcome a handler reports for one job.
#[derive(Debug)]
pub enum JobResult {
    /// The job is done; the value is stored as the job's result.
    Success(Option<JsonValue>),
    /// The job failed; the queue retries it while retries remain.
    Retry(String),
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Queue job type this handler claims.
    fn job_type(&self) -> JobType;

    async fn execute(&self, ctx: JobContext) -> JobResult;
}
