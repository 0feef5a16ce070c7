//! Polling worker that feeds claimed queue jobs to a [`JobHandler`].
//!
//! The worker keeps up to `max_concurrent_jobs` handlers in flight, refilling
//! as each finishes, and records every outcome with the queue. Shutdown stops
//! claiming and waits for in-flight jobs, so no claimed job is left `running`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use remember_core::{defaults, Error, Job, JobRepository, Result};

use crate::handler::{JobContext, JobHandler, JobResult};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Idle wait between claims when the queue is empty.
    pub poll_interval_ms: u64,
    pub max_concurrent_jobs: usize,
    /// Handler time limit; overrunning counts as a retryable failure.
    pub job_timeout_secs: u64,
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::JOB_POLL_INTERVAL_MS,
            max_concurrent_jobs: defaults::JOB_MAX_CONCURRENT,
            job_timeout_secs: defaults::JOB_TIMEOUT_SECS,
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// | Variable | Default |
    /// |----------|---------|
    /// | `JOB_WORKER_ENABLED` | `true` |
    /// | `JOB_MAX_CONCURRENT` | `4` |
    /// | `JOB_POLL_INTERVAL_MS` | `1000` |
    /// | `JOB_TIMEOUT_SECS` | `120` |
    pub fn from_env() -> Self {
        fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok().and_then(|v| v.parse().ok())
        }

        Self {
            poll_interval_ms: parsed("JOB_POLL_INTERVAL_MS")
                .unwrap_or(defaults::JOB_POLL_INTERVAL_MS),
            max_concurrent_jobs: parsed::<usize>("JOB_MAX_CONCURRENT")
                .unwrap_or(defaults::JOB_MAX_CONCURRENT)
                .max(1),
            job_timeout_secs: parsed::<u64>("JOB_TIMEOUT_SECS")
                .unwrap_or(defaults::JOB_TIMEOUT_SECS)
                .max(1),
            enabled: std::env::var("JOB_WORKER_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
        }
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max;
        self
    }

    pub fn with_job_timeout(mut self, secs: u64) -> Self {
        self.job_timeout_secs = secs;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Control handle for a started worker.
///
/// Dropping the handle also stops the worker, after in-flight jobs finish.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Stop claiming jobs and wait until every in-flight job has been recorded
    /// with the queue.
    pub async fn shutdown(self) -> Result<()> {
        // Send fails only when the loop has already exited (e.g. disabled).
        let _ = self.shutdown_tx.send(()).await;
        self.task
            .await
            .map_err(|e| Error::Internal(format!("job worker task failed: {e}")))
    }
}

/// Claims jobs of the handler's type and runs them with a per-job timeout.
pub struct JobWorker {
    jobs: Arc<dyn JobRepository>,
    handler: Arc<dyn JobHandler>,
    config: WorkerConfig,
}

impl JobWorker {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        handler: Arc<dyn JobHandler>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            jobs,
            handler,
            config,
        }
    }

    /// Spawn the polling loop on the current runtime.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(self.run(shutdown_rx));
        WorkerHandle { shutdown_tx, task }
    }

    async fn run(self, mut shutdown_rx: mpsc::Receiver<()>) {
        let job_type = self.handler.job_type();
        if !self.config.enabled {
            info!(subsystem = "worker", %job_type, "Job worker disabled");
            return;
        }

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let max_concurrent = self.config.max_concurrent_jobs.max(1);
        let job_timeout = Duration::from_secs(self.config.job_timeout_secs);
        info!(
            subsystem = "worker",
            %job_type,
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent,
            job_timeout_secs = self.config.job_timeout_secs,
            "Job worker started"
        );

        let mut in_flight = JoinSet::new();
        loop {
            while in_flight.len() < max_concurrent {
                let Some(job) = self.claim().await else {
                    break;
                };
                in_flight.spawn(run_job(
                    self.jobs.clone(),
                    self.handler.clone(),
                    job_timeout,
                    job,
                ));
            }
            let saturated = in_flight.len() >= max_concurrent;

            tokio::select! {
                _ = shutdown_rx.recv() => break,
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    log_join(joined);
                }
                _ = sleep(poll_interval), if !saturated => {}
            }
        }

        if !in_flight.is_empty() {
            info!(
                subsystem = "worker",
                in_flight = in_flight.len(),
                "Waiting for in-flight jobs"
            );
        }
        while let Some(joined) = in_flight.join_next().await {
            log_join(joined);
        }
        info!(subsystem = "worker", %job_type, "Job worker stopped");
    }

    async fn claim(&self) -> Option<Job> {
        match self
            .jobs
            .claim_next_for_types(&[self.handler.job_type()])
            .await
        {
            Ok(job) => job,
            Err(e) => {
                error!(subsystem = "worker", error = %e, "Failed to claim job");
                None
            }
        }
    }
}

fn log_join(joined: std::result::Result<(), JoinError>) {
    if let Err(e) = joined {
        error!(subsystem = "worker", error = %e, "Job task panicked");
    }
}

/// Run one claimed job and record its outcome with the queue.
async fn run_job(
    jobs: Arc<dyn JobRepository>,
    handler: Arc<dyn JobHandler>,
    timeout: Duration,
    job: Job,
) {
    let start = Instant::now();
    let job_id = job.id;
    let job_type = job.job_type;
    debug!(subsystem = "worker", %job_id, %job_type, "Job claimed");

    let ctx = JobContext::new(job).with_progress_callback(move |percent, message| {
        debug!(
            subsystem = "worker",
            %job_id,
            percent,
            message = message.unwrap_or_default(),
            "Job progress"
        );
    });

    let result = match tokio::time::timeout(timeout, handler.execute(ctx)).await {
        Ok(result) => result,
        Err(_) => JobResult::Retry(format!("job exceeded timeout of {}s", timeout.as_secs())),
    };
    let duration_ms = start.elapsed().as_millis() as u64;

    let recorded = match &result {
        JobResult::Success(summary) => jobs.complete(job_id, summary.clone()).await,
        JobResult::Retry(reason) => {
            warn!(
                subsystem = "worker",
                %job_id,
                %job_type,
                error = %reason,
                duration_ms,
                "Job failed"
            );
            jobs.fail(job_id, reason).await
        }
    };

    match recorded {
        Ok(()) if matches!(result, JobResult::Success(_)) => {
            info!(subsystem = "worker", %job_id, %job_type, duration_ms, "Job completed");
        }
        Ok(()) => {}
        Err(e) => {
            error!(
                subsystem = "worker",
                %job_id,
                %job_type,
                error = %e,
                "Failed to record job outcome"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval_ms, 1_000);
        assert_eq!(config.max_concurrent_jobs, 4);
        assert_eq!(config.job_timeout_secs, 120);
        assert!(config.enabled);
    }

    #[test]
    fn test_worker_config_builder() {
        let config = WorkerConfig::default()
            .with_poll_interval(250)
            .with_max_concurrent(8)
            .with_job_timeout(5)
            .with_enabled(false);

        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.max_concurrent_jobs, 8);
        assert_eq!(config.job_timeout_secs, 5);
        assert!(!config.enabled);
    }
}
