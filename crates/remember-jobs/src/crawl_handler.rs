//! CrawlLinkHandler: runs the crawl pipeline for `link_crawling` jobs.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use remember_core::JobType;

use crate::crawler::{CrawlJob, CrawlJobError, CrawlPipeline};
use crate::handler::{JobContext, JobHandler, JobResult};
use crate::request::URL_FIELD;

pub struct CrawlLinkHandler {
    pipeline: Arc<CrawlPipeline>,
}

impl CrawlLinkHandler {
    pub fn new(pipeline: Arc<CrawlPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl JobHandler for CrawlLinkHandler {
    fn job_type(&self) -> JobType {
        JobType::LinkCrawling
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let job = CrawlJob {
            id: Some(ctx.job_id().to_string()),
            data: ctx.payload().cloned(),
        };

        let report = |percent: i32, message: Option<&str>| ctx.report_progress(percent, message);
        match self.pipeline.run_job_with_progress(&job, &report).await {
            Ok(details) => {
                let url = job
                    .data
                    .as_ref()
                    .and_then(|p| p.get(URL_FIELD))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();

                JobResult::Success(Some(json!({
                    "link_id": details.link_id,
                    "url": url,
                    "has_title": details.title.is_some(),
                    "has_description": details.description.is_some(),
                    "has_image": details.image_url.is_some(),
                    "has_favicon": details.favicon.is_some(),
                })))
            }
            // A malformed payload ends the job without side effects. The
            // pipeline already logged it; the queue sees a normal completion.
            Err(CrawlJobError::Invalid(e)) => JobResult::Success(Some(json!({
                "rejected": true,
                "reason": e.to_string(),
            }))),
            // Already logged by the pipeline with job, url and link ids.
            Err(e @ CrawlJobError::Crawl(_)) => JobResult::Retry(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::test_support::StaticFetcher;
    use crate::handler::test_support::crawl_job;
    use crate::metadata::HtmlMetadataExtractor;
    use remember_db::test_fixtures::MemoryLinkStore;
    use std::sync::Mutex;

    fn handler(fetcher: StaticFetcher, store: Arc<MemoryLinkStore>) -> CrawlLinkHandler {
        CrawlLinkHandler::new(Arc::new(CrawlPipeline::new(
            Arc::new(fetcher),
            Arc::new(HtmlMetadataExtractor::new()),
            store,
        )))
    }

    #[test]
    fn test_handler_job_type() {
        let handler = handler(StaticFetcher::failing(), Arc::new(MemoryLinkStore::new()));
        assert_eq!(handler.job_type(), JobType::LinkCrawling);
    }

    #[tokio::test]
    async fn test_success_returns_summary() {
        let store = Arc::new(MemoryLinkStore::new().with_bookmark("bm_1"));
        let handler = handler(
            StaticFetcher::serving("<title>Example</title>"),
            store.clone(),
        );
        let progress = Arc::new(Mutex::new(Vec::new()));
        let sink = progress.clone();
        let ctx = JobContext::new(crawl_job(Some(json!({
            "url": "https://example.com/a",
            "linkId": "bm_1"
        }))))
        .with_progress_callback(move |pct, _| sink.lock().unwrap().push(pct));

        let result = handler.execute(ctx).await;

        match result {
            JobResult::Success(Some(summary)) => {
                assert_eq!(summary["link_id"], "bm_1");
                assert_eq!(summary["url"], "https://example.com/a");
                assert_eq!(summary["has_title"], true);
                assert_eq!(summary["has_description"], false);
                assert_eq!(summary["has_image"], false);
                assert_eq!(summary["has_favicon"], false);
            }
            other => panic!("expected success, got {other:?}"),
        }
        assert_eq!(*progress.lock().unwrap(), vec![10, 40, 70, 100]);
        assert!(store.details("bm_1").await.is_some());
    }

    #[tokio::test]
    async fn test_malformed_payload_completes_without_side_effects() {
        let store = Arc::new(MemoryLinkStore::new().with_bookmark("bm_1"));
        let handler = handler(StaticFetcher::serving("<title>x</title>"), store.clone());

        let result = handler
            .execute(JobContext::new(crawl_job(Some(
                json!({"url": "nope", "linkId": ""}),
            ))))
            .await;
        match result {
            JobResult::Success(Some(summary)) => {
                assert_eq!(summary["rejected"], true);
                let reason = summary["reason"].as_str().unwrap();
                assert!(reason.contains("url: invalid url"), "{reason}");
                assert!(reason.contains("linkId: must not be empty"), "{reason}");
            }
            other => panic!("expected rejected completion, got {other:?}"),
        }

        let result = handler.execute(JobContext::new(crawl_job(None))).await;
        assert!(matches!(result, JobResult::Success(Some(ref s)) if s["rejected"] == true));
        assert_eq!(store.upsert_calls(), 0);
        assert!(store.details("bm_1").await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_failure_requests_retry() {
        let store = Arc::new(MemoryLinkStore::new().with_bookmark("bm_1"));
        let handler = handler(StaticFetcher::failing(), store.clone());

        let result = handler
            .execute(JobContext::new(crawl_job(Some(json!({
                "url": "https://example.com/a",
                "linkId": "bm_1"
            })))))
            .await;

        match result {
            JobResult::Retry(msg) => assert!(msg.contains("HTTP 500"), "{msg}"),
            other => panic!("expected retry, got {other:?}"),
        }
        assert_eq!(store.upsert_calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_link_requests_retry() {
        let handler = handler(
            StaticFetcher::serving("<title>x</title>"),
            Arc::new(MemoryLinkStore::new()),
        );

        let result = handler
            .execute(JobContext::new(crawl_job(Some(json!({
                "url": "https://example.com/a",
                "linkId": "bm_gone"
            })))))
            .await;

        match result {
            JobResult::Retry(msg) => assert!(msg.contains("bm_gone"), "{msg}"),
            other => panic!("expected retry, got {other:?}"),
        }
    }
}
