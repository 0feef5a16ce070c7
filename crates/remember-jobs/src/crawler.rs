//! The link crawl pipeline: fetch a bookmark's page, extract its metadata and
//! store the result as the bookmark's link details.
//!
//! Each call performs one fetch, one extraction and one upsert. Nothing is
//! retried here; retry policy belongs to the job queue.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, error, info};

use remember_core::defaults::UNKNOWN_JOB_ID;
use remember_core::{LinkDetails, LinkDetailsRepository};

use crate::fetch::{FetchError, FetchedPage, PageFetcher};
use crate::metadata::{ExtractionError, MetadataExtractor};
use crate::request::{validate, CrawlLinkRequest, ValidationError};

/// Progress sink: percent complete and an optional message.
pub type ProgressFn<'a> = &'a (dyn Fn(i32, Option<&str>) + Send + Sync);

/// Errors from processing a valid crawl request.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// The bookmark does not exist in the store.
    #[error("bookmarked link not found: {0}")]
    LinkNotFound(String),

    #[error("failed to store link details: {0}")]
    Persist(#[source] remember_core::Error),
}

impl From<remember_core::Error> for CrawlError {
    fn from(e: remember_core::Error) -> Self {
        match e {
            remember_core::Error::LinkNotFound(link_id) => CrawlError::LinkNotFound(link_id),
            other => CrawlError::Persist(other),
        }
    }
}

/// Errors from running a crawl job end to end.
#[derive(Debug, Error)]
pub enum CrawlJobError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Crawl(#[from] CrawlError),
}

/// A job as delivered by the queue: an optional id and an untrusted payload.
#[derive(Debug, Clone, Default)]
pub struct CrawlJob {
    pub id: Option<String>,
    pub data: Option<JsonValue>,
}

impl CrawlJob {
    pub fn new(id: impl Into<String>, data: JsonValue) -> Self {
        Self {
            id: Some(id.into()),
            data: Some(data),
        }
    }

    /// Id used for log correlation.
    pub fn display_id(&self) -> &str {
        self.id.as_deref().unwrap_or(UNKNOWN_JOB_ID)
    }
}

/// Fetch, extract and persist link metadata.
#[derive(Clone)]
pub struct CrawlPipeline {
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn MetadataExtractor>,
    store: Arc<dyn LinkDetailsRepository>,
}

impl CrawlPipeline {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<dyn MetadataExtractor>,
        store: Arc<dyn LinkDetailsRepository>,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            store,
        }
    }

    /// Crawl one validated request and return the stored details.
    pub async fn process(&self, request: &CrawlLinkRequest) -> Result<LinkDetails, CrawlError> {
        self.process_with_progress(request, &|_, _| {}).await
    }

    /// [`process`](Self::process), reporting 40 after fetch, 70 after
    /// extraction and 100 once stored.
    pub async fn process_with_progress(
        &self,
        request: &CrawlLinkRequest,
        progress: ProgressFn<'_>,
    ) -> Result<LinkDetails, CrawlError> {
        let page = self.fetcher.fetch(request.url()).await?;
        progress(40, Some("Page fetched"));

        let FetchedPage {
            final_url: page_url,
            content_type,
            body,
        } = page;
        let extractor = self.extractor.clone();
        let metadata = tokio::task::spawn_blocking(move || extractor.extract(&page_url, &body))
            .await
            .map_err(|e| {
                if e.is_panic() {
                    ExtractionError::Crashed(panic_message(e.into_panic()))
                } else {
                    ExtractionError::Crashed("extraction task cancelled".to_string())
                }
            })??;
        progress(70, Some("Metadata extracted"));

        debug!(
            subsystem = "crawler",
            component = "pipeline",
            link_id = %request.link_id(),
            content_type = content_type.as_deref().unwrap_or("unknown"),
            has_title = metadata.title.is_some(),
            has_description = metadata.description.is_some(),
            has_image = metadata.image_url.is_some(),
            has_favicon = metadata.favicon.is_some(),
            "Metadata extracted"
        );

        let details = LinkDetails::from_metadata(request.link_id(), metadata);
        let stored = self.store.upsert_details(&details).await?;
        progress(100, Some("Link details stored"));

        Ok(stored)
    }

    /// Validate and crawl a queued job, logging the outcome.
    pub async fn run_job(&self, job: &CrawlJob) -> Result<LinkDetails, CrawlJobError> {
        self.run_job_with_progress(job, &|_, _| {}).await
    }

    /// [`run_job`](Self::run_job) with progress, reporting 10 once the payload
    /// validates.
    pub async fn run_job_with_progress(
        &self,
        job: &CrawlJob,
        progress: ProgressFn<'_>,
    ) -> Result<LinkDetails, CrawlJobError> {
        let job_id = job.display_id();
        let raw = job.data.as_ref().unwrap_or(&JsonValue::Null);

        let request = match validate(raw) {
            Ok(request) => request,
            Err(e) => {
                error!(
                    subsystem = "crawler",
                    job_id,
                    error = %e,
                    "Malformed crawl job payload"
                );
                return Err(e.into());
            }
        };
        progress(10, Some("Request validated"));

        let start = Instant::now();
        info!(
            subsystem = "crawler",
            job_id,
            url = %request.url(),
            link_id = %request.link_id(),
            "Crawling link"
        );

        match self.process_with_progress(&request, progress).await {
            Ok(details) => {
                info!(
                    subsystem = "crawler",
                    job_id,
                    url = %request.url(),
                    link_id = %request.link_id(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Link crawled"
                );
                Ok(details)
            }
            Err(e) => {
                error!(
                    subsystem = "crawler",
                    job_id,
                    url = %request.url(),
                    link_id = %request.link_id(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    error = %e,
                    "Link crawl failed"
                );
                Err(e.into())
            }
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "extractor panicked".to_string()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::StaticFetcher;
    use super::*;
    use crate::metadata::HtmlMetadataExtractor;
    use remember_core::ExtractedMetadata;
    use remember_db::test_fixtures::MemoryLinkStore;
    use serde_json::json;
    use url::Url;

    const PAGE: &str = r#"<html><head>
        <title>Example</title>
        <meta name="description" content="An example page">
        <meta property="og:image" content="/og.png">
    </head></html>"#;

    struct PanickingExtractor;

    impl MetadataExtractor for PanickingExtractor {
        fn extract(&self, _: &Url, _: &str) -> Result<ExtractedMetadata, ExtractionError> {
            panic!("parser blew up");
        }
    }

    fn pipeline(
        fetcher: Arc<StaticFetcher>,
        store: Arc<MemoryLinkStore>,
    ) -> CrawlPipeline {
        CrawlPipeline::new(fetcher, Arc::new(HtmlMetadataExtractor::new()), store)
    }

    fn job(payload: JsonValue) -> CrawlJob {
        CrawlJob::new("job-1", payload)
    }

    #[tokio::test]
    async fn test_crawl_stores_extracted_details() {
        let fetcher = Arc::new(StaticFetcher::serving(PAGE));
        let store = Arc::new(MemoryLinkStore::new().with_bookmark("bm_1"));

        let details = pipeline(fetcher.clone(), store.clone())
            .run_job(&job(json!({"url": "https://example.com/a", "linkId": "bm_1"})))
            .await
            .unwrap();

        assert_eq!(details.link_id, "bm_1");
        assert_eq!(details.title.as_deref(), Some("Example"));
        assert_eq!(details.description.as_deref(), Some("An example page"));
        assert_eq!(
            details.image_url.as_deref(),
            Some("https://example.com/og.png")
        );
        assert!(details.favicon.is_none());
        assert_eq!(store.details("bm_1").await, Some(details));
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_crawl_twice_is_idempotent() {
        let fetcher = Arc::new(StaticFetcher::serving(PAGE));
        let store = Arc::new(MemoryLinkStore::new().with_bookmark("bm_1"));
        let pipeline = pipeline(fetcher, store.clone());
        let job = job(json!({"url": "https://example.com/a", "linkId": "bm_1"}));

        let first = pipeline.run_job(&job).await.unwrap();
        let second = pipeline.run_job(&job).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.details_count().await, 1);
        assert_eq!(store.upsert_calls(), 2);
    }

    #[tokio::test]
    async fn test_recrawl_clears_fields_missing_from_page() {
        let fetcher = Arc::new(StaticFetcher::serving(PAGE));
        let store = Arc::new(MemoryLinkStore::new().with_bookmark("bm_1"));
        let pipeline = pipeline(fetcher.clone(), store.clone());
        let job = job(json!({"url": "https://example.com/a", "linkId": "bm_1"}));

        pipeline.run_job(&job).await.unwrap();
        fetcher.set_body("<title>Renamed</title>");
        pipeline.run_job(&job).await.unwrap();

        let stored = store.details("bm_1").await.unwrap();
        assert_eq!(stored.title.as_deref(), Some("Renamed"));
        assert!(stored.description.is_none());
        assert!(stored.image_url.is_none());
    }

    #[tokio::test]
    async fn test_unknown_link_is_not_found_and_stores_nothing() {
        let fetcher = Arc::new(StaticFetcher::serving(PAGE));
        let store = Arc::new(MemoryLinkStore::new());

        let err = pipeline(fetcher, store.clone())
            .run_job(&job(json!({"url": "https://example.com/a", "linkId": "bm_404"})))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CrawlJobError::Crawl(CrawlError::LinkNotFound(ref id)) if id == "bm_404"
        ));
        assert_eq!(store.details_count().await, 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_store() {
        let fetcher = Arc::new(StaticFetcher::failing());
        let store = Arc::new(MemoryLinkStore::new().with_bookmark("bm_1"));

        let err = pipeline(fetcher.clone(), store.clone())
            .run_job(&job(json!({"url": "https://example.com/a", "linkId": "bm_1"})))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CrawlJobError::Crawl(CrawlError::Fetch(FetchError::Status { status: 500, .. }))
        ));
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(store.upsert_calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_payload_touches_nothing() {
        let fetcher = Arc::new(StaticFetcher::serving(PAGE));
        let store = Arc::new(MemoryLinkStore::new().with_bookmark("bm_1"));
        let pipeline = pipeline(fetcher.clone(), store.clone());

        for payload in [
            json!({"linkId": "bm_1"}),
            json!({"url": "https://example.com/a"}),
            json!({"url": "not a url", "linkId": "bm_1"}),
            json!("https://example.com/a"),
        ] {
            let err = pipeline.run_job(&job(payload)).await.unwrap_err();
            assert!(matches!(err, CrawlJobError::Invalid(_)));
        }

        let err = pipeline.run_job(&CrawlJob::default()).await.unwrap_err();
        assert!(matches!(err, CrawlJobError::Invalid(_)));

        assert_eq!(fetcher.calls(), 0);
        assert_eq!(store.upsert_calls(), 0);
    }

    #[tokio::test]
    async fn test_extractor_panic_is_extraction_error() {
        let fetcher = Arc::new(StaticFetcher::serving(PAGE));
        let store = Arc::new(MemoryLinkStore::new().with_bookmark("bm_1"));
        let pipeline = CrawlPipeline::new(fetcher, Arc::new(PanickingExtractor), store.clone());

        let request = validate(&json!({"url": "https://example.com/a", "linkId": "bm_1"})).unwrap();
        let err = pipeline.process(&request).await.unwrap_err();

        match err {
            CrawlError::Extraction(ExtractionError::Crashed(msg)) => {
                assert!(msg.contains("parser blew up"))
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.upsert_calls(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_persist_error() {
        let fetcher = Arc::new(StaticFetcher::serving(PAGE));
        let store = Arc::new(MemoryLinkStore::new().with_bookmark("bm_1"));
        store.fail_upserts(true);

        let request = validate(&json!({"url": "https://example.com/a", "linkId": "bm_1"})).unwrap();
        let err = pipeline(fetcher, store.clone())
            .process(&request)
            .await
            .unwrap_err();

        assert!(matches!(err, CrawlError::Persist(_)));
        assert!(store.details("bm_1").await.is_none());
    }

    #[tokio::test]
    async fn test_progress_reported_in_order() {
        let fetcher = Arc::new(StaticFetcher::serving(PAGE));
        let store = Arc::new(MemoryLinkStore::new().with_bookmark("bm_1"));
        let seen = std::sync::Mutex::new(Vec::new());

        pipeline(fetcher, store)
            .run_job_with_progress(
                &job(json!({"url": "https://example.com/a", "linkId": "bm_1"})),
                &|pct, _| seen.lock().unwrap().push(pct),
            )
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![10, 40, 70, 100]);
    }

    #[test]
    fn test_crawl_job_display_id_defaults_to_unknown() {
        assert_eq!(CrawlJob::default().display_id(), "unknown");
        assert_eq!(CrawlJob::new("42", json!({})).display_id(), "42");
    }
}
