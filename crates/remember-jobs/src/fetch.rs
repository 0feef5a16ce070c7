//! Page fetching for the crawl pipeline.
//!
//! [`HttpFetcher`] issues exactly one GET per call. Redirects, total request
//! time and body size are all bounded by [`FetchConfig`]; a [`UrlPolicy`] is
//! consulted before any network traffic.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use thiserror::Error;
use tracing::debug;
use url::Url;

use remember_core::defaults;

/// Configuration for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Total time allowed for one request, body included.
    pub timeout: Duration,
    /// Maximum number of redirects followed.
    pub max_redirects: usize,
    /// Maximum body size read, in bytes.
    pub max_body_bytes: usize,
    /// User-Agent header value.
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(defaults::CRAWL_TIMEOUT_SECS),
            max_redirects: defaults::CRAWL_MAX_REDIRECTS,
            max_body_bytes: defaults::CRAWL_MAX_BODY_BYTES,
            user_agent: defaults::CRAWL_USER_AGENT.to_string(),
        }
    }
}

impl FetchConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `CRAWLER_TIMEOUT_SECS` | `30` | Request timeout |
    /// | `CRAWLER_MAX_REDIRECTS` | `10` | Redirect cap |
    /// | `CRAWLER_MAX_BODY_BYTES` | `5242880` | Body size cap |
    /// | `CRAWLER_USER_AGENT` | `remember-crawler/<version>` | User-Agent header |
    pub fn from_env() -> Self {
        let timeout_secs = std::env::var("CRAWLER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::CRAWL_TIMEOUT_SECS)
            .max(1);

        let max_redirects = std::env::var("CRAWLER_MAX_REDIRECTS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::CRAWL_MAX_REDIRECTS);

        let max_body_bytes = std::env::var("CRAWLER_MAX_BODY_BYTES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::CRAWL_MAX_BODY_BYTES)
            .max(1);

        let user_agent = std::env::var("CRAWLER_USER_AGENT")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| defaults::CRAWL_USER_AGENT.to_string());

        Self {
            timeout: Duration::from_secs(timeout_secs),
            max_redirects,
            max_body_bytes,
            user_agent,
        }
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the redirect cap.
    pub fn with_max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    /// Set the body size cap.
    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }

    /// Set the User-Agent header.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// A successfully fetched page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after redirects. Relative references resolve against this.
    pub final_url: Url,
    /// `Content-Type` header as sent, logged alongside the extraction.
    pub content_type: Option<String>,
    pub body: String,
}

/// Errors from fetching a page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetch of {url} blocked by policy: {reason}")]
    Blocked { url: String, reason: String },

    #[error("fetch of {url} timed out")]
    Timeout { url: String },

    #[error("fetch of {url} exceeded the redirect limit")]
    TooManyRedirects { url: String },

    #[error("fetch of {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("fetch of {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("failed to read response body: {0}")]
    Body(#[source] reqwest::Error),
}

impl FetchError {
    fn from_reqwest(url: &Url, e: reqwest::Error) -> Self {
        let url = url.to_string();
        if e.is_timeout() {
            FetchError::Timeout { url }
        } else if e.is_redirect() {
            FetchError::TooManyRedirects { url }
        } else {
            FetchError::Network { url, source: e }
        }
    }
}

/// Decides whether a URL may be fetched at all.
///
/// This is where loopback or private-network targets would be refused.
pub trait UrlPolicy: Send + Sync {
    /// Return `Err(reason)` to refuse the fetch.
    fn check(&self, url: &Url) -> Result<(), String>;
}

/// Policy that accepts every URL.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAllUrls;

impl UrlPolicy for AllowAllUrls {
    fn check(&self, _url: &Url) -> Result<(), String> {
        Ok(())
    }
}

/// Fetches a page for metadata extraction.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError>;
}

/// reqwest-backed [`PageFetcher`].
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    policy: Arc<dyn UrlPolicy>,
    max_body_bytes: usize,
}

impl HttpFetcher {
    /// Build a fetcher with its own client configured from `config`.
    pub fn new(config: FetchConfig) -> remember_core::Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .redirect(Policy::limited(config.max_redirects))
            .timeout(config.timeout)
            .build()
            .map_err(|e| remember_core::Error::Config(format!("HTTP client: {e}")))?;

        Ok(Self::with_client(client, config.max_body_bytes))
    }

    /// Wrap an existing client. Timeout and redirect behavior come from the client.
    pub fn with_client(client: Client, max_body_bytes: usize) -> Self {
        Self {
            client,
            policy: Arc::new(AllowAllUrls),
            max_body_bytes,
        }
    }

    /// Replace the URL policy.
    pub fn with_policy(mut self, policy: Arc<dyn UrlPolicy>) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        self.policy
            .check(url)
            .map_err(|reason| FetchError::Blocked {
                url: url.to_string(),
                reason,
            })?;

        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        let final_url = response.url().clone();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: final_url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let limit = self.max_body_bytes;
        if response
            .content_length()
            .is_some_and(|len| len > limit as u64)
        {
            return Err(FetchError::BodyTooLarge { limit });
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: final_url.to_string(),
                }
            } else {
                FetchError::Body(e)
            }
        })? {
            if body.len() + chunk.len() > limit {
                return Err(FetchError::BodyTooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }

        debug!(
            subsystem = "crawler",
            component = "fetch",
            url = %final_url,
            status = status.as_u16(),
            bytes = body.len(),
            "Page fetched"
        );

        Ok(FetchedPage {
            final_url,
            content_type,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct DenyHost(&'static str);

    impl UrlPolicy for DenyHost {
        fn check(&self, url: &Url) -> Result<(), String> {
            if url.host_str() == Some(self.0) {
                Err(format!("host {} is not allowed", self.0))
            } else {
                Ok(())
            }
        }
    }

    fn fetcher(config: FetchConfig) -> HttpFetcher {
        HttpFetcher::new(config).expect("client builds")
    }

    fn page_url(server: &MockServer, p: &str) -> Url {
        Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
    }

    #[test]
    fn test_fetch_config_defaults() {
        let config = FetchConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_redirects, 10);
        assert_eq!(config.max_body_bytes, 5 * 1024 * 1024);
        assert!(config.user_agent.starts_with("remember-crawler/"));
    }

    #[test]
    fn test_fetch_config_builders() {
        let config = FetchConfig::default()
            .with_timeout(Duration::from_secs(5))
            .with_max_redirects(2)
            .with_max_body_bytes(1024)
            .with_user_agent("test-agent");

        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.max_redirects, 2);
        assert_eq!(config.max_body_bytes, 1024);
        assert_eq!(config.user_agent, "test-agent");
    }

    #[tokio::test]
    async fn test_fetch_returns_body_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a"))
            .and(header("user-agent", "test-agent"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(
                    "<html><title>Hi</title></html>",
                    "text/html; charset=utf-8",
                ),
            )
            .expect(1)
            .mount(&server)
            .await;

        let page = fetcher(FetchConfig::default().with_user_agent("test-agent"))
            .fetch(&page_url(&server, "/a"))
            .await
            .unwrap();

        assert_eq!(page.final_url, page_url(&server, "/a"));
        assert_eq!(
            page.content_type.as_deref(),
            Some("text/html; charset=utf-8")
        );
        assert!(page.body.contains("<title>Hi</title>"));
    }

    #[tokio::test]
    async fn test_fetch_non_success_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = fetcher(FetchConfig::default())
            .fetch(&page_url(&server, "/broken"))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_fetch_follows_redirect_and_reports_final_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(301).insert_header("location", "/new"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_string("moved"))
            .mount(&server)
            .await;

        let page = fetcher(FetchConfig::default())
            .fetch(&page_url(&server, "/old"))
            .await
            .unwrap();

        assert_eq!(page.final_url.path(), "/new");
        assert_eq!(page.body, "moved");
    }

    #[tokio::test]
    async fn test_fetch_redirect_loop_hits_cap() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", "/loop"),
            )
            .mount(&server)
            .await;

        let err = fetcher(FetchConfig::default().with_max_redirects(2))
            .fetch(&page_url(&server, "/loop"))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::TooManyRedirects { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_fetch_oversized_body_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(4096)))
            .mount(&server)
            .await;

        let err = fetcher(FetchConfig::default().with_max_body_bytes(1024))
            .fetch(&page_url(&server, "/big"))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::BodyTooLarge { limit: 1024 }));
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("slow")
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let err = fetcher(FetchConfig::default().with_timeout(Duration::from_millis(200)))
            .fetch(&page_url(&server, "/slow"))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Timeout { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_fetch_blocked_by_policy_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let fetcher = fetcher(FetchConfig::default()).with_policy(Arc::new(DenyHost("127.0.0.1")));
        let err = fetcher
            .fetch(&page_url(&server, "/a"))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Blocked { .. }));
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_network_error() {
        // Bind then drop a listener so the port is closed.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let url = Url::parse(&format!("http://127.0.0.1:{port}/gone")).unwrap();

        let err = fetcher(FetchConfig::default()).fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Network { .. }), "{err}");
    }
}
