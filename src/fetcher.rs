use std::future::Future;
use std::io::Read;
use std::time::Duration;

use flate2::read::GzDecoder;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use tracing::{debug, warn};

use crate::config::{Config, BROWSER_USER_AGENT, FETCH_BACKOFF_MS};
use crate::error::{FetchError, Result};

/// What to fetch and how to turn the response into payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    Http {
        url: String,
        headers: Vec<(String, String)>,
        /// Overrides the policy deadline for this request.
        timeout: Option<Duration>,
    },
    Archive { url: String, gzip: bool },
}

impl SourceDescriptor {
    pub fn http(url: impl Into<String>) -> Self {
        SourceDescriptor::Http {
            url: url.into(),
            headers: Vec::new(),
            timeout: None,
        }
    }

    pub fn gzip_archive(url: impl Into<String>) -> Self {
        SourceDescriptor::Archive {
            url: url.into(),
            gzip: true,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            SourceDescriptor::Http { url, .. } | SourceDescriptor::Archive { url, .. } => url,
        }
    }
}

/// The only suspension point of a job besides the store.
pub trait Fetch: Send + Sync {
    fn fetch(&self, source: &SourceDescriptor) -> impl Future<Output = std::result::Result<Vec<u8>, FetchError>> + Send;
}

#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Attempts per fetch, including the first.
    pub attempts: u32,
    /// Sleep before retry N; the last entry repeats.
    pub backoff_ms: Vec<u64>,
    pub timeout: Duration,
}

impl FetchPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            attempts: cfg.fetch_attempts,
            backoff_ms: FETCH_BACKOFF_MS.to_vec(),
            timeout: cfg.http_timeout,
        }
    }

    fn backoff(&self, retry: u32) -> Duration {
        let idx = (retry as usize).min(self.backoff_ms.len().saturating_sub(1));
        Duration::from_millis(self.backoff_ms.get(idx).copied().unwrap_or(0))
    }
}

/// reqwest-backed fetcher with browser-like headers and bounded backoff.
pub struct Fetcher {
    client: reqwest::Client,
    policy: FetchPolicy,
}

impl Fetcher {
    pub fn new(policy: FetchPolicy) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9,ru;q=0.8"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(policy.timeout)
            .build()?;
        Ok(Self { client, policy })
    }

    async fn get_once(
        &self,
        url: &str,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> std::result::Result<Vec<u8>, FetchError> {
        let mut req = self.client.get(url).timeout(timeout);
        for (name, value) in headers {
            req = req.header(name.as_str(), value.as_str());
        }

        let resp = req.send().await.map_err(|e| transport_error(url, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = resp.bytes().await.map_err(|e| transport_error(url, e))?;
        Ok(body.to_vec())
    }

    async fn get_with_retry(
        &self,
        url: &str,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> std::result::Result<Vec<u8>, FetchError> {
        let attempts = self.policy.attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.get_once(url, headers, timeout).await {
                Ok(body) => {
                    debug!("[FETCH] {url}: {} bytes (attempt {attempt})", body.len());
                    return Ok(body);
                }
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = self.policy.backoff(attempt - 1);
                    warn!("[FETCH] attempt {attempt}/{attempts} failed: {e}; retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Fetch for Fetcher {
    async fn fetch(&self, source: &SourceDescriptor) -> std::result::Result<Vec<u8>, FetchError> {
        match source {
            SourceDescriptor::Http { url, headers, timeout } => {
                let timeout = timeout.unwrap_or(self.policy.timeout);
                self.get_with_retry(url, headers, timeout).await
            }
            SourceDescriptor::Archive { url, gzip } => {
                let body = self.get_with_retry(url, &[], self.policy.timeout).await?;
                if *gzip {
                    gunzip(url, &body)
                } else {
                    Ok(body)
                }
            }
        }
    }
}

fn transport_error(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout { url: url.to_string() }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

pub fn gunzip(url: &str, body: &[u8]) -> std::result::Result<Vec<u8>, FetchError> {
    let mut out = Vec::new();
    GzDecoder::new(body)
        .read_to_end(&mut out)
        .map_err(|e| FetchError::Decompress {
            url: url.to_string(),
            message: e.to_string(),
        })?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::extract::State;
    use axum::http::{HeaderMap as AxumHeaders, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn quick_policy(attempts: u32) -> FetchPolicy {
        FetchPolicy {
            attempts,
            backoff_ms: vec![1, 2, 4],
            timeout: Duration::from_millis(300),
        }
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn gz(bytes: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(bytes).unwrap();
        enc.finish().unwrap()
    }

    async fn flaky(State(hits): State<Arc<AtomicUsize>>) -> (StatusCode, &'static str) {
        if hits.fetch_add(1, Ordering::SeqCst) < 2 {
            (StatusCode::SERVICE_UNAVAILABLE, "busy")
        } else {
            (StatusCode::OK, "finally")
        }
    }

    fn test_app(hits: Arc<AtomicUsize>) -> Router {
        Router::new()
            .route("/flaky", get(flaky))
            .route("/missing", get(|| async { (StatusCode::NOT_FOUND, "nope") }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    "late"
                }),
            )
            .route(
                "/ua",
                get(|headers: AxumHeaders| async move {
                    headers
                        .get("user-agent")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string()
                }),
            )
            .route("/archive", get(|| async { gz(b"RDX3\nX\npayload") }))
            .with_state(hits)
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = serve(test_app(hits.clone())).await;
        let fetcher = Fetcher::new(quick_policy(3)).unwrap();

        let body = fetcher.fetch(&SourceDescriptor::http(format!("{base}/flaky"))).await.unwrap();
        assert_eq!(body, b"finally");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_the_attempt_budget() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = serve(test_app(hits.clone())).await;
        let fetcher = Fetcher::new(quick_policy(2)).unwrap();

        let err = fetcher.fetch(&SourceDescriptor::http(format!("{base}/flaky"))).await.unwrap_err();
        assert!(matches!(err, FetchError::Http { status: 503, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let base = serve(test_app(Arc::new(AtomicUsize::new(0)))).await;
        let fetcher = Fetcher::new(quick_policy(3)).unwrap();

        let err = fetcher.fetch(&SourceDescriptor::http(format!("{base}/missing"))).await.unwrap_err();
        assert!(matches!(err, FetchError::Http { status: 404, .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn slow_responses_time_out() {
        let base = serve(test_app(Arc::new(AtomicUsize::new(0)))).await;
        let fetcher = Fetcher::new(quick_policy(1)).unwrap();

        let err = fetcher.fetch(&SourceDescriptor::http(format!("{base}/slow"))).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }));
    }

    #[tokio::test]
    async fn sends_a_browser_user_agent() {
        let base = serve(test_app(Arc::new(AtomicUsize::new(0)))).await;
        let fetcher = Fetcher::new(quick_policy(1)).unwrap();

        let body = fetcher.fetch(&SourceDescriptor::http(format!("{base}/ua"))).await.unwrap();
        assert!(String::from_utf8(body).unwrap().starts_with("Mozilla/5.0"));
    }

    #[tokio::test]
    async fn archives_are_decompressed() {
        let base = serve(test_app(Arc::new(AtomicUsize::new(0)))).await;
        let fetcher = Fetcher::new(quick_policy(1)).unwrap();

        let body = fetcher
            .fetch(&SourceDescriptor::gzip_archive(format!("{base}/archive")))
            .await
            .unwrap();
        assert_eq!(body, b"RDX3\nX\npayload");

        let err = fetcher
            .fetch(&SourceDescriptor::gzip_archive(format!("{base}/ua")))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Decompress { .. }));
    }
}
