//! Rate-limited HTTP access to the finance-records API and atomic JSON state files.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub const CRATE_NAME: &str = "pacscope-storage";

/// Minimum spacing between requests; keeps a run under ~1000 requests per hour.
pub const DEFAULT_MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(3600);

/// Consecutive 429 responses, across calls, after which the client gives up.
pub const DEFAULT_THROTTLE_HARD_LIMIT: u32 = 8;

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub async fn load<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<Option<T>> {
        let path = self.path_for(name);
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("reading {}", path.display()));
            }
        };
        let value = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(value))
    }

    /// Write pretty JSON through a temp file and rename, so readers never see
    /// a truncated document.
    pub async fn save<T: Serialize>(&self, name: &str, value: &T) -> anyhow::Result<PathBuf> {
        let path = self.path_for(name);
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("creating state directory {}", parent.display()))?;

        let bytes = serde_json::to_vec_pretty(value)
            .with_context(|| format!("serializing {}", path.display()))?;

        let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp state file {}", temp_path.display()))?;
        file.write_all(&bytes)
            .await
            .with_context(|| format!("writing temp state file {}", temp_path.display()))?;
        file.sync_all()
            .await
            .with_context(|| format!("syncing temp state file {}", temp_path.display()))?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err).with_context(|| {
                format!(
                    "atomically renaming temp state file {} -> {}",
                    temp_path.display(),
                    path.display()
                )
            });
        }
        Ok(path)
    }

    pub async fn remove(&self, name: &str) -> anyhow::Result<bool> {
        let path = self.path_for(name);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| format!("removing {}", path.display())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Success,
    Throttled,
    Fatal,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_success() {
        RetryDisposition::Success
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Throttled
    } else {
        RetryDisposition::Fatal
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(120),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    pub retryable: bool,
}

/// Raw GET seam under the rate limiter.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &Url) -> Result<TransportResponse, TransportError>;
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &Url) -> Result<TransportResponse, TransportError> {
        let to_transport = |err: reqwest::Error| TransportError {
            retryable: classify_reqwest_error(&err),
            message: err.without_url().to_string(),
        };
        let resp = self.client.get(url.clone()).send().await.map_err(to_transport)?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(to_transport)?.to_vec();
        Ok(TransportResponse { status, body })
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("rate limit exhausted after {consecutive} consecutive 429 responses")]
    RateLimitExhausted { consecutive: u32 },
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: TransportError,
    },
    #[error("decoding response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("still throttled after {attempts} attempts for {url}")]
    RetriesExhausted { url: String, attempts: usize },
}

impl FetchError {
    /// Fatal-but-resumable: stop the run and keep progress.
    pub fn is_rate_limit_exhausted(&self) -> bool {
        matches!(self, FetchError::RateLimitExhausted { .. })
    }
}

/// Copy of `url` safe to log: the `api_key` query value is masked.
pub fn redact_url(url: &Url) -> String {
    if !url.query_pairs().any(|(key, _)| key == "api_key") {
        return url.to_string();
    }
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| {
            let value = if key == "api_key" {
                "REDACTED".to_string()
            } else {
                value.into_owned()
            };
            (key.into_owned(), value)
        })
        .collect();
    let mut redacted = url.clone();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub min_interval: Duration,
    pub backoff: BackoffPolicy,
    pub hard_limit: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval: DEFAULT_MIN_REQUEST_INTERVAL,
            backoff: BackoffPolicy::default(),
            hard_limit: DEFAULT_THROTTLE_HARD_LIMIT,
        }
    }
}

#[derive(Debug, Default)]
struct PacingState {
    last_request: Option<Instant>,
    consecutive_429s: u32,
}

/// Every outbound API call goes through one of these. Calls are serialized,
/// spaced by `min_interval`, and 429s back off exponentially. The
/// consecutive-429 counter spans calls and resets on any success.
pub struct RateLimitedClient {
    transport: Arc<dyn HttpTransport>,
    config: RateLimitConfig,
    run_id: Uuid,
    state: Mutex<PacingState>,
}

impl RateLimitedClient {
    pub fn new(transport: Arc<dyn HttpTransport>, config: RateLimitConfig, run_id: Uuid) -> Self {
        Self {
            transport,
            config,
            run_id,
            state: Mutex::new(PacingState::default()),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub async fn consecutive_throttles(&self) -> u32 {
        self.state.lock().await.consecutive_429s
    }

    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, FetchError> {
        let display_url = redact_url(url);
        let body = self
            .fetch_bytes(url, &display_url)
            .instrument(info_span!("http_fetch", run_id = %self.run_id, path = url.path()))
            .await?;
        serde_json::from_slice(&body).map_err(|source| FetchError::Decode {
            url: display_url,
            source,
        })
    }

    async fn fetch_bytes(&self, url: &Url, display_url: &str) -> Result<Vec<u8>, FetchError> {
        let mut state = self.state.lock().await;
        if state.consecutive_429s >= self.config.hard_limit {
            return Err(FetchError::RateLimitExhausted {
                consecutive: state.consecutive_429s,
            });
        }

        let backoff = self.config.backoff;
        for attempt in 0..=backoff.max_retries {
            if let Some(last) = state.last_request {
                let ready_at = last + self.config.min_interval;
                if Instant::now() < ready_at {
                    tokio::time::sleep_until(ready_at).await;
                }
            }
            state.last_request = Some(Instant::now());
            debug!(url = display_url, attempt, "requesting");

            let resp = match self.transport.get(url).await {
                Ok(resp) => resp,
                Err(err) if err.retryable && attempt < backoff.max_retries => {
                    warn!(url = display_url, error = %err, "transient request failure; retrying");
                    tokio::time::sleep(backoff.delay_for_attempt(attempt)).await;
                    continue;
                }
                Err(source) => {
                    return Err(FetchError::Request {
                        url: display_url.to_string(),
                        source,
                    });
                }
            };

            let status = StatusCode::from_u16(resp.status)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            match classify_status(status) {
                RetryDisposition::Success => {
                    state.consecutive_429s = 0;
                    return Ok(resp.body);
                }
                RetryDisposition::Throttled => {
                    state.consecutive_429s += 1;
                    if state.consecutive_429s >= self.config.hard_limit {
                        warn!(
                            consecutive = state.consecutive_429s,
                            "rate limit exhausted; giving up"
                        );
                        return Err(FetchError::RateLimitExhausted {
                            consecutive: state.consecutive_429s,
                        });
                    }
                    if attempt < backoff.max_retries {
                        let delay = backoff.delay_for_attempt(attempt);
                        warn!(
                            url = display_url,
                            delay_secs = delay.as_secs(),
                            attempt = attempt + 1,
                            max_retries = backoff.max_retries,
                            "throttled (429); backing off"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
                RetryDisposition::Fatal => {
                    return Err(FetchError::HttpStatus {
                        status: resp.status,
                        url: display_url.to_string(),
                    });
                }
            }
        }

        Err(FetchError::RetriesExhausted {
            url: display_url.to_string(),
            attempts: backoff.max_retries + 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use serde::Deserialize;
    use serde_json::json;
    use tempfile::tempdir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Progress {
        completed: Vec<String>,
    }

    fn url() -> Url {
        Url::parse("https://api.example.test/v1/candidates/?api_key=secret&state=NC")
            .expect("url")
    }

    fn client(transport: Arc<ScriptedTransport>) -> RateLimitedClient {
        RateLimitedClient::new(transport, RateLimitConfig::default(), Uuid::new_v4())
    }

    #[tokio::test]
    async fn json_files_round_trip_and_overwrite_atomically() {
        let dir = tempdir().expect("tempdir");
        let store = JsonFileStore::new(dir.path().join("state"));

        assert_eq!(store.load::<Progress>("progress.json").await.expect("load"), None);

        let first = Progress { completed: vec!["CA".into()] };
        let path = store.save("progress.json", &first).await.expect("save");
        let second = Progress { completed: vec!["CA".into(), "NY".into()] };
        store.save("progress.json", &second).await.expect("overwrite");

        assert_eq!(
            store.load::<Progress>("progress.json").await.expect("load"),
            Some(second)
        );
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().expect("parent"))
            .expect("read_dir")
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
        assert!(store.remove("progress.json").await.expect("remove"));
        assert!(!store.remove("progress.json").await.expect("remove again"));
    }

    #[tokio::test]
    async fn nested_names_create_parent_directories() {
        let dir = tempdir().expect("tempdir");
        let store = JsonFileStore::new(dir.path());
        let path = store
            .save("run-1/run_summary.json", &json!({"processed": 3}))
            .await
            .expect("save");
        assert!(path.exists());
    }

    #[test]
    fn backoff_logic_is_exponential_and_capped() {
        let policy = BackoffPolicy::default();

        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(20));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(80));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(120));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_secs(120));
    }

    #[test]
    fn api_key_never_appears_in_logged_urls() {
        let shown = redact_url(&url());
        assert!(!shown.contains("secret"));
        assert!(shown.contains("api_key=REDACTED"));
        assert!(shown.contains("state=NC"));
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_call_retries_then_succeeds_and_resets_counter() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_status(429);
        transport.push_status(429);
        transport.push_json(200, json!({"results": []}));
        let client = client(transport.clone());

        let started = Instant::now();
        let value: serde_json::Value = client.fetch_json(&url()).await.expect("fetch");
        assert_eq!(value, json!({"results": []}));
        assert_eq!(client.consecutive_throttles().await, 0);
        assert_eq!(transport.requests().len(), 3);
        // 10s + 20s of backoff.
        assert!(started.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn requests_are_spaced_by_the_minimum_interval() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(200, json!({}));
        transport.push_json(200, json!({}));
        let client = client(transport);

        let started = Instant::now();
        let _: serde_json::Value = client.fetch_json(&url()).await.expect("first");
        let _: serde_json::Value = client.fetch_json(&url()).await.expect("second");
        assert!(started.elapsed() >= DEFAULT_MIN_REQUEST_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_throttles_across_calls_hit_the_hard_limit() {
        let transport = Arc::new(ScriptedTransport::new());
        for _ in 0..8 {
            transport.push_status(429);
        }
        let client = client(transport.clone());

        // Five retries after the first attempt: six 429s, then the call gives up.
        let first = client.fetch_json::<serde_json::Value>(&url()).await;
        assert!(matches!(first, Err(FetchError::RetriesExhausted { attempts: 6, .. })));
        assert_eq!(client.consecutive_throttles().await, 6);

        let second = client.fetch_json::<serde_json::Value>(&url()).await;
        let err = second.expect_err("hard limit");
        assert!(err.is_rate_limit_exhausted());

        // Once exhausted, no further requests go out.
        let third = client.fetch_json::<serde_json::Value>(&url()).await;
        assert!(third.expect_err("still exhausted").is_rate_limit_exhausted());
        assert_eq!(transport.requests().len(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn non_throttle_errors_fail_immediately_with_status() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_status(404);
        let client = client(transport.clone());

        let err = client
            .fetch_json::<serde_json::Value>(&url())
            .await
            .expect_err("404");
        match err {
            FetchError::HttpStatus { status, url } => {
                assert_eq!(status, 404);
                assert!(!url.contains("secret"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(!FetchError::HttpStatus { status: 500, url: String::new() }.is_rate_limit_exhausted());
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_transport_errors_are_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_error(true);
        transport.push_json(200, json!({"ok": true}));
        let client = client(transport);

        let value: serde_json::Value = client.fetch_json(&url()).await.expect("fetch");
        assert_eq!(value["ok"], true);
    }
}
