//! Retrieval of raw calendar bytes from URLs and local files.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::SourceCache;
use crate::error::{CalMergeError, CalMergeResult};

/// Default timeout for remote requests.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// A configured calendar source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarSource {
    /// `http(s)://` or `webcal://` feed, stored as configured
    Remote(String),
    /// Path to an .ics file on disk
    Local(PathBuf),
}

impl CalendarSource {
    /// Classify a configured identifier by its scheme.
    pub fn parse(identifier: &str) -> Self {
        let lower = identifier.trim().to_ascii_lowercase();
        if lower.starts_with("http://")
            || lower.starts_with("https://")
            || lower.starts_with("webcal://")
        {
            CalendarSource::Remote(identifier.trim().to_string())
        } else {
            CalendarSource::Local(PathBuf::from(identifier))
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, CalendarSource::Remote(_))
    }

    /// Identifier used for cache keys and log messages.
    pub fn id(&self) -> String {
        match self {
            CalendarSource::Remote(url) => url.clone(),
            CalendarSource::Local(path) => path.display().to_string(),
        }
    }

    /// URL to request; `webcal://` subscriptions are fetched over https.
    fn request_url(url: &str) -> String {
        match url.get(..9) {
            Some(scheme) if scheme.eq_ignore_ascii_case("webcal://") => {
                format!("https://{}", &url[9..])
            }
            _ => url.to_string(),
        }
    }
}

impl fmt::Display for CalendarSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

/// Raw calendar payload and the source it came from.
#[derive(Debug, Clone)]
pub struct RawCalendar {
    pub source: String,
    pub bytes: Arc<[u8]>,
}

/// Fetches calendar bytes, caching remote responses.
pub struct SourceFetcher {
    http: reqwest::Client,
    cache: Arc<SourceCache>,
    timeout: Duration,
}

impl SourceFetcher {
    pub fn new(cache: Arc<SourceCache>, timeout: Duration) -> CalMergeResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("calmerge/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| CalMergeError::Config(format!("Could not build HTTP client: {e}")))?;

        Ok(SourceFetcher {
            http,
            cache,
            timeout,
        })
    }

    pub fn cache(&self) -> &SourceCache {
        &self.cache
    }

    /// Fetch the raw bytes for `source`.
    ///
    /// Remote sources are served from the cache when possible and stored in
    /// it after a successful request. Local files are always read from disk.
    pub async fn fetch(&self, source: &CalendarSource) -> CalMergeResult<RawCalendar> {
        match source {
            CalendarSource::Remote(url) => self.fetch_remote(url).await,
            CalendarSource::Local(path) => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|error| CalMergeError::LocalRead {
                        path: path.clone(),
                        error,
                    })?;
                Ok(RawCalendar {
                    source: source.id(),
                    bytes: Arc::from(bytes),
                })
            }
        }
    }

    async fn fetch_remote(&self, url: &str) -> CalMergeResult<RawCalendar> {
        if let Some(bytes) = self.cache.get(url) {
            tracing::debug!(source = %url, "calendar cache hit");
            return Ok(RawCalendar {
                source: url.to_string(),
                bytes,
            });
        }

        tracing::debug!(source = %url, "calendar cache miss, fetching");
        let fetch_error = |reason: String| CalMergeError::Fetch {
            calendar: url.to_string(),
            reason,
        };

        let response = self
            .http
            .get(CalendarSource::request_url(url))
            .send()
            .await
            .map_err(|e| fetch_error(self.describe(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("HTTP {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| fetch_error(self.describe(&e)))?;
        let bytes: Arc<[u8]> = Arc::from(body.as_ref());
        self.cache.put(url, Arc::clone(&bytes));

        Ok(RawCalendar {
            source: url.to_string(),
            bytes,
        })
    }

    fn describe(&self, error: &reqwest::Error) -> String {
        if error.is_timeout() {
            format!("request timed out after {}s", self.timeout.as_secs_f64())
        } else {
            error.to_string()
        }
    }
}
