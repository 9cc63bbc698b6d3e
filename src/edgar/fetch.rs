use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Semaphore, SemaphorePermit};
use url::Url;

use crate::core::config::IngestConfig;
use crate::edgar::parsing::text::decode_submission;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response status: {status} at {url}")]
    Status { status: u16, url: String },

    #[error("Empty submission body at {0}")]
    Empty(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Cache error: {0}")]
    Cache(#[from] std::io::Error),

    #[error("Decoding error: {0}")]
    Decode(String),
}

impl FetchError {
    /// Transport failures, 5xx and 429 are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            FetchError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
            }
            _ => false,
        }
    }
}

/// Source of raw submission text.
#[async_trait]
pub trait FilingFetcher: Send + Sync {
    async fn fetch(&self, cik: &str, accession_number: &str) -> Result<String, FetchError>;
}

pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
}

impl RateLimiter {
    pub fn new(max_concurrent: usize) -> Self {
        RateLimiter {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    pub async fn acquire(&self) -> Option<SemaphorePermit<'_>> {
        self.semaphore.acquire().await.ok()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(10) // SEC allows 10 requests per second
    }
}

/// Fetches complete submission text files from the EDGAR archives, caching
/// the decoded text on disk.
pub struct EdgarFetcher {
    client: Client,
    config: IngestConfig,
    limiter: RateLimiter,
}

impl EdgarFetcher {
    pub fn new(config: IngestConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.fetch_timeout)
            .build()?;
        let limiter = RateLimiter::new(config.max_concurrent);
        Ok(Self {
            client,
            config,
            limiter,
        })
    }

    pub fn submission_url(&self, cik: &str, accession_number: &str) -> Result<Url, FetchError> {
        let compact = accession_number.replace('-', "");
        let cik = cik.trim_start_matches('0');
        let url = format!(
            "{}/{}/{}/{}.txt",
            self.config.archives_url, cik, compact, accession_number
        );
        Ok(Url::parse(&url)?)
    }

    pub fn cache_path(&self, cik: &str, accession_number: &str) -> PathBuf {
        self.config
            .filings_dir()
            .join(cik.trim_start_matches('0'))
            .join(format!("{}.txt", accession_number))
    }

    async fn fetch_once(&self, url: &Url) -> Result<String, FetchError> {
        let _permit = self.limiter.acquire().await;
        log::debug!("Fetching URL: {}", url);

        let response = self
            .client
            .get(url.as_str())
            .header(reqwest::header::ACCEPT_ENCODING, "gzip, deflate")
            .send()
            .await?;

        log::debug!("Response status: {}", response.status());
        if !response.status().is_success() {
            return Err(FetchError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(FetchError::Empty(url.to_string()));
        }
        log::debug!("Received content length: {}", bytes.len());

        decode_submission(&bytes).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

#[async_trait]
impl FilingFetcher for EdgarFetcher {
    async fn fetch(&self, cik: &str, accession_number: &str) -> Result<String, FetchError> {
        let cache_path = self.cache_path(cik, accession_number);
        if cache_path.exists() {
            log::debug!("Using cached submission {:?}", cache_path);
            return Ok(tokio::fs::read_to_string(&cache_path).await?);
        }

        let url = self.submission_url(cik, accession_number)?;
        let mut attempt = 0;
        let text = loop {
            match self.fetch_once(&url).await {
                Ok(text) => break text,
                Err(e) if e.is_transient() && attempt < self.config.fetch_retries => {
                    attempt += 1;
                    log::warn!("Transient failure fetching {} (attempt {}): {}", url, attempt, e);
                }
                Err(e) => {
                    log::error!("Failed to fetch {}: {}", url, e);
                    return Err(e);
                }
            }
        };

        if let Some(parent) = cache_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&cache_path, &text).await?;
        log::debug!("Saved content to {:?}", cache_path);

        Ok(text)
    }
}
