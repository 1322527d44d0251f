use std::{num::NonZeroUsize, path::Path, sync::Arc, time::Duration};

use bytes::Bytes;
use reqwest::{
    header::{HeaderMap, CONTENT_LENGTH, RANGE},
    Url,
};
use tokio::{fs::OpenOptions, io::AsyncWriteExt, task::JoinSet};
use tokio_util::sync::CancellationToken;

use super::progress::{NoProgress, Progress};
use crate::{
    error::{VodError, VodResult},
    util::{http::HttpClient, range::ByteRange},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per range, including the first one.
    pub attempts: u32,
    /// Delay before the first retry, doubled for every following one.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn delay(&self, failed_attempts: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(failed_attempts.saturating_sub(1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(700),
        }
    }
}

/// Downloads one resource as `n` concurrent byte ranges and reassembles it in order.
#[derive(Clone)]
pub struct ChunkDownloader {
    client: HttpClient,
    headers: HeaderMap,
    concurrency: NonZeroUsize,
    retry: RetryPolicy,
    progress: Arc<dyn Progress>,
}

impl ChunkDownloader {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            headers: HeaderMap::new(),
            concurrency: NonZeroUsize::MIN,
            retry: RetryPolicy::default(),
            progress: Arc::new(NoProgress),
        }
    }

    pub fn concurrency(mut self, concurrency: NonZeroUsize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    /// Size announced by a `HEAD` request, `0` if unknown.
    pub async fn content_length(&self, cancel: &CancellationToken, url: &Url) -> VodResult<u64> {
        let request = self.client.head(url.clone()).headers(self.headers.clone()).send();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(VodError::Cancelled),
            response = request => response,
        };
        let response = match response {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                tracing::debug!("HEAD {url} returned {}", response.status());
                return Ok(0);
            }
            Err(e) => {
                tracing::debug!("HEAD {url} failed: {e}");
                return Ok(0);
            }
        };

        Ok(response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0))
    }

    /// Fetches every range of `url`. The parts are returned in range order.
    ///
    /// The first failing range cancels all others.
    pub async fn fetch(&self, cancel: &CancellationToken, url: &Url) -> VodResult<Vec<Bytes>> {
        if cancel.is_cancelled() {
            return Err(VodError::Cancelled);
        }

        let size = self.content_length(cancel, url).await?;
        let ranges = ByteRange::partition(size, self.concurrency.get());
        tracing::debug!("Fetching {url} ({size} bytes) in {} part(s).", ranges.len());

        let token = cancel.child_token();
        let mut parts: Vec<Option<Bytes>> = vec![None; ranges.len()];
        let mut tasks = JoinSet::new();
        for (index, range) in ranges.into_iter().enumerate() {
            let fetcher = RangeFetcher {
                client: self.client.clone(),
                headers: self.headers.clone(),
                url: url.clone(),
                retry: self.retry,
                cancel: token.clone(),
            };
            tasks.spawn(async move {
                let data = fetcher.fetch(range).await?;
                Ok::<_, VodError>((index, data))
            });
        }

        let mut completed = 0;
        while let Some(result) = tasks.join_next().await {
            match result.map_err(VodError::from).and_then(|r| r) {
                Ok((index, data)) => {
                    parts[index] = Some(data);
                    completed += 1;
                }
                Err(e) => {
                    token.cancel();
                    tasks.abort_all();
                    return Err(e);
                }
            }
        }

        if completed != parts.len() {
            return Err(VodError::Cancelled);
        }
        let parts: Vec<Bytes> = parts.into_iter().flatten().collect();
        // only resources that fully arrived count
        self.progress
            .advance(parts.iter().map(|part| part.len() as u64).sum());
        Ok(parts)
    }

    /// Downloads `url` and appends it to `dest`. Nothing is written unless every range succeeded.
    pub async fn download(
        &self,
        cancel: &CancellationToken,
        url: &Url,
        dest: &Path,
    ) -> VodResult<u64> {
        let parts = self.fetch(cancel, url).await?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dest)
            .await?;
        let mut written = 0;
        for part in parts {
            file.write_all(&part).await?;
            written += part.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }
}

struct RangeFetcher {
    client: HttpClient,
    headers: HeaderMap,
    url: Url,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl RangeFetcher {
    async fn fetch(&self, range: ByteRange) -> VodResult<Bytes> {
        let mut attempts = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(VodError::Cancelled);
            }

            attempts += 1;
            let result = tokio::select! {
                _ = self.cancel.cancelled() => return Err(VodError::Cancelled),
                result = self.request(range) => result,
            };

            let error = match result {
                Ok(data) => return Ok(data),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => e,
            };
            if attempts >= self.retry.attempts {
                tracing::error!("Fetching {range} of {} failed: {error}", self.url);
                return Err(VodError::RetriesExhausted {
                    url: self.url.to_string(),
                    range: range.to_http_range(),
                    attempts,
                    source: Box::new(error),
                });
            }

            let delay = self.retry.delay(attempts);
            tracing::warn!(
                "Fetching {range} of {} failed, retry in {delay:?}. {error}",
                self.url
            );
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(VodError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn request(&self, range: ByteRange) -> VodResult<Bytes> {
        let response = self
            .client
            .get(self.url.clone())
            .headers(self.headers.clone())
            .header(RANGE, range.to_http_range())
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(VodError::HttpError(response.status()));
        }

        let data = response.bytes().await?;
        if let Some(expected) = range.length {
            if data.len() as u64 != expected {
                return Err(VodError::IncompleteRange {
                    range: range.to_http_range(),
                    expected,
                    actual: data.len() as u64,
                });
            }
        }
        Ok(data)
    }
}
