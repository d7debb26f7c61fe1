//! Crawler administration: one-shot triggers and a status poller bound to
//! the lifetime of whatever view shows it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use url::Url;

use crate::api::ApiClient;
use crate::error::{ApiError, Result};
use crate::models::{CrawlNowResponse, MessageResponse, SchedulerStatus};

/// Delay before the extra status refresh that follows a manual crawl.
pub const REFRESH_DELAY: Duration = Duration::from_secs(1);

#[async_trait]
pub trait CrawlerApi: Send + Sync {
    async fn status(&self) -> Result<SchedulerStatus>;
    async fn crawl_now(&self) -> Result<CrawlNowResponse>;
    async fn crawl_url(&self, url: &str) -> Result<MessageResponse>;
    async fn discover(&self) -> Result<MessageResponse>;
}

#[async_trait]
impl CrawlerApi for ApiClient {
    async fn status(&self) -> Result<SchedulerStatus> {
        self.crawler_status().await
    }

    async fn crawl_now(&self) -> Result<CrawlNowResponse> {
        ApiClient::crawl_now(self).await
    }

    async fn crawl_url(&self, url: &str) -> Result<MessageResponse> {
        ApiClient::crawl_url(self, url).await
    }

    async fn discover(&self) -> Result<MessageResponse> {
        ApiClient::discover(self).await
    }
}

/// Latest poll result. A failed poll keeps the previous status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusSnapshot {
    pub status: Option<SchedulerStatus>,
    pub error: Option<String>,
    pub polls: u64,
}

pub struct StatusPoller {
    handle: JoinHandle<()>,
    snapshot: watch::Receiver<StatusSnapshot>,
    refresh: mpsc::UnboundedSender<()>,
}

impl StatusPoller {
    /// Polls right away, then every `every` until stopped or dropped.
    pub fn start(api: Arc<dyn CrawlerApi>, every: Duration) -> Self {
        let (tx, snapshot) = watch::channel(StatusSnapshot::default());
        let (refresh, mut refresh_rx) = mpsc::unbounded_channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    Some(()) = refresh_rx.recv() => {}
                }
                poll_once(api.as_ref(), &tx).await;
            }
        });

        debug!(interval_secs = every.as_secs(), "status poller started");
        Self {
            handle,
            snapshot,
            refresh,
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.snapshot.clone()
    }

    /// Polls once more shortly, e.g. after a manual crawl.
    pub fn refresh_soon(&self) {
        let refresh = self.refresh.clone();
        tokio::spawn(async move {
            tokio::time::sleep(REFRESH_DELAY).await;
            let _ = refresh.send(());
        });
    }

    /// Cancels polling. Dropping the poller does the same.
    pub fn stop(self) {}
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.handle.abort();
        debug!("status poller stopped");
    }
}

async fn poll_once(api: &dyn CrawlerApi, tx: &watch::Sender<StatusSnapshot>) {
    let result = api.status().await;
    tx.send_modify(|snapshot| {
        snapshot.polls += 1;
        match result {
            Ok(status) => {
                snapshot.status = Some(status);
                snapshot.error = None;
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch crawler status");
                snapshot.error = Some(e.to_string());
            }
        }
    });
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrawlReport {
    pub success: bool,
    pub message: String,
    pub duration_secs: f64,
    pub news_count: u64,
    pub finished_at: DateTime<Utc>,
}

/// Runs a crawl immediately. Failures come back as an unsuccessful report.
pub async fn trigger_crawl<A: CrawlerApi + ?Sized>(api: &A) -> CrawlReport {
    let started = Instant::now();
    let result = api.crawl_now().await;
    let measured = started.elapsed().as_secs_f64();

    match result {
        Ok(resp) => {
            info!(news_count = resp.news_count.unwrap_or(0), "crawl finished");
            CrawlReport {
                success: true,
                message: resp.message,
                duration_secs: resp.duration.unwrap_or(measured),
                news_count: resp.news_count.unwrap_or(0),
                finished_at: Utc::now(),
            }
        }
        Err(e) => {
            warn!(error = %e, "crawl failed");
            CrawlReport {
                success: false,
                message: e.to_string(),
                duration_secs: measured,
                news_count: 0,
                finished_at: Utc::now(),
            }
        }
    }
}

/// Queues one article URL for crawling.
pub async fn submit_url<A: CrawlerApi + ?Sized>(api: &A, raw: &str) -> Result<MessageResponse> {
    let url = validate_article_url(raw)?;
    api.crawl_url(url.as_str()).await
}

pub async fn discover<A: CrawlerApi + ?Sized>(api: &A) -> Result<MessageResponse> {
    api.discover().await
}

pub fn validate_article_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ApiError::Validation("URL is required".to_string()));
    }
    let url = Url::parse(trimmed).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", trimmed, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ApiError::InvalidUrl(format!("unsupported scheme: {}", other))),
    }
}

#[cfg(test)]
#[path = "admin_tests.rs"]
mod tests;
