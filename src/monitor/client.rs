//! Cached HTTP client for the monitor feed.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::{parse_metrics, MonitorError, MonitorSnapshot};
use crate::config::ServerConfig;

const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

struct CachedSnapshot {
    fetched_at: Instant,
    snapshot: Arc<MonitorSnapshot>,
}

/// Process-wide holder of the last successfully fetched snapshot.
///
/// Snapshots are built completely before being published, so readers
/// never observe a partial one.
#[derive(Default)]
pub struct MonitorCache {
    slot: RwLock<Option<CachedSnapshot>>,
}

impl MonitorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached snapshot if it is non-empty and younger than `ttl`.
    pub async fn fresh(&self, ttl: Duration) -> Option<Arc<MonitorSnapshot>> {
        let slot = self.slot.read().await;
        slot.as_ref()
            .filter(|c| !c.snapshot.is_empty() && c.fetched_at.elapsed() < ttl)
            .map(|c| c.snapshot.clone())
    }

    pub async fn publish(&self, snapshot: Arc<MonitorSnapshot>) {
        let mut slot = self.slot.write().await;
        *slot = Some(CachedSnapshot {
            fetched_at: Instant::now(),
            snapshot,
        });
    }

    #[cfg(test)]
    pub async fn current(&self) -> Option<Arc<MonitorSnapshot>> {
        self.slot.read().await.as_ref().map(|c| c.snapshot.clone())
    }
}

/// Client for the optional Uptime Kuma metrics endpoint.
pub struct MonitorClient {
    base_url: Option<String>,
    api_key: Option<String>,
    ttl: Duration,
    cache: Arc<MonitorCache>,
    http: reqwest::Client,
}

impl MonitorClient {
    pub fn new(
        base_url: Option<String>,
        api_key: Option<String>,
        ttl: Duration,
        cache: Arc<MonitorCache>,
    ) -> Result<Self, MonitorError> {
        let http = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.filter(|u| !u.trim().is_empty()),
            api_key: api_key.filter(|k| !k.is_empty()),
            ttl,
            cache,
            http,
        })
    }

    pub fn from_config(cfg: &ServerConfig, cache: Arc<MonitorCache>) -> Result<Self, MonitorError> {
        Self::new(
            cfg.monitor_url.clone(),
            cfg.monitor_api_key.clone(),
            cfg.monitor_cache_ttl,
            cache,
        )
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    /// Current monitor snapshot.
    ///
    /// Returns an empty snapshot when no endpoint is configured or the fetch
    /// fails; the cache is only replaced after a successful fetch.
    pub async fn fetch_snapshot(&self) -> Arc<MonitorSnapshot> {
        let Some(base) = &self.base_url else {
            return Arc::new(MonitorSnapshot::default());
        };

        if let Some(cached) = self.cache.fresh(self.ttl).await {
            return cached;
        }

        let url = format!("{}/metrics", base.trim_end_matches('/'));
        tracing::info!("Fetching Uptime Kuma metrics from {}", url);

        match self.fetch_remote(&url).await {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                tracing::info!(
                    "Parsed {} monitors from Kuma metrics",
                    snapshot.unique_entries().len()
                );
                self.cache.publish(snapshot.clone()).await;
                snapshot
            }
            Err(e) => {
                tracing::warn!("Error fetching Uptime Kuma metrics from {}: {}", url, e);
                Arc::new(MonitorSnapshot::default())
            }
        }
    }

    async fn fetch_remote(&self, url: &str) -> Result<MonitorSnapshot, MonitorError> {
        let mut request = self.http.get(url);
        if let Some(key) = &self.api_key {
            request = request.basic_auth("", Some(key));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MonitorError::Status(status));
        }

        let body = response.text().await?;
        Ok(parse_metrics(&body))
    }
}
