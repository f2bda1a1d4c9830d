//! Uptime Kuma integration.
//!
//! Scrapes the Prometheus `/metrics` feed, groups series into per-monitor
//! entries and exposes them under `url:`, `name:` and `id:` keys.

mod client;
mod metrics;

pub use client::*;
pub use metrics::*;

use reqwest::Url;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::registry::ServiceDescriptor;

/// Monitor error types. Logged by the client, never returned to callers.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),
}

/// Last-known state of one external monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorEntry {
    pub name: Option<String>,
    pub raw_url: Option<String>,
    pub normalized_url: Option<String>,
    pub monitor_id: String,
    /// 0=DOWN, 1=UP, 2=PENDING, 3=MAINTENANCE; absent until observed.
    pub status_code: Option<i64>,
}

impl MonitorEntry {
    /// Every lookup key this entry is reachable under.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(3);
        if let Some(url) = &self.normalized_url {
            keys.push(format!("url:{}", url));
        }
        if let Some(name) = &self.name {
            keys.push(format!("name:{}", name.to_lowercase()));
        }
        keys.push(format!("id:{}", self.monitor_id));
        keys
    }
}

/// Human label for a monitor status code.
pub fn status_label(code: i64) -> &'static str {
    match code {
        0 => "DOWN",
        1 => "UP",
        2 => "PENDING",
        3 => "MAINTENANCE",
        _ => "UNKNOWN",
    }
}

/// The keyed result of one fetch-and-parse cycle.
///
/// All keys of one monitor share a single `Arc<MonitorEntry>`.
#[derive(Debug, Clone, Default)]
pub struct MonitorSnapshot {
    entries: HashMap<String, Arc<MonitorEntry>>,
}

impl MonitorSnapshot {
    pub fn from_entries(entries: Vec<MonitorEntry>) -> Self {
        let mut mapped = HashMap::new();
        for entry in entries {
            let entry = Arc::new(entry);
            for key in entry.keys() {
                mapped.insert(key, entry.clone());
            }
        }
        Self { entries: mapped }
    }

    pub fn get(&self, key: &str) -> Option<&Arc<MonitorEntry>> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Each distinct entry once, regardless of how many keys reach it.
    pub fn unique_entries(&self) -> Vec<Arc<MonitorEntry>> {
        let mut unique: Vec<Arc<MonitorEntry>> = Vec::new();
        let mut keys: Vec<&String> = self.entries.keys().collect();
        keys.sort();
        for key in keys {
            let entry = &self.entries[key];
            if !unique.iter().any(|e| Arc::ptr_eq(e, entry)) {
                unique.push(entry.clone());
            }
        }
        unique
    }
}

/// Reduce a URL to `scheme://host[:port]`, lowercased.
///
/// Default ports are dropped. Strings without a parsable host fall back to
/// the part before the first `/`.
pub fn normalize_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(url) = Url::parse(raw) {
        if let Some(host) = url.host_str().filter(|h| !h.is_empty()) {
            let mut out = format!("{}://{}", url.scheme(), host.to_ascii_lowercase());
            if let Some(port) = url.port() {
                out.push_str(&format!(":{}", port));
            }
            return Some(out);
        }
    }

    let head = raw.split('/').next().unwrap_or_default();
    if head.is_empty() {
        None
    } else {
        Some(head.to_ascii_lowercase())
    }
}

/// Find the monitor for a service. URL match wins over name match.
pub fn find_monitor_for_service(
    svc: &ServiceDescriptor,
    snapshot: &MonitorSnapshot,
) -> Option<Arc<MonitorEntry>> {
    if snapshot.is_empty() {
        return None;
    }

    if let Some(url) = svc.url.as_deref().and_then(normalize_url) {
        if let Some(entry) = snapshot.get(&format!("url:{}", url)) {
            return Some(entry.clone());
        }
    }

    let name = svc.name.as_deref()?;
    snapshot.get(&format!("name:{}", name.to_lowercase())).cloned()
}
