//! Service status resolution.
//!
//! Tries, in order: the compose file's presence, `docker compose ps`, the
//! Uptime Kuma monitor and a direct HTTP probe. The first conclusive signal
//! wins; a tier without a signal hands over to the next one.

mod compose;
mod http;

pub use compose::*;
pub use http::*;

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::compose::ComposeRunner;
use crate::monitor::{find_monitor_for_service, MonitorSnapshot};
use crate::registry::ServiceDescriptor;

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
}

/// Run state reported for a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Running,
    Stopped,
    Missing,
    Unknown,
}

/// Resolves a service's status from the layered signal sources.
pub struct StatusResolver {
    runner: Arc<ComposeRunner>,
    http: reqwest::Client,
}

impl StatusResolver {
    pub fn new(runner: Arc<ComposeRunner>) -> Result<Self, ProbeError> {
        Ok(Self {
            runner,
            http: liveness_client(HTTP_PROBE_TIMEOUT)?,
        })
    }

    pub async fn resolve(&self, svc: &ServiceDescriptor, snapshot: &MonitorSnapshot) -> ServiceStatus {
        if let Some(path) = &svc.compose_path {
            if !path.exists() {
                return ServiceStatus::Missing;
            }
            if let Some(status) = compose_ps_status(&self.runner, path, svc.display_name()).await {
                return status;
            }
        }

        if let Some(status) = monitor_status(svc, snapshot) {
            return status;
        }

        match &svc.url {
            Some(url) => self.http_status(url).await,
            None => ServiceStatus::Unknown,
        }
    }

    async fn http_status(&self, url: &str) -> ServiceStatus {
        match run_http_probe(&self.http, url).await {
            Ok(code) if code.as_u16() < 400 => ServiceStatus::Running,
            Ok(code) => {
                tracing::debug!("HTTP probe of {} returned {}", url, code);
                ServiceStatus::Stopped
            }
            Err(e) => {
                tracing::debug!("HTTP probe of {} failed: {}", url, e);
                ServiceStatus::Unknown
            }
        }
    }
}

/// Status from the matching monitor, if one matched and reported a code.
fn monitor_status(svc: &ServiceDescriptor, snapshot: &MonitorSnapshot) -> Option<ServiceStatus> {
    let entry = find_monitor_for_service(svc, snapshot)?;
    let code = entry.status_code?;
    Some(if code == 1 {
        ServiceStatus::Running
    } else {
        ServiceStatus::Stopped
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::parse_metrics;
    use crate::testutil::{compose_file, fake_cli, spawn_http};
    use axum::{http::StatusCode, routing::get, Router};
    use std::path::Path;
    use tempfile::TempDir;

    fn absent_cli() -> Arc<ComposeRunner> {
        Arc::new(ComposeRunner::new("/nonexistent/docker", "/nonexistent/docker-compose"))
    }

    fn cli(dir: &Path, script: &str) -> Arc<ComposeRunner> {
        let docker = fake_cli(dir, "docker", script);
        Arc::new(ComposeRunner::new(docker.display().to_string(), "/nonexistent/docker-compose"))
    }

    fn service(url: Option<&str>, compose_path: Option<std::path::PathBuf>) -> ServiceDescriptor {
        ServiceDescriptor {
            name: Some("wiki".to_string()),
            url: url.map(str::to_string),
            compose: Some("wiki/docker-compose.yml".to_string()),
            compose_path,
            ..Default::default()
        }
    }

    async fn status_server(status: StatusCode) -> String {
        spawn_http(Router::new().route("/", get(move || async move { status }))).await
    }

    #[tokio::test]
    async fn test_missing_compose_file_wins() {
        let dir = TempDir::new().unwrap();
        let base = status_server(StatusCode::OK).await;
        let snapshot = parse_metrics(&format!(
            "monitor_status{{monitor_name=\"wiki\",monitor_url=\"{}\"}} 1\n",
            base
        ));
        let resolver = StatusResolver::new(cli(dir.path(), "echo Up")).unwrap();
        let svc = service(Some(&base), Some(dir.path().join("wiki/docker-compose.yml")));

        assert_eq!(resolver.resolve(&svc, &snapshot).await, ServiceStatus::Missing);
    }

    #[tokio::test]
    async fn test_compose_ps_running_skips_other_tiers() {
        let dir = TempDir::new().unwrap();
        let path = compose_file(dir.path(), "wiki", "services: {}\n");
        let resolver = StatusResolver::new(cli(dir.path(), r#"echo "wiki_app_1 Up 2 hours""#)).unwrap();
        let snapshot = parse_metrics("monitor_status{monitor_url=\"http://127.0.0.1:1\"} 0\n");

        let svc = service(Some("http://127.0.0.1:1"), Some(path));
        assert_eq!(resolver.resolve(&svc, &snapshot).await, ServiceStatus::Running);
    }

    #[tokio::test]
    async fn test_failed_ps_is_not_a_signal() {
        let dir = TempDir::new().unwrap();
        let path = compose_file(dir.path(), "wiki", "services: {}\n");
        let resolver = StatusResolver::new(cli(
            dir.path(),
            "echo 'Cannot connect to the Docker daemon. Is the docker daemon running?' >&2; exit 1",
        ))
        .unwrap();

        let svc = service(None, Some(path));
        assert_eq!(
            resolver.resolve(&svc, &MonitorSnapshot::default()).await,
            ServiceStatus::Unknown
        );
    }

    #[tokio::test]
    async fn test_absent_cli_falls_back_to_http() {
        let dir = TempDir::new().unwrap();
        let path = compose_file(dir.path(), "wiki", "services: {}\n");
        let base = status_server(StatusCode::OK).await;
        let resolver = StatusResolver::new(absent_cli()).unwrap();

        let svc = service(Some(&base), Some(path));
        assert_eq!(
            resolver.resolve(&svc, &MonitorSnapshot::default()).await,
            ServiceStatus::Running
        );
    }

    #[tokio::test]
    async fn test_monitor_precedes_http_probe() {
        let dir = TempDir::new().unwrap();
        let path = compose_file(dir.path(), "wiki", "services: {}\n");
        let base = status_server(StatusCode::OK).await;
        let snapshot = parse_metrics(&format!("monitor_status{{monitor_url=\"{}/\"}} 0\n", base));
        let resolver = StatusResolver::new(absent_cli()).unwrap();

        let svc = service(Some(&base), Some(path));
        assert_eq!(resolver.resolve(&svc, &snapshot).await, ServiceStatus::Stopped);
    }

    #[tokio::test]
    async fn test_monitor_without_code_is_skipped() {
        let base = status_server(StatusCode::SERVICE_UNAVAILABLE).await;
        let snapshot = parse_metrics(&format!(
            "monitor_response_time{{monitor_url=\"{}\"}} 12\n",
            base
        ));
        let resolver = StatusResolver::new(absent_cli()).unwrap();

        let svc = service(Some(&base), None);
        assert_eq!(resolver.resolve(&svc, &snapshot).await, ServiceStatus::Stopped);
    }

    #[tokio::test]
    async fn test_unreachable_url_is_unknown() {
        let resolver = StatusResolver::new(absent_cli()).unwrap();
        let svc = service(Some("http://127.0.0.1:1/"), None);
        assert_eq!(
            resolver.resolve(&svc, &MonitorSnapshot::default()).await,
            ServiceStatus::Unknown
        );
    }

    #[tokio::test]
    async fn test_no_signal_at_all_is_unknown() {
        let resolver = StatusResolver::new(absent_cli()).unwrap();
        assert_eq!(
            resolver
                .resolve(&ServiceDescriptor::default(), &MonitorSnapshot::default())
                .await,
            ServiceStatus::Unknown
        );
    }
}
