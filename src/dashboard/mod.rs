//! Dashboard operations behind the HTTP API.
//!
//! Ties the registry, monitor feed, status resolver and job executor
//! together into the list / start / stop / job-query operations.

mod view;

pub use view::*;

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::db::{DbError, Job, JobAction};
use crate::jobs::JobExecutor;
use crate::monitor::{find_monitor_for_service, MonitorClient, MonitorEntry};
use crate::probe::StatusResolver;
use crate::registry::{Registry, ServiceDescriptor};

/// Failures of start/stop requests.
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("service not found")]
    NotFound(String),
    #[error("orchestration CLI not found: {0}")]
    Unavailable(String),
    #[error("job store error: {0}")]
    Storage(#[from] DbError),
    /// A fan-out stopped part way; `submitted` jobs are already running.
    #[error("job store error after {} submitted jobs: {source}", .submitted.len())]
    PartialSubmit {
        submitted: Vec<JobRef>,
        source: DbError,
    },
}

/// A submitted job in a fan-out response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRef {
    pub name: Option<String>,
    pub job_id: String,
}

pub struct Dashboard {
    registry: Registry,
    monitor: MonitorClient,
    resolver: StatusResolver,
    jobs: JobExecutor,
}

impl Dashboard {
    pub fn new(
        registry: Registry,
        monitor: MonitorClient,
        resolver: StatusResolver,
        jobs: JobExecutor,
    ) -> Self {
        Self {
            registry,
            monitor,
            resolver,
            jobs,
        }
    }

    /// Every registered service with its resolved status, followed by cards
    /// for monitors that matched no service. Never fails.
    pub async fn list_services(&self) -> Vec<ServiceView> {
        let services = self.registry.load_services();
        let snapshot = self.monitor.fetch_snapshot().await;

        let statuses = join_all(
            services
                .iter()
                .map(|svc| self.resolver.resolve(svc, &snapshot)),
        )
        .await;

        let mut matched: Vec<Arc<MonitorEntry>> = Vec::new();
        let mut views = Vec::with_capacity(services.len());
        for (svc, status) in services.into_iter().zip(statuses) {
            let uptime = match find_monitor_for_service(&svc, &snapshot) {
                Some(entry) => {
                    let uptime = UptimeSummary::from_entry(&entry);
                    matched.push(entry);
                    uptime
                }
                None => None,
            };
            views.push(ServiceView::new(svc, status, uptime));
        }

        for entry in snapshot.unique_entries() {
            if matched.iter().any(|m| Arc::ptr_eq(m, &entry)) {
                continue;
            }
            views.push(ServiceView::monitor_only(&entry));
        }

        views
    }

    pub async fn start_service(&self, key: &str) -> Result<String, ControlError> {
        self.control(JobAction::Start, key).await
    }

    pub async fn stop_service(&self, key: &str) -> Result<String, ControlError> {
        self.control(JobAction::Stop, key).await
    }

    pub async fn start_all(&self) -> Result<Vec<JobRef>, ControlError> {
        self.control_all(JobAction::Start).await
    }

    pub async fn stop_all(&self) -> Result<Vec<JobRef>, ControlError> {
        self.control_all(JobAction::Stop).await
    }

    pub fn get_job(&self, id: &str) -> Result<Option<Job>, DbError> {
        self.jobs.get_job(id)
    }

    pub async fn in_flight_jobs(&self) -> Vec<Job> {
        self.jobs.in_flight().await
    }

    async fn control(&self, action: JobAction, key: &str) -> Result<String, ControlError> {
        let svc = self
            .registry
            .find(key)
            .ok_or_else(|| ControlError::NotFound(key.to_string()))?;
        self.ensure_cli()?;

        let name = svc.name.clone().or_else(|| Some(key.to_string()));
        Ok(self.jobs.submit_job(action, name, svc.compose_path).await?)
    }

    async fn control_all(&self, action: JobAction) -> Result<Vec<JobRef>, ControlError> {
        self.ensure_cli()?;

        let mut refs = Vec::new();
        for svc in self.registry.load_services() {
            let ServiceDescriptor {
                name, compose_path, ..
            } = svc;
            match self.jobs.submit_job(action, name.clone(), compose_path).await {
                Ok(job_id) => refs.push(JobRef { name, job_id }),
                Err(source) => {
                    if !refs.is_empty() {
                        let ids: Vec<&str> = refs.iter().map(|r| r.job_id.as_str()).collect();
                        tracing::error!(
                            "{} all aborted at {}; already submitted jobs: {:?}",
                            action.as_str(),
                            name.as_deref().unwrap_or("<unnamed>"),
                            ids
                        );
                    }
                    return Err(ControlError::PartialSubmit {
                        submitted: refs,
                        source,
                    });
                }
            }
        }
        Ok(refs)
    }

    fn ensure_cli(&self) -> Result<(), ControlError> {
        let runner = self.jobs.runner();
        if runner.cli_available() {
            Ok(())
        } else {
            Err(ControlError::Unavailable(runner.docker_bin().to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::ComposeRunner;
    use crate::db::{JobStatus, Store};
    use crate::monitor::MonitorCache;
    use crate::probe::ServiceStatus;
    use crate::testutil::{compose_file, fake_cli, spawn_http};
    use axum::{http::StatusCode, routing::get, Router};
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new(services: serde_json::Value) -> Self {
            let dir = TempDir::new().unwrap();
            std::fs::write(dir.path().join("services.json"), services.to_string()).unwrap();
            Self { dir }
        }

        fn path(&self) -> &Path {
            self.dir.path()
        }

        fn dashboard(&self, docker: &str, monitor_url: Option<String>) -> Dashboard {
            let registry = Registry::new(self.path().join("services.json"), self.path());
            let monitor = MonitorClient::new(
                monitor_url,
                None,
                Duration::from_secs(15),
                Arc::new(MonitorCache::new()),
            )
            .unwrap();
            let runner = Arc::new(ComposeRunner::new(docker, "/nonexistent/docker-compose"));
            let resolver = StatusResolver::new(runner.clone()).unwrap();
            let store = Arc::new(Store::new(self.path().join("jobs.db")).unwrap());
            Dashboard::new(registry, monitor, resolver, JobExecutor::new(store, runner))
        }
    }

    fn wiki(url: &str) -> serde_json::Value {
        serde_json::json!([{
            "name": "wiki",
            "url": url,
            "compose": "wiki/docker-compose.yml",
            "category": "docs"
        }])
    }

    async fn metrics_server(body: String) -> String {
        spawn_http(Router::new().route("/metrics", get(move || async move { body })))
            .await
    }

    #[tokio::test]
    async fn test_missing_compose_file_lists_as_missing() {
        let fx = Fixture::new(wiki("http://wiki.local"));
        let dashboard = fx.dashboard("/nonexistent/docker", None);

        let views = dashboard.list_services().await;
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].status, ServiceStatus::Missing);
        assert_eq!(views[0].service.extra["category"], "docs");
        assert!(views[0].uptime.is_none());
    }

    #[tokio::test]
    async fn test_monitor_down_beats_healthy_url() {
        let fx = Fixture::new(serde_json::Value::Null);
        let site = spawn_http(Router::new().route("/", get(|| async { StatusCode::OK }))).await;
        std::fs::write(fx.path().join("services.json"), wiki(&site).to_string()).unwrap();
        compose_file(fx.path(), "wiki", "services: {}\n");
        let kuma = metrics_server(format!(
            "monitor_status{{monitor_name=\"wiki\",monitor_url=\"{}\"}} 0\n\
             monitor_status{{monitor_name=\"router\",monitor_url=\"http://10.0.0.1\",monitor_id=\"4\"}} 1\n",
            site
        ))
        .await;
        let dashboard = fx.dashboard("/nonexistent/docker", Some(kuma));

        let views = dashboard.list_services().await;
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].status, ServiceStatus::Stopped);
        assert_eq!(views[0].uptime, Some(UptimeSummary { code: 0, label: "DOWN" }));
        assert_eq!(views[0].display.color, "red");

        assert!(views[1].kuma_only);
        assert_eq!(views[1].service.name.as_deref(), Some("router"));
        assert_eq!(views[1].status, ServiceStatus::Unknown);
    }

    #[tokio::test]
    async fn test_start_unregistered_creates_no_job() {
        let fx = Fixture::new(wiki("http://wiki.local"));
        let docker = fake_cli(fx.path(), "docker", "echo ok");
        let dashboard = fx.dashboard(&docker.display().to_string(), None);

        let err = dashboard.start_service("nextcloud").await.unwrap_err();
        assert!(matches!(err, ControlError::NotFound(ref k) if k == "nextcloud"));
        assert!(dashboard.in_flight_jobs().await.is_empty());
    }

    #[tokio::test]
    async fn test_start_without_cli_is_unavailable() {
        let fx = Fixture::new(wiki("http://wiki.local"));
        let dashboard = fx.dashboard("/nonexistent/docker", None);

        assert!(matches!(
            dashboard.start_service("wiki").await,
            Err(ControlError::Unavailable(_))
        ));
        assert!(matches!(dashboard.stop_all().await, Err(ControlError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_start_by_id_runs_job() {
        let fx = Fixture::new(serde_json::json!([
            {"id": "dns", "name": "pihole", "compose": "dns/docker-compose.yml"}
        ]));
        compose_file(fx.path(), "dns", "services:\n  pihole: {}\n");
        let docker = fake_cli(fx.path(), "docker", "echo \"Container pihole Started\"");
        let dashboard = fx.dashboard(&docker.display().to_string(), None);

        let id = dashboard.start_service("dns").await.unwrap();
        let mut job = dashboard.get_job(&id).unwrap().unwrap();
        for _ in 0..200 {
            if job.status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
            job = dashboard.get_job(&id).unwrap().unwrap();
        }
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.name.as_deref(), Some("pihole"));
        assert_eq!(job.action, JobAction::Start);
    }

    #[tokio::test]
    async fn test_fan_out_failure_returns_submitted_jobs() {
        let fx = Fixture::new(serde_json::json!([
            {"name": "wiki", "compose": "wiki/docker-compose.yml"},
            {"name": "media", "compose": "media/docker-compose.yml"},
            {"name": "dns", "compose": "dns/docker-compose.yml"}
        ]));
        let docker = fake_cli(fx.path(), "docker", "echo ok");
        let dashboard = fx.dashboard(&docker.display().to_string(), None);
        rusqlite::Connection::open(fx.path().join("jobs.db"))
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_media BEFORE INSERT ON jobs WHEN NEW.name = 'media'
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();

        match dashboard.start_all().await {
            Err(ControlError::PartialSubmit { submitted, .. }) => {
                assert_eq!(submitted.len(), 1);
                assert_eq!(submitted[0].name.as_deref(), Some("wiki"));
                assert!(dashboard.get_job(&submitted[0].job_id).unwrap().is_some());
            }
            other => panic!("expected partial submit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stop_all_fans_out() {
        let fx = Fixture::new(serde_json::json!([
            {"name": "wiki", "compose": "wiki/docker-compose.yml"},
            {"name": "media", "compose": "media/docker-compose.yml"}
        ]));
        let docker = fake_cli(fx.path(), "docker", "echo ok");
        let dashboard = fx.dashboard(&docker.display().to_string(), None);

        let refs = dashboard.stop_all().await.unwrap();
        let names: Vec<_> = refs.iter().map(|r| r.name.as_deref().unwrap()).collect();
        assert_eq!(names, vec!["wiki", "media"]);
        assert_ne!(refs[0].job_id, refs[1].job_id);
        for r in &refs {
            assert!(dashboard.get_job(&r.job_id).unwrap().is_some());
        }
    }
}
