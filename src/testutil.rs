//! Fakes shared by the unit tests: a local HTTP server and scripted CLIs.

use axum::Router;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn_http(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Write an executable shell script named `name` into `dir`.
pub fn fake_cli(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Create a compose file at `<dir>/<project>/docker-compose.yml`.
pub fn compose_file(dir: &Path, project: &str, yaml: &str) -> PathBuf {
    let project_dir = dir.join(project);
    std::fs::create_dir_all(&project_dir).unwrap();
    let path = project_dir.join("docker-compose.yml");
    std::fs::write(&path, yaml).unwrap();
    path
}

struct InfoCounter(Arc<AtomicUsize>);

impl<S: Subscriber> Layer<S> for InfoCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() <= Level::INFO {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Count info-or-louder events on this thread while the guard is alive.
pub fn capture_info_events() -> (DefaultGuard, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(InfoCounter(count.clone()));
    (tracing::subscriber::set_default(subscriber), count)
}
