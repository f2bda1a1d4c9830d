//! `docker compose ps` tier.

use std::path::Path;
use std::time::Duration;

use super::ServiceStatus;
use crate::compose::{compose_args, project_candidates, ComposeError, ComposeRunner};

/// Overall limit for the ps tier.
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(30);

const RUNNING_TOKENS: [&str; 4] = ["up", "running", "healthy", "started"];

/// `Some(Running)` when a successful `ps` reports a live container.
///
/// Anything else (missing CLI, error exit, timeout, inconclusive output)
/// is no signal.
pub async fn compose_ps_status(
    runner: &ComposeRunner,
    compose_path: &Path,
    service: &str,
) -> Option<ServiceStatus> {
    match tokio::time::timeout(STATUS_TIMEOUT, ps_candidates(runner, compose_path, service)).await {
        Ok(status) => status,
        Err(_) => {
            tracing::debug!("docker compose ps timed out for {}", service);
            None
        }
    }
}

async fn ps_candidates(
    runner: &ComposeRunner,
    compose_path: &Path,
    service: &str,
) -> Option<ServiceStatus> {
    for project in project_candidates(compose_path) {
        let args = compose_args(project.as_deref(), "-f", compose_path, &["ps"]);
        match runner.exec(runner.docker_bin(), &args, STATUS_TIMEOUT).await {
            Ok(out) if out.success => {
                if reports_running(&out.output) {
                    return Some(ServiceStatus::Running);
                }
            }
            Ok(out) => tracing::debug!(
                "docker compose ps failed for {} with project {:?}: exit {:?}",
                service,
                project,
                out.code
            ),
            Err(ComposeError::NotFound(_)) => {
                tracing::debug!(
                    "docker CLI not found; continuing with Kuma/HTTP probe for {}",
                    service
                );
                break;
            }
            Err(e) => tracing::debug!("docker compose ps failed for {}: {}", service, e),
        }
    }
    None
}

fn reports_running(output: &str) -> bool {
    let lowered = output.to_lowercase();
    RUNNING_TOKENS.iter().any(|token| lowered.contains(token))
}
