//! Docker API fallback for `compose down`.

use async_trait::async_trait;
use bollard::container::{ListContainersOptions, RemoveContainerOptions, StopContainerOptions};
use bollard::Docker;
use std::collections::{BTreeSet, HashMap};

use super::{ComposeError, ContainerCleanup};

/// Label set by compose on every container it creates.
pub const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";

/// Removes compose containers through the local Docker socket.
pub struct DockerApiCleanup;

#[async_trait]
impl ContainerCleanup for DockerApiCleanup {
    async fn remove_containers(
        &self,
        services: &BTreeSet<String>,
    ) -> Result<Vec<String>, ComposeError> {
        let docker = Docker::connect_with_local_defaults()?;

        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![COMPOSE_SERVICE_LABEL.to_string()]);
        let containers = docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                filters,
                ..Default::default()
            }))
            .await?;

        let mut removed = Vec::new();
        for container in containers {
            let service = container
                .labels
                .as_ref()
                .and_then(|labels| labels.get(COMPOSE_SERVICE_LABEL));
            let Some(service) = service else {
                continue;
            };
            if !services.is_empty() && !services.contains(service) {
                continue;
            }
            let Some(id) = container.id.clone() else {
                continue;
            };
            let name = container
                .names
                .as_ref()
                .and_then(|names| names.first())
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_else(|| id.clone());

            if container.state.as_deref() == Some("running") {
                if let Err(e) = docker
                    .stop_container(&id, Some(StopContainerOptions { t: 10 }))
                    .await
                {
                    tracing::error!("Error stopping container {}: {}", name, e);
                    continue;
                }
            }

            let options = RemoveContainerOptions {
                v: true,
                force: true,
                ..Default::default()
            };
            match docker.remove_container(&id, Some(options)).await {
                Ok(()) => removed.push(name),
                Err(e) => tracing::error!("Error removing container {}: {}", name, e),
            }
        }

        Ok(removed)
    }
}
