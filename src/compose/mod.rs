//! Compose command runner.
//!
//! Drives `docker compose` through every CLI form a host might support:
//! project-name candidates, short then long file flag, the legacy
//! `docker-compose` binary and finally a Docker API cleanup for `down`.

mod cleanup;

pub use cleanup::*;

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

use crate::config::ServerConfig;

/// Per-invocation limit for `up`/`down`.
pub const COMPOSE_TIMEOUT: Duration = Duration::from_secs(180);

/// Generic project names tried after the one inferred from the directory.
const FALLBACK_PROJECTS: [&str; 2] = ["docker", "services"];

/// Compose error types.
#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("{0}: command not found")]
    NotFound(String),
    #[error("command timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to run {program}: {source}")]
    Io {
        program: String,
        source: std::io::Error,
    },
    #[error("docker API error: {0}")]
    Docker(#[from] bollard::errors::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeAction {
    Up,
    Down,
}

impl ComposeAction {
    fn args(&self) -> &'static [&'static str] {
        match self {
            ComposeAction::Up => &["up", "-d"],
            ComposeAction::Down => &["down"],
        }
    }
}

/// Exit status and combined stdout+stderr of one process run.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub output: String,
}

/// Final result of a compose invocation chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeOutcome {
    pub success: bool,
    pub output: String,
}

impl ComposeOutcome {
    fn ok(output: String) -> Self {
        Self { success: true, output }
    }

    fn failed(output: String) -> Self {
        Self { success: false, output }
    }
}

/// Last-resort removal of compose containers through the Docker API.
#[async_trait]
pub trait ContainerCleanup: Send + Sync {
    /// Stop and remove compose-labelled containers, restricted to `services`
    /// when non-empty. Returns the removed container names.
    async fn remove_containers(&self, services: &BTreeSet<String>)
        -> Result<Vec<String>, ComposeError>;
}

/// Runs compose commands with CLI-variant fallbacks.
pub struct ComposeRunner {
    docker_bin: String,
    legacy_bin: String,
    timeout: Duration,
    cleanup: Option<Arc<dyn ContainerCleanup>>,
}

impl ComposeRunner {
    pub fn new(docker_bin: impl Into<String>, legacy_bin: impl Into<String>) -> Self {
        Self {
            docker_bin: docker_bin.into(),
            legacy_bin: legacy_bin.into(),
            timeout: COMPOSE_TIMEOUT,
            cleanup: None,
        }
    }

    pub fn from_config(cfg: &ServerConfig) -> Self {
        Self::new(cfg.docker_bin.clone(), cfg.legacy_compose_bin.clone())
            .with_cleanup(Arc::new(DockerApiCleanup))
    }

    pub fn with_cleanup(mut self, cleanup: Arc<dyn ContainerCleanup>) -> Self {
        self.cleanup = Some(cleanup);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn docker_bin(&self) -> &str {
        &self.docker_bin
    }

    /// Whether either orchestration binary can be located.
    pub fn cli_available(&self) -> bool {
        binary_exists(&self.docker_bin) || binary_exists(&self.legacy_bin)
    }

    /// Run `program` with a hard timeout; the child is killed when it expires.
    pub async fn exec(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, ComposeError> {
        tracing::debug!("Running: {} {}", program, args.join(" "));

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Err(_) => return Err(ComposeError::Timeout(timeout)),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ComposeError::NotFound(program.to_string()))
            }
            Ok(Err(source)) => {
                return Err(ComposeError::Io {
                    program: program.to_string(),
                    source,
                })
            }
            Ok(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::debug!("{} finished: returncode={:?}", program, output.status.code());
        tracing::debug!("Compose stdout: {}", stdout);
        tracing::debug!("Compose stderr: {}", stderr);

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            output: format!("{}{}", stdout, stderr),
        })
    }

    /// Bring a compose project up or down.
    pub async fn run_compose(&self, compose_path: &Path, action: ComposeAction) -> ComposeOutcome {
        if !compose_path.exists() {
            return ComposeOutcome::failed("compose file not found".to_string());
        }

        let projects = project_candidates(compose_path);
        let mut last_output = String::new();

        'forms: for file_flag in ["-f", "--file"] {
            for project in &projects {
                let args = compose_args(project.as_deref(), file_flag, compose_path, action.args());
                tracing::info!("Running compose command: {} {}", self.docker_bin, args.join(" "));
                match self.exec(&self.docker_bin, &args, self.timeout).await {
                    Ok(out) if out.success => return ComposeOutcome::ok(out.output),
                    Ok(out) => {
                        if flag_rejected(&out.output) {
                            tracing::warn!(
                                "Compose rejected {} flag: {}",
                                file_flag,
                                out.output.lines().next().unwrap_or_default()
                            );
                        }
                        last_output = out.output;
                    }
                    Err(ComposeError::NotFound(bin)) => {
                        tracing::warn!("{} not found; trying {}", bin, self.legacy_bin);
                        last_output = format!("{}: command not found", bin);
                        break 'forms;
                    }
                    Err(e) => {
                        tracing::warn!("Compose command failed: {}", e);
                        last_output = e.to_string();
                    }
                }
            }
        }

        let args = legacy_args(compose_path, action.args());
        tracing::info!("Running compose command: {} {}", self.legacy_bin, args.join(" "));
        match self.exec(&self.legacy_bin, &args, self.timeout).await {
            Ok(out) if out.success => {
                tracing::info!("Compose succeeded with legacy binary {}", self.legacy_bin);
                return ComposeOutcome::ok(out.output);
            }
            Ok(out) => last_output = out.output,
            Err(ComposeError::NotFound(bin)) => tracing::debug!("Fallback command not found: {}", bin),
            Err(e) => {
                tracing::warn!("Legacy compose command failed: {}", e);
                last_output = e.to_string();
            }
        }

        if action == ComposeAction::Down {
            if let Some(removed) = self.cleanup_containers(compose_path).await {
                return ComposeOutcome::ok(format!(
                    "docker API fallback removed containers: {:?}",
                    removed
                ));
            }
        }

        ComposeOutcome::failed(format!(
            "All compose invocation attempts failed. Last output: {}",
            last_output
        ))
    }

    async fn cleanup_containers(&self, compose_path: &Path) -> Option<Vec<String>> {
        let cleanup = self.cleanup.as_ref()?;
        tracing::info!("Attempting docker API fallback for compose down");

        let services = declared_services(compose_path);
        match tokio::time::timeout(self.timeout, cleanup.remove_containers(&services)).await {
            Ok(Ok(removed)) => Some(removed),
            Ok(Err(e)) => {
                tracing::debug!("Docker API fallback failed: {}", e);
                None
            }
            Err(_) => {
                tracing::debug!("Docker API fallback timed out");
                None
            }
        }
    }
}

/// Project names to try, most specific first; `None` means no `-p` flag.
pub fn project_candidates(compose_path: &Path) -> Vec<Option<String>> {
    let mut candidates: Vec<Option<String>> = Vec::new();
    let inferred = compose_path
        .parent()
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty());

    for project in inferred
        .into_iter()
        .chain(FALLBACK_PROJECTS.iter().map(|p| p.to_string()))
    {
        if !candidates.contains(&Some(project.clone())) {
            candidates.push(Some(project));
        }
    }
    candidates.push(None);
    candidates
}

/// Arguments for `docker compose [-p P] <file flag> <file> <action...>`.
pub fn compose_args(
    project: Option<&str>,
    file_flag: &str,
    compose_path: &Path,
    action: &[&str],
) -> Vec<String> {
    let mut args = vec!["compose".to_string()];
    if let Some(project) = project {
        args.push("-p".to_string());
        args.push(project.to_string());
    }
    args.push(file_flag.to_string());
    args.push(compose_path.display().to_string());
    args.extend(action.iter().map(|a| a.to_string()));
    args
}

/// Arguments for the standalone `docker-compose -f <file> <action...>`.
fn legacy_args(compose_path: &Path, action: &[&str]) -> Vec<String> {
    let mut args = vec!["-f".to_string(), compose_path.display().to_string()];
    args.extend(action.iter().map(|a| a.to_string()));
    args
}

fn flag_rejected(output: &str) -> bool {
    let lowered = output.to_lowercase();
    lowered.contains("unknown shorthand flag") || lowered.contains("unknown flag")
}

#[derive(Deserialize, Default)]
struct ComposeFile {
    #[serde(default)]
    services: BTreeMap<String, serde_yaml::Value>,
}

/// Service names declared in a compose file; empty when it cannot be parsed.
pub fn declared_services(compose_path: &Path) -> BTreeSet<String> {
    std::fs::read_to_string(compose_path)
        .ok()
        .and_then(|text| serde_yaml::from_str::<ComposeFile>(&text).ok())
        .map(|file| file.services.into_keys().collect())
        .unwrap_or_default()
}

fn binary_exists(bin: &str) -> bool {
    let path = PathBuf::from(bin);
    if path.components().count() > 1 {
        return path.is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(bin).is_file()))
        .unwrap_or(false)
}
