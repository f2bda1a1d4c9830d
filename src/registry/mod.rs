//! Service registry.
//!
//! Reads the flat list of service descriptors from `services.json` on every
//! call, falling back to the bundled example when the file is absent.

mod bootstrap;

pub use bootstrap::*;

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

use crate::config::ServerConfig;

/// Registry error types. These never escape [`Registry::load_services`].
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid registry JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// One entry of the service registry.
///
/// Unknown fields are kept in `extra` and echoed back in listings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    #[serde(default, deserialize_with = "id_from_scalar", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compose: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
    /// Absolute compose file location, filled in by the registry.
    #[serde(skip)]
    pub compose_path: Option<PathBuf>,
}

impl ServiceDescriptor {
    /// Whether this record answers to `key` by name or by id.
    pub fn matches(&self, key: &str) -> bool {
        self.name.as_deref() == Some(key) || self.id.as_deref() == Some(key)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().or(self.id.as_deref()).unwrap_or("<unnamed>")
    }
}

/// Loads service descriptors and resolves their compose paths.
pub struct Registry {
    services_file: PathBuf,
    fallback: Option<Cow<'static, [u8]>>,
    compose_dir: PathBuf,
}

impl Registry {
    pub fn new(services_file: impl Into<PathBuf>, compose_dir: impl Into<PathBuf>) -> Self {
        Self {
            services_file: services_file.into(),
            fallback: None,
            compose_dir: compose_dir.into(),
        }
    }

    /// Registry wired to the configured paths and the bundled example.
    pub fn from_config(cfg: &ServerConfig) -> Self {
        Self::new(cfg.services_file(), cfg.compose_dir.clone())
            .with_fallback(crate::assets::example_registry())
    }

    /// Registry content used when the services file does not exist.
    pub fn with_fallback(mut self, data: Option<Cow<'static, [u8]>>) -> Self {
        self.fallback = data;
        self
    }

    /// Load all services. Never fails: problems are logged and yield an empty list.
    pub fn load_services(&self) -> Vec<ServiceDescriptor> {
        match self.read_records() {
            Ok(mut services) => {
                for svc in &mut services {
                    svc.compose_path = self.compose_path_for(svc);
                }
                services
            }
            Err(e) => {
                tracing::error!("Failed to load service registry: {}", e);
                Vec::new()
            }
        }
    }

    /// Find a service by name or id.
    pub fn find(&self, key: &str) -> Option<ServiceDescriptor> {
        self.load_services().into_iter().find(|s| s.matches(key))
    }

    fn read_records(&self) -> Result<Vec<ServiceDescriptor>, RegistryError> {
        if self.services_file.exists() {
            let data = std::fs::read(&self.services_file).map_err(|source| RegistryError::Io {
                path: self.services_file.clone(),
                source,
            })?;
            return parse_records(&data);
        }

        match &self.fallback {
            Some(data) => {
                tracing::debug!(
                    "{} not found, using bundled example registry",
                    self.services_file.display()
                );
                parse_records(data)
            }
            None => Ok(Vec::new()),
        }
    }

    /// Absolute compose path for a service.
    ///
    /// Absolute paths are returned verbatim; relative ones are resolved against
    /// the compose directory. Existence is not checked.
    pub fn compose_path_for(&self, svc: &ServiceDescriptor) -> Option<PathBuf> {
        let raw = svc.compose.as_deref().filter(|c| !c.trim().is_empty())?;
        let path = Path::new(raw);
        if path.is_absolute() {
            return Some(path.to_path_buf());
        }

        let base = if self.compose_dir.is_absolute() {
            self.compose_dir.clone()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&self.compose_dir))
                .unwrap_or_else(|_| self.compose_dir.clone())
        };
        Some(normalize_lexically(&base.join(path)))
    }
}

/// Parse the registry array record by record; malformed records are skipped.
fn parse_records(data: &[u8]) -> Result<Vec<ServiceDescriptor>, RegistryError> {
    let records: Vec<serde_json::Value> = serde_json::from_slice(data)?;
    let mut services = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        match serde_json::from_value::<ServiceDescriptor>(record) {
            Ok(svc) => services.push(svc),
            Err(e) => tracing::warn!("Skipping registry record {}: {}", index, e),
        }
    }
    Ok(services)
}

/// Accept `"id": "dns"` as well as `"id": 3`.
fn id_from_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde_json::Value;
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

/// Collapse `.` and `..` components without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
