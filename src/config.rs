//! Configuration module for homedash.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Number of concurrent compose jobs. Not configurable.
pub const WORKER_POOL_SIZE: usize = 4;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the web server (default: 5000)
    pub http_port: u16,
    /// Path to the SQLite job database (default: "jobs.db")
    pub db_path: String,
    /// Mounted host folder holding services.json, images and compose files
    pub service_root: Option<PathBuf>,
    /// Directory holding services.json when no service root is set
    pub config_dir: PathBuf,
    /// Base directory for relative compose paths when no service root is set
    pub compose_dir: PathBuf,
    /// Uptime Kuma base URL; the monitor tier is disabled when unset
    pub monitor_url: Option<String>,
    pub monitor_api_key: Option<String>,
    pub monitor_cache_ttl: Duration,
    /// Finished jobs older than this are pruned
    pub job_retention: Duration,
    pub docker_bin: String,
    pub legacy_compose_bin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 5000,
            db_path: "jobs.db".to_string(),
            service_root: None,
            config_dir: PathBuf::from("config"),
            compose_dir: PathBuf::from("compose"),
            monitor_url: None,
            monitor_api_key: None,
            monitor_cache_ttl: Duration::from_secs(15),
            job_retention: Duration::from_secs(604_800),
            docker_bin: "docker".to_string(),
            legacy_compose_bin: "docker-compose".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PORT`: HTTP port (default: 5000)
    /// - `JOBS_DB_PATH`: job database file path (default: "jobs.db")
    /// - `SERVICE_ROOT`: override directory for registry, images and compose files
    /// - `CONFIG_DIR`: directory holding services.json (default: "config")
    /// - `COMPOSE_DIR`: base for relative compose paths (default: "compose")
    /// - `UPTIME_KUMA_URL`, `UPTIME_KUMA_API_KEY`: optional monitor feed
    /// - `KUMA_CACHE_TTL`: monitor cache TTL in seconds (default: 15)
    /// - `JOB_RETENTION_SECS`: finished job retention (default: 7 days)
    /// - `DOCKER_BIN`, `DOCKER_COMPOSE_BIN`: orchestration binaries
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();

        if let Some(port) = get("PORT").and_then(|s| s.parse().ok()) {
            cfg.http_port = port;
        }
        if let Some(db_path) = get("JOBS_DB_PATH") {
            cfg.db_path = db_path;
        }
        if let Some(dir) = get("CONFIG_DIR") {
            cfg.config_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("COMPOSE_DIR") {
            cfg.compose_dir = PathBuf::from(dir);
        }
        if let Some(root) = get("SERVICE_ROOT") {
            let root = PathBuf::from(root);
            cfg.compose_dir = root.clone();
            cfg.service_root = Some(root);
        }

        cfg.monitor_url = get("UPTIME_KUMA_URL");
        cfg.monitor_api_key = get("UPTIME_KUMA_API_KEY");
        if let Some(ttl) = get("KUMA_CACHE_TTL").and_then(|s| s.parse().ok()) {
            cfg.monitor_cache_ttl = Duration::from_secs(ttl);
        }
        if let Some(secs) = get("JOB_RETENTION_SECS").and_then(|s| s.parse().ok()) {
            cfg.job_retention = Duration::from_secs(secs);
        }

        if let Some(bin) = get("DOCKER_BIN") {
            cfg.docker_bin = bin;
        }
        if let Some(bin) = get("DOCKER_COMPOSE_BIN") {
            cfg.legacy_compose_bin = bin;
        }

        cfg
    }

    /// Location of the primary service registry file.
    pub fn services_file(&self) -> PathBuf {
        match &self.service_root {
            Some(root) => root.join("services.json"),
            None => self.config_dir.join("services.json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn test_default_config() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.http_port, 5000);
        assert_eq!(cfg.db_path, "jobs.db");
        assert_eq!(cfg.monitor_cache_ttl, Duration::from_secs(15));
        assert_eq!(cfg.services_file(), PathBuf::from("config/services.json"));
    }

    #[test]
    fn test_service_root_overrides_compose_dir() {
        let cfg = from_pairs(&[("SERVICE_ROOT", "/srv/home"), ("COMPOSE_DIR", "/ignored")]);
        assert_eq!(cfg.compose_dir, PathBuf::from("/srv/home"));
        assert_eq!(cfg.services_file(), PathBuf::from("/srv/home/services.json"));
    }

    #[test]
    fn test_empty_and_invalid_values_keep_defaults() {
        let cfg = from_pairs(&[
            ("UPTIME_KUMA_URL", ""),
            ("KUMA_CACHE_TTL", "soon"),
            ("PORT", "70000"),
        ]);
        assert!(cfg.monitor_url.is_none());
        assert_eq!(cfg.monitor_cache_ttl, Duration::from_secs(15));
        assert_eq!(cfg.http_port, 5000);
    }

    #[test]
    fn test_monitor_settings() {
        let cfg = from_pairs(&[
            ("UPTIME_KUMA_URL", "http://kuma.lan:3001"),
            ("UPTIME_KUMA_API_KEY", "secret"),
            ("KUMA_CACHE_TTL", "60"),
        ]);
        assert_eq!(cfg.monitor_url.as_deref(), Some("http://kuma.lan:3001"));
        assert_eq!(cfg.monitor_api_key.as_deref(), Some("secret"));
        assert_eq!(cfg.monitor_cache_ttl, Duration::from_secs(60));
    }
}
