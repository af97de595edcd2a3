//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `dashboard.toml`.
//!     loads configuration from file or falls back to defaults, then applies
//!     environment overrides (MONGO_URI, PORT, ...) on top.
//!
//! structure:
//!     - ServerConfig: bind address, port and the static frontend directory.
//!     - DatabaseConfig: store backend and mongodb connection string.
//!     - SeedConfig: whether to bootstrap an empty store at startup.
//!     - LoggingConfig: default tracing filter.
//!     - FrontendConfig: values injected into the dashboard via /env.js.
//!
//! ==============================================================================

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "DASHBOARD_CONFIG";

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct DashboardConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub seed: SeedConfig,
    pub logging: LoggingConfig,
    pub frontend: FrontendConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Mongo,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    pub uri: String,
    /// unset keeps the driver default
    pub server_selection_timeout_seconds: Option<u64>,
    /// upper bound on the /api/health database ping
    pub ping_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SeedConfig {
    pub bootstrap: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

/// serialized verbatim into `window.DASHBOARD_CONFIG`
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct FrontendConfig {
    /// null means same-origin `/api`
    #[serde(rename(serialize = "apiBaseUrl"))]
    pub api_base_url: Option<String>,
    /// "local" or "production"; null lets the dashboard decide from its own host
    pub environment: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 2002,
            static_dir: PathBuf::from("static"),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Mongo,
            uri: "mongodb://localhost:27017/analytics".to_string(),
            server_selection_timeout_seconds: None,
            ping_timeout_seconds: 5,
        }
    }
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self { bootstrap: true }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self { api_base_url: None, environment: None }
    }
}

impl DashboardConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;

        let config: DashboardConfig =
            toml::from_str(&content).context("Failed to parse config")?;

        Ok(config)
    }

    /// Load with default fallback, then apply environment overrides
    pub fn load_or_default() -> anyhow::Result<Self> {
        let mut config = Self::load_file_or_default()?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn load_file_or_default() -> anyhow::Result<Self> {
        // an explicit path must exist; the search paths are best effort
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let config = Self::load(&path)?;
            println!("[CONFIG] Loaded from {}", path);
            return Ok(config);
        }

        let paths = [
            PathBuf::from("config").join("dashboard.toml"),
            PathBuf::from("..").join("config").join("dashboard.toml"),
        ];

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        println!("[CONFIG] Loaded from {}", path.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        println!("[CONFIG] Warning: Failed to load {}: {:#}", path.display(), e);
                    }
                }
            }
        }

        println!("[CONFIG] Warning: No config file found - using defaults");
        Ok(Self::default())
    }

    /// overlay environment variables; `lookup` is injected so tests stay hermetic
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(uri) = lookup("MONGO_URI") {
            self.database.uri = uri;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| anyhow!("PORT must be a number between 0 and 65535, got {:?}", port))?;
        }
        if let Some(backend) = lookup("DATABASE_BACKEND") {
            self.database.backend = match backend.to_ascii_lowercase().as_str() {
                "mongo" | "mongodb" => StoreBackend::Mongo,
                "memory" => StoreBackend::Memory,
                other => return Err(anyhow!("unknown DATABASE_BACKEND {:?} (expected mongo or memory)", other)),
            };
        }
        if let Some(dir) = lookup("STATIC_DIR") {
            self.server.static_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup("API_BASE_URL") {
            self.frontend.api_base_url = Some(url).filter(|u| !u.is_empty());
        }
        if let Some(env) = lookup("DASHBOARD_ENV") {
            self.frontend.environment = Some(env).filter(|e| !e.is_empty());
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        let backend = match self.database.backend {
            StoreBackend::Mongo => "mongodb",
            StoreBackend::Memory => "memory",
        };
        println!("┌─────────────────────────────────────────┐");
        println!("│         DASHBOARD CONFIGURATION         │");
        println!("├─────────────────────────────────────────┤");
        println!("│ Listen: {}", self.bind_address());
        println!("│ Store: {}", backend);
        println!("│ Static Dir: {}", self.server.static_dir.display());
        println!("│ Bootstrap Seed: {}", self.seed.bootstrap);
        println!("│ Environment: {}", self.frontend.environment.as_deref().unwrap_or("auto"));
        println!("│ Log Level: {}", self.logging.level);
        println!("└─────────────────────────────────────────┘");
    }
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = DashboardConfig::default();
        assert_eq!(config.server.port, 2002);
        assert_eq!(config.database.uri, "mongodb://localhost:27017/analytics");
        assert_eq!(config.database.backend, StoreBackend::Mongo);
        assert!(config.seed.bootstrap);
    }

    #[test]
    fn test_partial_toml() {
        let config: DashboardConfig = toml::from_str(
            r#"
            [server]
            port = 8080

            [database]
            backend = "memory"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.database.backend, StoreBackend::Memory);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = DashboardConfig::default();
        config
            .apply_env(env(&[
                ("MONGO_URI", "mongodb://db:27017/metrics"),
                ("PORT", "3000"),
                ("DASHBOARD_ENV", "production"),
                ("API_BASE_URL", ""),
            ]))
            .unwrap();
        assert_eq!(config.database.uri, "mongodb://db:27017/metrics");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.frontend.environment.as_deref(), Some("production"));
        assert_eq!(config.frontend.api_base_url, None);
    }

    #[test]
    fn test_bad_port_is_an_error() {
        let mut config = DashboardConfig::default();
        assert!(config.apply_env(env(&[("PORT", "http")])).is_err());
        assert!(config.apply_env(env(&[("DATABASE_BACKEND", "sqlite")])).is_err());
    }

    #[test]
    fn test_frontend_config_json() {
        let json = serde_json::to_value(FrontendConfig::default()).unwrap();
        assert_eq!(json, serde_json::json!({"apiBaseUrl": null, "environment": null}));
    }

    #[test]
    fn test_environment_is_unset_unless_configured() {
        let mut config = DashboardConfig::default();
        config.apply_env(env(&[("DASHBOARD_ENV", "")])).unwrap();
        assert_eq!(config.frontend.environment, None);

        let config: DashboardConfig = toml::from_str("[frontend]\nenvironment = \"local\"\n").unwrap();
        assert_eq!(config.frontend.environment.as_deref(), Some("local"));
    }

    #[test]
    fn test_database_timeouts() {
        let config = DashboardConfig::default();
        assert_eq!(config.database.server_selection_timeout_seconds, None);
        assert_eq!(config.database.ping_timeout_seconds, 5);

        let config: DashboardConfig =
            toml::from_str("[database]\nserver_selection_timeout_seconds = 10\n").unwrap();
        assert_eq!(config.database.server_selection_timeout_seconds, Some(10));
    }
}
