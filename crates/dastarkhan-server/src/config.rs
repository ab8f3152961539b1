use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use dastarkhan_cache::{CacheConfig, RedisConfig};
use dastarkhan_db_postgres::PostgresConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Redis configuration; disabled means store-only reads
    #[serde(default)]
    pub redis: RedisConfig,
    /// Cache TTLs and refresh-ahead tuning
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.shutdown_timeout_ms == 0 {
            return Err("server.shutdown_timeout_ms must be > 0".into());
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        if let Some(url) = self.storage.postgres_url.as_deref() {
            if url.is_empty() {
                return Err("storage.postgres_url must not be empty when set".into());
            }
            if self.storage.pool_size == 0 {
                return Err("storage.pool_size must be > 0".into());
            }
        }
        self.redis.validate()?;
        self.cache.validate()?;
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound on waiting for background cache refreshes at shutdown
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_shutdown_timeout_ms() -> u64 {
    10_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

/// Source store settings.
///
/// Without `postgres_url` the server runs on the in-memory store, which is
/// only useful for local development.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub idle_timeout_ms: Option<u64>,
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

fn default_pool_size() -> u32 {
    10
}
fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_run_migrations() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            postgres_url: None,
            pool_size: default_pool_size(),
            connect_timeout_ms: default_connect_timeout_ms(),
            idle_timeout_ms: None,
            run_migrations: default_run_migrations(),
        }
    }
}

impl StorageConfig {
    /// Postgres pool settings, if a database is configured.
    pub fn postgres(&self) -> Option<PostgresConfig> {
        let url = self.postgres_url.as_deref()?;
        Some(
            PostgresConfig::new(url)
                .with_pool_size(self.pool_size)
                .with_connect_timeout_ms(self.connect_timeout_ms)
                .with_idle_timeout_ms(self.idle_timeout_ms)
                .with_run_migrations(self.run_migrations),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_FILE: &str = "dastarkhan.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        let mut builder = Config::builder();
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., DASTARKHAN__REDIS__URL=redis://cache:6379
        builder = builder.add_source(
            Environment::with_prefix("DASTARKHAN")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
