use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub bootstrap: Option<BootstrapConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
    #[serde(default = "default_accept_timeout_ms")]
    pub accept_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StorageConfig {
    /// Journal for user records; users are not durable without it
    pub wal_path: Option<PathBuf>,
}

/// Superuser seeded at startup when no account of that name exists
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    pub username: String,
    /// Hex-encoded credential digest
    pub digest: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_console")]
    pub console: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            console: default_console(),
        }
    }
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_num_threads() -> usize {
    num_cpus::get()
}

fn default_accept_timeout_ms() -> u64 {
    250
}

fn default_ttl_seconds() -> u64 {
    900 // 15 minutes
}

fn default_sweep_interval_seconds() -> u64 {
    300 // 5 minutes
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_console() -> bool {
    false
}

/// One year
pub const MAX_TTL_SECONDS: u64 = 365 * 24 * 60 * 60;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: [&str; 2] = ["json", "console"];

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        Self::from_str(&content)
    }

    /// Parse and validate configuration from TOML text
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("Server port must be greater than 0");
        }

        if self.server.num_threads == 0 {
            bail!("num_threads must be greater than 0");
        }

        if self.server.accept_timeout_ms == 0 {
            bail!("accept_timeout_ms must be greater than 0");
        }

        if self.sessions.ttl_seconds == 0 {
            bail!("Session ttl_seconds must be greater than 0");
        }

        if self.sessions.ttl_seconds > MAX_TTL_SECONDS {
            bail!("Session ttl_seconds must be at most {}", MAX_TTL_SECONDS);
        }

        if self.sessions.sweep_interval_seconds == 0 {
            bail!("sweep_interval_seconds must be greater than 0");
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            bail!(
                "Invalid log level '{}', expected one of: {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            );
        }

        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            bail!(
                "Invalid log format '{}', expected one of: {}",
                self.logging.format,
                LOG_FORMATS.join(", ")
            );
        }

        if let Some(bootstrap) = &self.bootstrap {
            if bootstrap.username.is_empty() {
                bail!("Bootstrap username must not be empty");
            }

            // Must fit behind a single length-prefix byte
            if bootstrap.username.len() > u8::MAX as usize {
                bail!("Bootstrap username must be at most 255 bytes");
            }

            bootstrap.digest_bytes()?;
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn accept_timeout(&self) -> Duration {
        Duration::from_millis(self.server.accept_timeout_ms)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.sessions.ttl_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sessions.sweep_interval_seconds)
    }
}

impl BootstrapConfig {
    pub fn digest_bytes(&self) -> Result<Vec<u8>> {
        let digest = hex::decode(&self.digest).context("Bootstrap digest must be valid hex")?;
        if digest.len() > u8::MAX as usize {
            bail!("Bootstrap digest must be at most 255 bytes");
        }
        Ok(digest)
    }
}
