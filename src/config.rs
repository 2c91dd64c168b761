use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

pub const APP_DIR: &str = "jornada-admin";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the admin REST API
    pub api_url: String,

    /// Where the bearer token is persisted between runs
    pub token_file: PathBuf,

    /// Transport timeout; unset keeps the HTTP client default
    pub request_timeout_seconds: Option<u64>,

    /// Delay before the registry refresh that follows a manual trigger
    pub refresh_delay_ms: u64,

    /// Lifetime of the notification carrying the pre-restore backup id
    pub pre_restore_notice_seconds: u64,

    /// Destination for downloaded backups
    pub download_dir: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080".to_string(),
            token_file: app_config_dir().join("token"),
            request_timeout_seconds: None,
            refresh_delay_ms: 2000,
            pre_restore_notice_seconds: 5,
            download_dir: PathBuf::from("."),
            log_level: "info".to_string(),
        }
    }
}

/// `<config_dir>/jornada-admin`, or `./jornada-admin` without a config dir
pub fn app_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

pub fn default_config_file() -> PathBuf {
    app_config_dir().join("config.toml")
}

impl Config {
    /// Load `.env`, then the optional TOML file, then environment overrides.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok(); // Load .env file if present

        let config_file = env::var("JORNADA_CONFIG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_config_file());

        let mut config = if config_file.exists() {
            Self::from_file(&config_file)?
        } else {
            debug!("No config file at {}", config_file.display());
            Config::default()
        };

        config.apply_env()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        info!("📄 Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = env::var("JORNADA_API_URL") {
            self.api_url = url;
        }

        if let Ok(path) = env::var("JORNADA_TOKEN_FILE") {
            self.token_file = PathBuf::from(path);
        }

        if let Ok(timeout) = env::var("REQUEST_TIMEOUT_SECONDS") {
            self.request_timeout_seconds = Some(
                timeout
                    .parse()
                    .map_err(|e| anyhow::anyhow!("Invalid REQUEST_TIMEOUT_SECONDS: {}", e))?,
            );
        }

        if let Ok(delay) = env::var("REFRESH_DELAY_MS") {
            self.refresh_delay_ms = delay
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid REFRESH_DELAY_MS: {}", e))?;
        }

        if let Ok(seconds) = env::var("PRE_RESTORE_NOTICE_SECONDS") {
            self.pre_restore_notice_seconds = seconds
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid PRE_RESTORE_NOTICE_SECONDS: {}", e))?;
        }

        if let Ok(dir) = env::var("DOWNLOAD_DIR") {
            self.download_dir = PathBuf::from(dir);
        }

        if let Ok(level) = env::var("LOG_LEVEL") {
            self.log_level = level;
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.api_url.trim().is_empty() {
            return Err(anyhow::anyhow!("API URL is required"));
        }

        let url = Url::parse(&self.api_url)
            .map_err(|e| anyhow::anyhow!("Invalid API URL '{}': {}", self.api_url, e))?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow::anyhow!(
                    "Invalid API URL scheme: {}. Must be 'http' or 'https'",
                    other
                ));
            }
        }

        if self.refresh_delay_ms == 0 {
            return Err(anyhow::anyhow!("Refresh delay must be greater than 0"));
        }

        if self.request_timeout_seconds == Some(0) {
            return Err(anyhow::anyhow!("Request timeout must be greater than 0"));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_seconds.map(Duration::from_secs)
    }

    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_delay_ms)
    }

    pub fn pre_restore_notice(&self) -> Duration {
        Duration::from_secs(self.pre_restore_notice_seconds)
    }

    /// Create a diagnostic report for troubleshooting. The token itself is
    /// never printed.
    pub fn create_diagnostic_report(&self) -> String {
        let mut report = String::new();
        report.push_str("=== Jornada Admin - Configuration Report ===\n\n");

        report.push_str("API Configuration:\n");
        report.push_str(&format!("  URL: {}\n", self.api_url));
        report.push_str(&format!(
            "  Timeout: {}\n",
            self.request_timeout_seconds
                .map(|s| format!("{s}s"))
                .unwrap_or_else(|| "transport default".to_string())
        ));

        report.push_str("\nSession:\n");
        report.push_str(&format!("  Token file: {}\n", self.token_file.display()));
        let token_present = std::fs::read_to_string(&self.token_file)
            .map(|t| !t.trim().is_empty())
            .unwrap_or(false);
        report.push_str(&format!(
            "  Token: {}\n",
            if token_present {
                "***configured***"
            } else {
                "Not set"
            }
        ));

        report.push_str("\nBackup Operations:\n");
        report.push_str(&format!(
            "  Refresh after trigger: {}ms\n",
            self.refresh_delay_ms
        ));
        report.push_str(&format!(
            "  Pre-restore notice: {}s\n",
            self.pre_restore_notice_seconds
        ));
        report.push_str(&format!(
            "  Download directory: {}\n",
            self.download_dir.display()
        ));
        report.push_str(&format!("  Log level: {}\n", self.log_level));

        report.push_str("\nValidation Results:\n");
        match self.validate() {
            Ok(_) => report.push_str("  ✅ All configuration checks passed\n"),
            Err(e) => report.push_str(&format!("  ❌ Configuration error: {e}\n")),
        }

        report.push_str("\n=== End Configuration Report ===\n");
        report
    }
}

const SAMPLE_ENV: &str = r#"# Jornada Admin Configuration

# API
JORNADA_API_URL=http://localhost:8080
# JORNADA_TOKEN_FILE=~/.config/jornada-admin/token
# REQUEST_TIMEOUT_SECONDS=30

# Backup operations
REFRESH_DELAY_MS=2000
PRE_RESTORE_NOTICE_SECONDS=5
DOWNLOAD_DIR=.

# Logging
LOG_LEVEL=info
"#;

/// Write `.env.example` into `dir`.
pub fn create_sample_env_file(dir: &Path) -> Result<PathBuf> {
    let path = dir.join(".env.example");
    std::fs::write(&path, SAMPLE_ENV).context("Failed to create .env.example file")?;

    info!("📋 Created {} with default configuration", path.display());
    info!("   Copy this to .env and modify as needed");

    Ok(path)
}
