use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub jwt: JwtConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Take the source address from the first X-Forwarded-For entry
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    #[serde(default = "default_jwt_secret")]
    pub secret: String,
    #[serde(default = "default_access_token_expire")]
    pub access_token_expire_minutes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_local_path")]
    pub local_path: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilesConfig {
    #[serde(default = "default_ttl_hours")]
    pub default_ttl_hours: u32,
    #[serde(default = "default_max_ttl_hours")]
    pub max_ttl_hours: u32,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

/// Per-route request ceilings sharing one window length
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_auth_max")]
    pub auth_max: u32,
    #[serde(default = "default_upload_max")]
    pub upload_max: u32,
    #[serde(default = "default_download_max")]
    pub download_max: u32,
}

/// Upper bound for `files.max_ttl_hours` (ten years)
pub const TTL_HOURS_CEILING: u32 = 24 * 365 * 10;

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_db_path() -> String {
    "data/sealdrop.db".to_string()
}

fn default_jwt_secret() -> String {
    "change-me-sealdrop-secret".to_string()
}

fn default_access_token_expire() -> u64 {
    60 * 24 // one day
}

fn default_local_path() -> String {
    "data/blobs".to_string()
}

fn default_max_upload_bytes() -> usize {
    100 * 1024 * 1024
}

fn default_ttl_hours() -> u32 {
    24
}

fn default_max_ttl_hours() -> u32 {
    24 * 7
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_window_secs() -> u64 {
    15 * 60
}

fn default_auth_max() -> u32 {
    5
}

fn default_upload_max() -> u32 {
    50
}

fn default_download_max() -> u32 {
    100
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            trust_forwarded_for: false,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: default_jwt_secret(),
            access_token_expire_minutes: default_access_token_expire(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            local_path: default_local_path(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            default_ttl_hours: default_ttl_hours(),
            max_ttl_hours: default_max_ttl_hours(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            auth_max: default_auth_max(),
            upload_max: default_upload_max(),
            download_max: default_download_max(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides();
        config.validate()?;
        config.ensure_directories()?;
        config.ensure_jwt_secret()?;
        tracing::info!(
            "Limits: window={}s auth={} upload={} download={}, ttl default={}h max={}h",
            config.rate_limit.window_secs,
            config.rate_limit.auth_max,
            config.rate_limit.upload_max,
            config.rate_limit.download_max,
            config.files.default_ttl_hours,
            config.files.max_ttl_hours
        );
        Ok(config)
    }

    /// Ensure JWT secret is not the built-in default; generate and persist one if it is
    fn ensure_jwt_secret(&mut self) -> anyhow::Result<()> {
        if self.jwt.secret == default_jwt_secret() || self.jwt.secret.is_empty() {
            let secret_path = Path::new(&self.database.path)
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(".jwt_secret");

            if secret_path.exists() {
                let secret = fs::read_to_string(&secret_path)?;
                self.jwt.secret = secret.trim().to_string();
                tracing::info!("Loaded persisted JWT secret from {:?}", secret_path);
            } else {
                let secret = format!("{}{}", uuid::Uuid::new_v4(), uuid::Uuid::new_v4());
                fs::write(&secret_path, &secret)?;
                self.jwt.secret = secret;
                tracing::info!("Generated and persisted new JWT secret to {:?}", secret_path);
            }
        }
        Ok(())
    }

    /// Load configuration from config.toml
    fn load_from_file() -> anyhow::Result<Self> {
        let config_paths = ["config.toml", "data/config.toml"];

        for path in config_paths {
            if Path::new(path).exists() {
                let content = fs::read_to_string(path)?;
                let config: Config = toml::from_str(&content)?;
                tracing::info!("Loaded configuration from {}", path);
                return Ok(config);
            }
        }

        tracing::info!("No configuration file found, using defaults");
        Ok(Config::default())
    }

    /// Apply environment variable overrides
    /// Format: SD_CONF_<SECTION>_<KEY>
    fn apply_env_overrides(&mut self) {
        fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
            env::var(key).ok().and_then(|v| v.trim().parse().ok())
        }

        // Server overrides
        if let Ok(val) = env::var("SD_CONF_SERVER_HOST") {
            self.server.host = val;
        }
        if let Some(port) = parsed("SD_CONF_SERVER_PORT") {
            self.server.port = port;
        }
        if let Some(v) = parsed("SD_CONF_SERVER_TRUST_FORWARDED_FOR") {
            self.server.trust_forwarded_for = v;
        }

        // Database overrides
        if let Ok(val) = env::var("SD_CONF_DATABASE_PATH") {
            self.database.path = val;
        }

        // JWT overrides
        if let Ok(val) = env::var("SD_CONF_JWT_SECRET") {
            self.jwt.secret = val;
        }
        if let Some(minutes) = parsed("SD_CONF_JWT_ACCESS_EXPIRE") {
            self.jwt.access_token_expire_minutes = minutes;
        }

        // Storage overrides
        if let Ok(val) = env::var("SD_CONF_STORAGE_LOCAL_PATH") {
            self.storage.local_path = val;
        }
        if let Some(bytes) = parsed("SD_CONF_STORAGE_MAX_UPLOAD_BYTES") {
            self.storage.max_upload_bytes = bytes;
        }

        // File lifecycle overrides
        if let Some(hours) = parsed("SD_CONF_FILES_DEFAULT_TTL_HOURS") {
            self.files.default_ttl_hours = hours;
        }
        if let Some(hours) = parsed("SD_CONF_FILES_MAX_TTL_HOURS") {
            self.files.max_ttl_hours = hours;
        }
        if let Some(secs) = parsed("SD_CONF_FILES_SWEEP_INTERVAL_SECS") {
            self.files.sweep_interval_secs = secs;
        }

        // Rate limit overrides
        if let Some(secs) = parsed("SD_CONF_RATE_LIMIT_WINDOW_SECS") {
            self.rate_limit.window_secs = secs;
        }
        if let Some(max) = parsed("SD_CONF_RATE_LIMIT_AUTH_MAX") {
            self.rate_limit.auth_max = max;
        }
        if let Some(max) = parsed("SD_CONF_RATE_LIMIT_UPLOAD_MAX") {
            self.rate_limit.upload_max = max;
        }
        if let Some(max) = parsed("SD_CONF_RATE_LIMIT_DOWNLOAD_MAX") {
            self.rate_limit.download_max = max;
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.files.default_ttl_hours > self.files.max_ttl_hours {
            anyhow::bail!(
                "files.default_ttl_hours ({}) exceeds files.max_ttl_hours ({})",
                self.files.default_ttl_hours,
                self.files.max_ttl_hours
            );
        }
        if self.files.max_ttl_hours > TTL_HOURS_CEILING {
            anyhow::bail!(
                "files.max_ttl_hours ({}) exceeds the ceiling of {}",
                self.files.max_ttl_hours,
                TTL_HOURS_CEILING
            );
        }
        if self.rate_limit.window_secs == 0 {
            anyhow::bail!("rate_limit.window_secs must be positive");
        }
        if self.files.sweep_interval_secs == 0 {
            anyhow::bail!("files.sweep_interval_secs must be positive");
        }
        Ok(())
    }

    /// Ensure required directories exist
    fn ensure_directories(&self) -> anyhow::Result<()> {
        if let Some(parent) = Path::new(&self.database.path).parent() {
            fs::create_dir_all(parent)?;
        }

        fs::create_dir_all(&self.storage.local_path)?;

        Ok(())
    }
}
