//! Server configuration
//!
//! Loaded from a YAML or TOML file, then overlaid with `GIXAT_*` (and the
//! standard `AWS_*`) environment variables.
//!
//! ```yaml
//! port: 5000
//! database:
//!   url: sqlite://data/gixat.db
//! jwt:
//!   key: change-me-to-a-random-string-of-32-bytes
//! storage:
//!   backend: s3
//!   bucket: gixat-media
//!   region: me-south-1
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const MIN_JWT_KEY_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub jwt: JwtConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub virus_scan: VirusScanConfig,

    /// Base URL invite links point at
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,

    #[serde(default)]
    pub cors: CorsConfig,

    /// Send the auth cookie with `Secure`
    #[serde(default)]
    pub secure_cookies: bool,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    #[serde(default, skip_serializing)]
    pub key: String,

    #[serde(default = "default_issuer")]
    pub issuer: String,

    #[serde(default = "default_audience")]
    pub audience: String,

    #[serde(default = "default_expire_days")]
    pub expire_days: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    S3,
    /// Process-local map; everything is lost on restart
    #[default]
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    #[serde(default)]
    pub bucket: String,

    #[serde(default = "default_region")]
    pub region: String,

    /// Custom endpoint for MinIO and other S3-compatible services
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default, skip_serializing)]
    pub access_key_id: String,

    #[serde(default, skip_serializing)]
    pub secret_access_key: String,

    #[serde(default)]
    pub path_style: bool,

    #[serde(default = "default_storage_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirusScanConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_clamav_host")]
    pub host: String,

    #[serde(default = "default_clamav_port")]
    pub port: u16,

    #[serde(default = "default_clamav_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub log_sql_queries: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: DatabaseConfig::default(),
            jwt: JwtConfig::default(),
            storage: StorageConfig::default(),
            virus_scan: VirusScanConfig::default(),
            frontend_url: default_frontend_url(),
            cors: CorsConfig::default(),
            secure_cookies: false,
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            key: String::new(),
            issuer: default_issuer(),
            audience: default_audience(),
            expire_days: default_expire_days(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            bucket: String::new(),
            region: default_region(),
            endpoint: None,
            access_key_id: String::new(),
            secret_access_key: String::new(),
            path_style: false,
            timeout_secs: default_storage_timeout(),
        }
    }
}

impl Default for VirusScanConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_clamav_host(),
            port: default_clamav_port(),
            timeout_secs: default_clamav_timeout(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_sql_queries: false,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl ServerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.display().to_string(),
            source,
        })?;

        let config = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&contents)?
        } else {
            serde_yaml::from_str(&contents)?
        };

        Ok(config)
    }

    /// Overlay environment variables from the process
    pub fn merge_env(&mut self) {
        self.merge_vars(|name| std::env::var(name).ok());
    }

    /// Overlay variables from `lookup` (env vars take precedence over the file)
    pub fn merge_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("GIXAT_HOST") {
            self.host = val;
        }
        if let Some(port) = lookup("GIXAT_PORT").and_then(|v| v.parse::<u16>().ok()) {
            self.port = port;
        }

        if let Some(val) = lookup("GIXAT_DATABASE_URL") {
            self.database.url = val;
        }
        if let Some(max) = lookup("GIXAT_DATABASE_MAX_CONNECTIONS").and_then(|v| v.parse().ok()) {
            self.database.max_connections = max;
        }

        if let Some(val) = lookup("GIXAT_JWT_KEY") {
            self.jwt.key = val;
        }
        if let Some(val) = lookup("GIXAT_JWT_ISSUER") {
            self.jwt.issuer = val;
        }
        if let Some(val) = lookup("GIXAT_JWT_AUDIENCE") {
            self.jwt.audience = val;
        }
        if let Some(days) = lookup("GIXAT_JWT_EXPIRE_DAYS").and_then(|v| v.parse().ok()) {
            self.jwt.expire_days = days;
        }

        if let Some(val) = lookup("GIXAT_STORAGE_BACKEND") {
            match val.to_ascii_lowercase().as_str() {
                "s3" => self.storage.backend = StorageBackend::S3,
                "memory" => self.storage.backend = StorageBackend::Memory,
                _ => eprintln!("Warning: Invalid GIXAT_STORAGE_BACKEND '{}', ignoring", val),
            }
        }
        if let Some(val) = lookup("GIXAT_S3_BUCKET") {
            self.storage.bucket = val;
            // A bucket without an explicit backend means S3
            if lookup("GIXAT_STORAGE_BACKEND").is_none() {
                self.storage.backend = StorageBackend::S3;
            }
        }
        if let Some(val) = lookup("GIXAT_S3_ENDPOINT") {
            self.storage.endpoint = Some(val);
        }
        if let Some(enabled) = lookup("GIXAT_S3_PATH_STYLE").as_deref().and_then(parse_bool) {
            self.storage.path_style = enabled;
        }
        if let Some(val) = lookup("AWS_REGION").or_else(|| lookup("GIXAT_S3_REGION")) {
            self.storage.region = val;
        }
        if let Some(val) = lookup("AWS_ACCESS_KEY_ID") {
            self.storage.access_key_id = val;
        }
        if let Some(val) = lookup("AWS_SECRET_ACCESS_KEY") {
            self.storage.secret_access_key = val;
        }

        if let Some(enabled) = lookup("GIXAT_CLAMAV_ENABLED").as_deref().and_then(parse_bool) {
            self.virus_scan.enabled = enabled;
        }
        if let Some(val) = lookup("GIXAT_CLAMAV_HOST") {
            self.virus_scan.host = val;
        }
        if let Some(port) = lookup("GIXAT_CLAMAV_PORT").and_then(|v| v.parse().ok()) {
            self.virus_scan.port = port;
        }

        if let Some(val) = lookup("GIXAT_FRONTEND_URL") {
            self.frontend_url = val;
        }
        if let Some(val) = lookup("GIXAT_CORS_ORIGINS") {
            self.cors.allowed_origins = val
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(secure) = lookup("GIXAT_SECURE_COOKIES").as_deref().and_then(parse_bool) {
            self.secure_cookies = secure;
        }

        if let Some(val) = lookup("GIXAT_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Some(enabled) = lookup("GIXAT_LOG_SQL_QUERIES").as_deref().and_then(parse_bool) {
            self.logging.log_sql_queries = enabled;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must not be 0".to_string()));
        }
        if self.jwt.key.is_empty() {
            return Err(ConfigError::Invalid(
                "jwt.key is required (set GIXAT_JWT_KEY)".to_string(),
            ));
        }
        if self.jwt.key.len() < MIN_JWT_KEY_BYTES {
            return Err(ConfigError::Invalid(format!(
                "jwt.key must be at least {} bytes",
                MIN_JWT_KEY_BYTES
            )));
        }
        if self.jwt.expire_days <= 0 {
            return Err(ConfigError::Invalid(
                "jwt.expire_days must be positive".to_string(),
            ));
        }
        if self.storage.backend == StorageBackend::S3 && self.storage.bucket.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "storage.bucket is required for the s3 backend".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_database_url() -> String {
    "sqlite://data/gixat.db".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_issuer() -> String {
    "gixat".to_string()
}

fn default_audience() -> String {
    "gixat-app".to_string()
}

fn default_expire_days() -> i64 {
    7
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_storage_timeout() -> u64 {
    30
}

fn default_clamav_host() -> String {
    "localhost".to_string()
}

fn default_clamav_port() -> u16 {
    3310
}

fn default_clamav_timeout() -> u64 {
    30
}

fn default_frontend_url() -> String {
    "http://localhost:4200".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec![default_frontend_url()]
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const KEY: &str = "0123456789abcdef0123456789abcdef";

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 5000);
        assert_eq!(config.jwt.expire_days, 7);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.frontend_url, "http://localhost:4200");
        assert!(!config.virus_scan.enabled);
        assert!(!config.logging.log_sql_queries);
    }

    #[test]
    fn test_yaml_file_fills_missing_fields() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "port: 8080\njwt:\n  key: {}\nstorage:\n  backend: s3\n  bucket: media",
            KEY
        )
        .unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.jwt.key, KEY);
        assert_eq!(config.jwt.issuer, "gixat");
        assert_eq!(config.storage.backend, StorageBackend::S3);
        assert_eq!(config.storage.bucket, "media");
        assert_eq!(config.virus_scan.port, 3310);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "port = 9000\n[virus_scan]\nenabled = true\nhost = \"clamd\"\n[cors]\nallowed_origins = [\"https://app.gixat.com\"]"
        )
        .unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.port, 9000);
        assert!(config.virus_scan.enabled);
        assert_eq!(config.virus_scan.host, "clamd");
        assert_eq!(config.cors.allowed_origins, vec!["https://app.gixat.com"]);
    }

    #[test]
    fn test_missing_file_is_reported() {
        let err = ServerConfig::from_file("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = ServerConfig::default();
        config.merge_vars(vars(&[
            ("GIXAT_PORT", "7000"),
            ("GIXAT_JWT_KEY", KEY),
            ("GIXAT_S3_BUCKET", "uploads"),
            ("AWS_REGION", "eu-west-1"),
            ("AWS_ACCESS_KEY_ID", "AKIDEXAMPLE"),
            ("GIXAT_CLAMAV_ENABLED", "true"),
            ("GIXAT_CORS_ORIGINS", "https://a.test, https://b.test"),
            ("GIXAT_LOG_LEVEL", "debug"),
        ]));

        assert_eq!(config.port, 7000);
        assert_eq!(config.jwt.key, KEY);
        assert_eq!(config.storage.backend, StorageBackend::S3);
        assert_eq!(config.storage.bucket, "uploads");
        assert_eq!(config.storage.region, "eu-west-1");
        assert_eq!(config.storage.access_key_id, "AKIDEXAMPLE");
        assert!(config.virus_scan.enabled);
        assert_eq!(config.cors.allowed_origins, vec!["https://a.test", "https://b.test"]);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_invalid_env_values_are_ignored() {
        let mut config = ServerConfig::default();
        config.merge_vars(vars(&[("GIXAT_PORT", "not-a-port"), ("GIXAT_CLAMAV_ENABLED", "maybe")]));
        assert_eq!(config.port, 5000);
        assert!(!config.virus_scan.enabled);
    }

    #[test]
    fn test_validate() {
        let mut config = ServerConfig::default();
        assert!(config.validate().is_err());

        config.jwt.key = "short".to_string();
        assert!(config.validate().unwrap_err().to_string().contains("32 bytes"));

        config.jwt.key = KEY.to_string();
        assert!(config.validate().is_ok());

        config.storage.backend = StorageBackend::S3;
        assert!(config.validate().unwrap_err().to_string().contains("bucket"));
        config.storage.bucket = "media".to_string();
        assert!(config.validate().is_ok());

        config.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secrets_are_not_serialized() {
        let mut config = ServerConfig::default();
        config.jwt.key = KEY.to_string();
        config.storage.secret_access_key = "topsecret".to_string();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(!yaml.contains(KEY));
        assert!(!yaml.contains("topsecret"));
    }
}
