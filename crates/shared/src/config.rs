//! Application configuration management.

use std::path::PathBuf;

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Object storage configuration.
    pub storage: StorageSettings,
    /// User upload configuration.
    #[serde(default)]
    pub uploads: UploadSettings,
}

/// Object storage backend selection.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendSettings {
    /// S3-compatible store.
    S3 {
        /// Region of the bucket.
        #[serde(default = "default_region")]
        region: String,
        /// Custom endpoint (MinIO, R2). AWS is used when absent.
        #[serde(default)]
        endpoint: Option<String>,
    },
    /// Local filesystem (development only).
    LocalFs {
        /// Root directory.
        root: PathBuf,
    },
    /// In-process memory store.
    Memory,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self::S3 {
            region: default_region(),
            endpoint: None,
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Object storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Backend service.
    #[serde(default)]
    pub backend: BackendSettings,
    /// Access key ID.
    #[serde(default)]
    pub access_key_id: String,
    /// Secret access key.
    #[serde(default)]
    pub secret_access_key: String,
    /// Bucket name.
    #[serde(default)]
    pub bucket: String,
    /// Storage class for new objects.
    #[serde(default = "default_storage_class")]
    pub storage_class: String,
    /// Access-control policy label.
    #[serde(default = "default_acl")]
    pub acl: String,
    /// Cache-Control header stored with new objects.
    #[serde(default = "default_cache_control")]
    pub cache_control: String,
    /// Content type used when none can be guessed from the key.
    #[serde(default = "default_content_type")]
    pub default_content_type: String,
    /// Signed URL lifetime in seconds. Zero means public, non-expiring URLs.
    #[serde(default = "default_url_expiration")]
    pub url_expiration_secs: u64,
    /// Downloads larger than this are spooled to disk.
    #[serde(default = "default_spool_threshold")]
    pub spool_threshold_bytes: u64,
    /// Directory for spool files. System temp dir when absent.
    #[serde(default)]
    pub spool_dir: Option<PathBuf>,
    /// Base of public URLs. Derived from the bucket when absent.
    #[serde(default)]
    pub public_base_url: Option<String>,
}

fn default_storage_class() -> String {
    "STANDARD".to_string()
}

fn default_acl() -> String {
    "private".to_string()
}

fn default_cache_control() -> String {
    "max-age=31536000, public".to_string()
}

fn default_content_type() -> String {
    "application/octet-stream".to_string()
}

fn default_url_expiration() -> u64 {
    86_400 // 1 day
}

fn default_spool_threshold() -> u64 {
    10 * 1024 * 1024
}

/// User upload configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadSettings {
    /// Signed URL lifetime for user uploads in seconds.
    #[serde(default = "default_upload_url_expiration")]
    pub url_expiration_secs: u64,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            url_expiration_secs: default_upload_url_expiration(),
        }
    }
}

fn default_upload_url_expiration() -> u64 {
    21_600 // 6 hours
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("PORTAL").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_applies_defaults() {
        temp_env::with_vars(
            [
                ("PORTAL__STORAGE__BUCKET", Some("portal-uploads")),
                ("PORTAL__STORAGE__ACCESS_KEY_ID", Some("AKIDEXAMPLE")),
                ("PORTAL__STORAGE__SECRET_ACCESS_KEY", Some("secret")),
            ],
            || {
                let config = AppConfig::load().expect("config should load");
                let storage = config.storage;
                assert_eq!(storage.bucket, "portal-uploads");
                assert_eq!(storage.storage_class, "STANDARD");
                assert_eq!(storage.acl, "private");
                assert_eq!(storage.cache_control, "max-age=31536000, public");
                assert_eq!(storage.default_content_type, "application/octet-stream");
                assert_eq!(storage.url_expiration_secs, 86_400);
                assert_eq!(storage.spool_threshold_bytes, 10 * 1024 * 1024);
                assert_eq!(storage.backend, BackendSettings::default());
                assert_eq!(config.uploads.url_expiration_secs, 21_600);
            },
        );
    }

    #[test]
    fn test_load_overrides_from_env() {
        temp_env::with_vars(
            [
                ("PORTAL__STORAGE__BUCKET", Some("portal-uploads")),
                ("PORTAL__STORAGE__URL_EXPIRATION_SECS", Some("0")),
                ("PORTAL__STORAGE__SPOOL_THRESHOLD_BYTES", Some("1024")),
                ("PORTAL__STORAGE__BACKEND__TYPE", Some("memory")),
            ],
            || {
                let config = AppConfig::load().expect("config should load");
                assert_eq!(config.storage.url_expiration_secs, 0);
                assert_eq!(config.storage.spool_threshold_bytes, 1024);
                assert_eq!(config.storage.backend, BackendSettings::Memory);
            },
        );
    }
}
