//! User upload service implementation.

use std::sync::Arc;

use portal_shared::AppConfig;
use tracing::info;
use uuid::Uuid;

use crate::storage::{
    MaterializedObject, StorageClient, StorageClientConfig, StorageError, StorageOp, UploadBody,
    UploadOptions,
};

/// Storage for files uploaded by users.
#[derive(Debug, Clone)]
pub struct UserUploads {
    storage: Arc<StorageClient>,
}

impl UserUploads {
    /// Default signed URL lifetime for user files: 6 hours.
    pub const DEFAULT_URL_EXPIRATION_SECS: u64 = 60 * 60 * 6;

    /// Wrap an existing client.
    #[must_use]
    pub fn new(storage: Arc<StorageClient>) -> Self {
        Self { storage }
    }

    /// Build a dedicated client whose URLs expire after `url_expiration_secs`.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be created.
    pub fn from_config(
        config: StorageClientConfig,
        url_expiration_secs: u64,
    ) -> Result<Self, StorageError> {
        let client = StorageClient::new(config.with_url_expiration_secs(url_expiration_secs))?;
        Ok(Self::new(Arc::new(client)))
    }

    /// Build from application config: `storage` for the bucket and
    /// `uploads.url_expiration_secs` for link lifetime.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be created.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, StorageError> {
        Self::from_config(
            StorageClientConfig::from(&config.storage),
            config.uploads.url_expiration_secs,
        )
    }

    /// Generate a fresh storage key for a user file.
    ///
    /// Format: `users/{user_id}/{random_hex}.{ext}`
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] if the extension is empty or not
    /// alphanumeric.
    pub fn user_key(user_id: i64, ext: &str) -> Result<String, StorageError> {
        let ext = normalize_ext(ext)?;
        Ok(format!("users/{user_id}/{}.{ext}", Uuid::new_v4().simple()))
    }

    /// Upload a user file and return its key.
    pub async fn store(
        &self,
        user_id: i64,
        ext: &str,
        body: impl Into<UploadBody>,
    ) -> Result<String, StorageError> {
        let key = Self::user_key(user_id, ext)?;
        let options = UploadOptions::default().metadata("user-id", user_id.to_string());
        self.storage.upload(&key, body, options).await?;

        info!(user_id, key = %key, "stored user upload");
        Ok(key)
    }

    /// Link to a stored file.
    pub async fn url(&self, key: &str) -> Result<String, StorageError> {
        self.storage.url(key).await
    }

    /// Link that downloads the file as `{filename}.{ext}`.
    pub async fn download_url(
        &self,
        key: &str,
        filename: &str,
        ext: &str,
    ) -> Result<String, StorageError> {
        self.storage.friendly_url(key, filename, &normalize_ext(ext)?).await
    }

    /// Fetch a stored file as a local, seekable copy.
    pub async fn open(&self, key: &str) -> Result<MaterializedObject, StorageError> {
        let object = self.storage.download(key, true).await?;
        object.into_materialized().ok_or_else(|| {
            StorageError::operation(StorageOp::Download, key, "expected a local copy")
        })
    }

    /// Delete a stored file. Missing files are ignored.
    pub async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.storage.delete(key).await
    }

    /// The underlying storage client.
    #[must_use]
    pub fn storage(&self) -> &Arc<StorageClient> {
        &self.storage
    }
}

/// Strip a leading dot, lower-case, and require ASCII alphanumerics.
fn normalize_ext(ext: &str) -> Result<String, StorageError> {
    let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
    if ext.is_empty() {
        return Err(StorageError::invalid_key("file extension is empty"));
    }
    if !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(StorageError::invalid_key(format!(
            "file extension '{ext}' must be alphanumeric"
        )));
    }
    Ok(ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Credentials, SpoolBacking, StorageBackend};
    use portal_shared::{BackendSettings, StorageSettings, UploadSettings};
    use rstest::rstest;
    use std::time::Duration;

    fn app_config(uploads: UploadSettings) -> AppConfig {
        AppConfig {
            storage: StorageSettings {
                backend: BackendSettings::Memory,
                access_key_id: "key".to_string(),
                secret_access_key: "secret".to_string(),
                bucket: "portal-uploads".to_string(),
                storage_class: "STANDARD".to_string(),
                acl: "private".to_string(),
                cache_control: "max-age=31536000, public".to_string(),
                default_content_type: "application/octet-stream".to_string(),
                url_expiration_secs: 86_400,
                spool_threshold_bytes: 1024,
                spool_dir: None,
                public_base_url: None,
            },
            uploads,
        }
    }

    fn uploads(expiration_secs: u64) -> UserUploads {
        let config = StorageClientConfig::new(
            StorageBackend::Memory,
            Credentials::new("key", "secret"),
            "portal-uploads",
        );
        UserUploads::from_config(config, expiration_secs).expect("should create uploads")
    }

    #[test]
    fn test_user_key_format() {
        let key = UserUploads::user_key(42, "PNG").expect("key");
        let parts: Vec<&str> = key.split('/').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "users");
        assert_eq!(parts[1], "42");
        let (name, ext) = parts[2].split_once('.').expect("extension");
        assert_eq!(name.len(), 32);
        assert!(name.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(ext, "png");
    }

    #[test]
    fn test_user_keys_are_unique() {
        let a = UserUploads::user_key(1, "jpg").expect("key");
        let b = UserUploads::user_key(1, "jpg").expect("key");
        assert_ne!(a, b);
    }

    #[rstest]
    #[case(".png", "png")]
    #[case("JPEG", "jpeg")]
    #[case(" webp ", "webp")]
    fn test_normalize_ext(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_ext(input).expect("valid"), expected);
    }

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("tar.gz")]
    #[case("p/ng")]
    fn test_normalize_ext_rejects(#[case] input: &str) {
        let err = normalize_ext(input).unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }

    #[test]
    fn test_from_config_sets_expiration() {
        let uploads = uploads(UserUploads::DEFAULT_URL_EXPIRATION_SECS);
        assert_eq!(
            uploads.storage().config().url_expiration,
            Some(Duration::from_secs(21_600))
        );
    }

    #[test]
    fn test_from_app_config_uses_upload_expiration() {
        let uploads = UserUploads::from_app_config(&app_config(UploadSettings::default()))
            .expect("should create uploads");
        let config = uploads.storage().config();
        assert_eq!(config.url_expiration, Some(Duration::from_secs(21_600)));
        assert_eq!(config.spool_threshold, 1024);
        assert_eq!(config.bucket, "portal-uploads");

        let unsigned = UserUploads::from_app_config(&app_config(UploadSettings {
            url_expiration_secs: 0,
        }))
        .expect("should create uploads");
        assert_eq!(unsigned.storage().config().url_expiration, None);
    }

    #[tokio::test]
    async fn test_store_open_remove() {
        let uploads = uploads(0);
        let key = uploads
            .store(7, "txt", b"profile".as_slice())
            .await
            .expect("store");
        assert!(key.starts_with("users/7/"));

        let mut local = uploads.open(&key).await.expect("open");
        assert_eq!(local.backing(), Some(SpoolBacking::Memory));
        assert_eq!(local.read_all().await.expect("read"), b"profile");
        local.close().await.expect("close");

        uploads.remove(&key).await.expect("remove");
        assert!(uploads.open(&key).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_public_url_when_unsigned() {
        let uploads = uploads(0);
        let url = uploads.url("users/7/abc.png").await.expect("url");
        assert_eq!(url, "https://portal-uploads.s3.amazonaws.com/users/7/abc.png");
    }

    #[tokio::test]
    async fn test_download_url_requires_signing() {
        let uploads = uploads(0);
        let err = uploads
            .download_url("users/7/abc.png", "avatar", "png")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedConfiguration(_)));
    }
}
