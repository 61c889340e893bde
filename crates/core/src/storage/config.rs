//! Storage client configuration types.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use portal_shared::{BackendSettings, StorageSettings};

/// Object store access credentials.
#[derive(Clone, Default)]
pub struct Credentials {
    /// Access key ID.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
}

impl Credentials {
    /// Create credentials from a key pair.
    #[must_use]
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }

    /// Both halves of the key pair are present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.access_key_id.trim().is_empty() && !self.secret_access_key.trim().is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .finish()
    }
}

/// Backing service behind the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// S3-compatible storage: AWS S3, Cloudflare R2, MinIO.
    S3 {
        /// Bucket region.
        region: String,
        /// Custom endpoint URL. AWS when `None`.
        endpoint: Option<String>,
    },
    /// Local filesystem (development only).
    LocalFs {
        /// Root directory path.
        root: PathBuf,
    },
    /// In-process memory store.
    Memory,
}

impl StorageBackend {
    /// S3 backend on AWS in `region`.
    #[must_use]
    pub fn s3(region: impl Into<String>) -> Self {
        Self::S3 {
            region: region.into(),
            endpoint: None,
        }
    }

    /// Backend name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::S3 { .. } => "s3",
            Self::LocalFs { .. } => "local",
            Self::Memory => "memory",
        }
    }
}

/// Immutable storage client configuration.
#[derive(Debug, Clone)]
pub struct StorageClientConfig {
    /// Backing service.
    pub backend: StorageBackend,
    /// Access credentials.
    pub credentials: Credentials,
    /// Bucket name.
    pub bucket: String,
    /// Storage class for new objects.
    pub storage_class: String,
    /// Access-control policy label.
    pub acl: String,
    /// Cache-Control header stored with new objects.
    pub cache_control: String,
    /// Fallback content type.
    pub default_content_type: String,
    /// Signed URL lifetime. `None` means public, non-expiring URLs.
    pub url_expiration: Option<Duration>,
    /// Downloads larger than this many bytes spool to disk.
    pub spool_threshold: u64,
    /// Directory for spool files. System temp dir when `None`.
    pub spool_dir: Option<PathBuf>,
    /// Base for public URLs. `https://{bucket}.s3.amazonaws.com` when `None`.
    pub public_base_url: Option<String>,
}

impl StorageClientConfig {
    /// Default storage class.
    pub const DEFAULT_STORAGE_CLASS: &'static str = "STANDARD";
    /// Default access-control policy.
    pub const DEFAULT_ACL: &'static str = "private";
    /// Default Cache-Control: 1 year.
    pub const DEFAULT_CACHE_CONTROL: &'static str = "max-age=31536000, public";
    /// Default content type.
    pub const DEFAULT_CONTENT_TYPE: &'static str = "application/octet-stream";
    /// Default signed URL lifetime: 1 day.
    pub const DEFAULT_URL_EXPIRATION: Duration = Duration::from_secs(60 * 60 * 24);
    /// Default spool threshold: 10MB.
    pub const DEFAULT_SPOOL_THRESHOLD: u64 = 10 * 1024 * 1024;

    /// Create a config with default settings.
    #[must_use]
    pub fn new(backend: StorageBackend, credentials: Credentials, bucket: impl Into<String>) -> Self {
        Self {
            backend,
            credentials,
            bucket: bucket.into(),
            storage_class: Self::DEFAULT_STORAGE_CLASS.to_string(),
            acl: Self::DEFAULT_ACL.to_string(),
            cache_control: Self::DEFAULT_CACHE_CONTROL.to_string(),
            default_content_type: Self::DEFAULT_CONTENT_TYPE.to_string(),
            url_expiration: Some(Self::DEFAULT_URL_EXPIRATION),
            spool_threshold: Self::DEFAULT_SPOOL_THRESHOLD,
            spool_dir: None,
            public_base_url: None,
        }
    }

    /// Set signed URL lifetime in seconds. Zero disables signing.
    #[must_use]
    pub fn with_url_expiration_secs(mut self, secs: u64) -> Self {
        self.url_expiration = (secs > 0).then_some(Duration::from_secs(secs));
        self
    }

    /// Set spool threshold in bytes.
    #[must_use]
    pub fn with_spool_threshold(mut self, bytes: u64) -> Self {
        self.spool_threshold = bytes;
        self
    }

    /// Set spool directory.
    #[must_use]
    pub fn with_spool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spool_dir = Some(dir.into());
        self
    }

    /// Set storage class.
    #[must_use]
    pub fn with_storage_class(mut self, class: impl Into<String>) -> Self {
        self.storage_class = class.into();
        self
    }

    /// Set access-control policy label.
    #[must_use]
    pub fn with_acl(mut self, acl: impl Into<String>) -> Self {
        self.acl = acl.into();
        self
    }

    /// Set Cache-Control header.
    #[must_use]
    pub fn with_cache_control(mut self, value: impl Into<String>) -> Self {
        self.cache_control = value.into();
        self
    }

    /// Set fallback content type.
    #[must_use]
    pub fn with_default_content_type(mut self, value: impl Into<String>) -> Self {
        self.default_content_type = value.into();
        self
    }

    /// Set public URL base.
    #[must_use]
    pub fn with_public_base_url(mut self, base: impl Into<String>) -> Self {
        self.public_base_url = Some(base.into());
        self
    }

    /// Public URL prefix, always ending in `/`.
    #[must_use]
    pub fn public_url_base(&self) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}/", base.trim_end_matches('/')),
            None => format!("https://{}.s3.amazonaws.com/", self.bucket),
        }
    }

    /// True when the ACL makes objects readable without a signature.
    #[must_use]
    pub fn is_public_read(&self) -> bool {
        self.acl.starts_with("public-read")
    }
}

impl From<&StorageSettings> for StorageClientConfig {
    fn from(settings: &StorageSettings) -> Self {
        let backend = match &settings.backend {
            BackendSettings::S3 { region, endpoint } => StorageBackend::S3 {
                region: region.clone(),
                endpoint: endpoint.clone(),
            },
            BackendSettings::LocalFs { root } => StorageBackend::LocalFs { root: root.clone() },
            BackendSettings::Memory => StorageBackend::Memory,
        };

        let credentials = Credentials::new(&settings.access_key_id, &settings.secret_access_key);

        Self {
            backend,
            credentials,
            bucket: settings.bucket.clone(),
            storage_class: settings.storage_class.clone(),
            acl: settings.acl.clone(),
            cache_control: settings.cache_control.clone(),
            default_content_type: settings.default_content_type.clone(),
            url_expiration: None,
            spool_threshold: settings.spool_threshold_bytes,
            spool_dir: settings.spool_dir.clone(),
            public_base_url: settings.public_base_url.clone(),
        }
        .with_url_expiration_secs(settings.url_expiration_secs)
    }
}
