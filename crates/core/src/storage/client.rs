//! Object store client built on Apache OpenDAL.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use opendal::{Operator, Writer, services};
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, warn};

use super::config::{StorageBackend, StorageClientConfig};
use super::error::{StorageError, StorageOp};
use super::key::encode_key;
use super::object::{ObjectInfo, StorageObject};
use super::stream::{ByteStream, READ_BUFFER_SIZE, StreamedObject};

/// Data to upload.
pub enum UploadBody {
    /// Complete body in memory.
    Bytes(Bytes),
    /// Body produced chunk by chunk.
    Stream(ByteStream),
}

impl UploadBody {
    /// Streams the body out of any async reader.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self::Stream(ReaderStream::with_capacity(reader, READ_BUFFER_SIZE).boxed())
    }
}

impl From<Bytes> for UploadBody {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for UploadBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for UploadBody {
    fn from(bytes: &'static [u8]) -> Self {
        Self::Bytes(Bytes::from_static(bytes))
    }
}

impl From<String> for UploadBody {
    fn from(text: String) -> Self {
        Self::Bytes(Bytes::from(text))
    }
}

impl fmt::Debug for UploadBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// Per-upload options.
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Explicit content type. Guessed from the key when `None`.
    pub content_type: Option<String>,
    /// User metadata stored with the object.
    pub metadata: HashMap<String, String>,
}

impl UploadOptions {
    /// Set the content type.
    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Add a metadata entry.
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Header options resolved against what the backend accepts.
struct WriteHeaders {
    content_type: Option<String>,
    cache_control: Option<String>,
    metadata: Option<HashMap<String, String>>,
}

/// Client for one bucket of an object store.
///
/// Holds only immutable configuration and the OpenDAL operator, so a single
/// instance can be shared across tasks behind an `Arc`. Every call issues its
/// own request. Nothing is retried.
pub struct StorageClient {
    operator: Operator,
    config: StorageClientConfig,
    public_base: String,
}

impl StorageClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Configuration`] when credentials or the bucket
    /// are missing, or the backend cannot be initialized.
    pub fn new(config: StorageClientConfig) -> Result<Self, StorageError> {
        if !config.credentials.is_complete() {
            return Err(StorageError::configuration("missing storage credentials"));
        }
        if config.bucket.trim().is_empty() {
            return Err(StorageError::configuration("missing storage bucket"));
        }

        let operator = Self::create_operator(&config)?;

        if config.url_expiration.is_none() && !config.is_public_read() {
            warn!(
                bucket = %config.bucket,
                acl = %config.acl,
                "public URLs are enabled but the ACL is not public-read; URLs will be refused"
            );
        }

        debug!(
            backend = config.backend.name(),
            bucket = %config.bucket,
            signed_urls = config.url_expiration.is_some(),
            "storage client configured"
        );

        let public_base = config.public_url_base();
        Ok(Self {
            operator,
            config,
            public_base,
        })
    }

    /// Create OpenDAL operator from backend config.
    fn create_operator(config: &StorageClientConfig) -> Result<Operator, StorageError> {
        match &config.backend {
            StorageBackend::S3 { region, endpoint } => {
                let mut builder = services::S3::default()
                    .bucket(&config.bucket)
                    .region(region)
                    .access_key_id(&config.credentials.access_key_id)
                    .secret_access_key(&config.credentials.secret_access_key)
                    .default_storage_class(&config.storage_class)
                    .disable_config_load()
                    .disable_ec2_metadata();
                if let Some(endpoint) = endpoint {
                    builder = builder.endpoint(endpoint);
                }
                finish(builder)
            }
            StorageBackend::LocalFs { root } => {
                let root = root
                    .to_str()
                    .ok_or_else(|| StorageError::configuration("invalid path"))?;
                finish(services::Fs::default().root(root))
            }
            StorageBackend::Memory => finish(services::Memory::default()),
        }
    }

    /// Uploads `body` under `key`.
    ///
    /// The content type defaults to a guess from the key's extension, then
    /// to the configured default. Stream uploads are aborted on any failure,
    /// so no partial object is left behind.
    pub async fn upload(
        &self,
        key: &str,
        body: impl Into<UploadBody>,
        options: UploadOptions,
    ) -> Result<(), StorageError> {
        let headers = self.write_headers(key, options);

        match body.into() {
            UploadBody::Bytes(bytes) => {
                let len = bytes.len();
                let mut write = self.operator.write_with(key, bytes);
                if let Some(content_type) = &headers.content_type {
                    write = write.content_type(content_type);
                }
                if let Some(cache_control) = &headers.cache_control {
                    write = write.cache_control(cache_control);
                }
                if let Some(metadata) = headers.metadata {
                    write = write.user_metadata(metadata);
                }
                write
                    .await
                    .map_err(|e| transport_failure(StorageOp::Upload, key, &e))?;
                debug!(key, bytes = len, "uploaded object");
            }
            UploadBody::Stream(stream) => {
                let mut open = self.operator.writer_with(key);
                if let Some(content_type) = &headers.content_type {
                    open = open.content_type(content_type);
                }
                if let Some(cache_control) = &headers.cache_control {
                    open = open.cache_control(cache_control);
                }
                if let Some(metadata) = headers.metadata {
                    open = open.user_metadata(metadata);
                }
                let mut writer = open
                    .await
                    .map_err(|e| transport_failure(StorageOp::Upload, key, &e))?;

                if let Err(err) = write_stream(&mut writer, stream, key).await {
                    if let Err(abort) = writer.abort().await {
                        warn!(key, error = %abort, "failed to abort partial upload");
                    }
                    return Err(err);
                }
                debug!(key, "uploaded object stream");
            }
        }

        Ok(())
    }

    /// Resolves upload headers, dropping those the backend cannot store.
    fn write_headers(&self, key: &str, options: UploadOptions) -> WriteHeaders {
        let capability = self.operator.info().full_capability();

        let content_type = options
            .content_type
            .unwrap_or_else(|| self.guess_content_type(key));

        let metadata = if options.metadata.is_empty() {
            None
        } else if capability.write_with_user_metadata {
            Some(options.metadata)
        } else {
            warn!(
                key,
                backend = self.config.backend.name(),
                "backend cannot store user metadata; uploading body only"
            );
            None
        };

        WriteHeaders {
            content_type: capability.write_with_content_type.then_some(content_type),
            cache_control: capability
                .write_with_cache_control
                .then(|| self.config.cache_control.clone()),
            metadata,
        }
    }

    /// Content type for `key` from its extension, or the configured default.
    #[must_use]
    pub fn guess_content_type(&self, key: &str) -> String {
        mime_guess::from_path(key)
            .first_raw()
            .map_or_else(|| self.config.default_content_type.clone(), String::from)
    }

    /// Downloads `key`.
    ///
    /// With `materialize` false the result streams over the open connection
    /// and the caller must close it. With `materialize` true the object is
    /// copied locally (memory or spool file, per the spool threshold) and the
    /// connection is closed before returning.
    ///
    /// # Errors
    ///
    /// [`StorageError::NotFound`] if the key does not exist; any other
    /// failure is a [`StorageError::Operation`].
    pub async fn download(&self, key: &str, materialize: bool) -> Result<StorageObject, StorageError> {
        let meta = self
            .operator
            .stat(key)
            .await
            .map_err(|e| transport_failure(StorageOp::Download, key, &e))?;
        let info = ObjectInfo::from_metadata(key, &meta);

        // Bounded by the stat'd length so the reader does not stat again.
        let stream: ByteStream = if info.size == 0 {
            futures::stream::empty().boxed()
        } else {
            let reader = self
                .operator
                .reader(key)
                .await
                .map_err(|e| transport_failure(StorageOp::Download, key, &e))?;
            reader
                .into_bytes_stream(0..info.size)
                .await
                .map_err(|e| transport_failure(StorageOp::Download, key, &e))?
                .boxed()
        };

        let streamed = StreamedObject::new(info, stream);
        if !materialize {
            debug!(key, size = streamed.info().size, "opened object stream");
            return Ok(StorageObject::Streamed(streamed));
        }

        let local = streamed
            .into_materialized(self.config.spool_threshold, self.config.spool_dir.as_deref())
            .await
            .inspect_err(|e| {
                error!(key, operation = %StorageOp::Spool, error = %e, "Failed to download file.");
            })?;
        Ok(StorageObject::Materialized(local))
    }

    /// Object properties without downloading the body.
    pub async fn stat(&self, key: &str) -> Result<ObjectInfo, StorageError> {
        let meta = self
            .operator
            .stat(key)
            .await
            .map_err(|e| transport_failure(StorageOp::Stat, key, &e))?;
        Ok(ObjectInfo::from_metadata(key, &meta))
    }

    /// URL for `key`: signed when URL expiration is configured, public
    /// otherwise. The key is not checked for existence.
    pub async fn url(&self, key: &str) -> Result<String, StorageError> {
        match self.config.url_expiration {
            Some(expires) => self.signed_url(key, expires).await,
            None => Ok(self.public_url(key)),
        }
    }

    /// Unsigned URL for `key`.
    #[must_use]
    pub fn public_url(&self, key: &str) -> String {
        format!("{}{}", self.public_base, encode_key(key))
    }

    /// Signed GET URL for `key` valid for `expires`.
    pub async fn signed_url(&self, key: &str, expires: Duration) -> Result<String, StorageError> {
        let request = self
            .operator
            .presign_read(key, expires)
            .await
            .map_err(|e| transport_failure(StorageOp::Presign, key, &e))?;
        Ok(request.uri().to_string())
    }

    /// Signed URL that makes browsers save the object as `{filename}.{ext}`.
    ///
    /// # Errors
    ///
    /// [`StorageError::UnsupportedConfiguration`] when URL expiration is
    /// disabled, since public URLs cannot carry a download filename.
    pub async fn friendly_url(
        &self,
        key: &str,
        filename: &str,
        ext: &str,
    ) -> Result<String, StorageError> {
        let Some(expires) = self.config.url_expiration else {
            return Err(StorageError::unsupported(
                "download filenames require signed URLs, but URL expiration is disabled",
            ));
        };

        let disposition = format!("attachment; filename={filename}.{ext}");
        let request = self
            .operator
            .presign_read_with(key, expires)
            .override_content_disposition(&disposition)
            .await
            .map_err(|e| transport_failure(StorageOp::Presign, key, &e))?;
        Ok(request.uri().to_string())
    }

    /// Deletes `key`. Deleting a missing key succeeds.
    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.operator
            .delete(key)
            .await
            .map_err(|e| transport_failure(StorageOp::Delete, key, &e))?;
        debug!(key, "deleted object");
        Ok(())
    }

    /// Get the bucket name.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &StorageClientConfig {
        &self.config
    }
}

impl fmt::Debug for StorageClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn finish<B: opendal::Builder>(builder: B) -> Result<Operator, StorageError> {
    Ok(Operator::new(builder)
        .map_err(|e| StorageError::configuration(e.to_string()))?
        .finish())
}

async fn write_stream(
    writer: &mut Writer,
    mut stream: ByteStream,
    key: &str,
) -> Result<(), StorageError> {
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            error!(key, operation = "upload", error = %e, "Failed to upload file.");
            StorageError::operation(StorageOp::Upload, key, e)
        })?;
        writer
            .write(chunk)
            .await
            .map_err(|e| transport_failure(StorageOp::Upload, key, &e))?;
    }
    writer
        .close()
        .await
        .map_err(|e| transport_failure(StorageOp::Upload, key, &e))?;
    Ok(())
}

/// Translates and logs a transport failure.
///
/// Missing objects are expected and logged as warnings; everything else is
/// logged as an error for alerting.
fn transport_failure(operation: StorageOp, key: &str, err: &opendal::Error) -> StorageError {
    let mapped = StorageError::from_transport(operation, key, err);
    if mapped.is_not_found() {
        warn!(key, %operation, "File not found at storage.");
    } else {
        error!(key, %operation, error = %err, "Failed to {operation} file.");
    }
    mapped
}
