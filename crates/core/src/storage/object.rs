//! Downloaded object handles.

use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, ReadBuf};

use super::error::StorageError;
use super::spool::MaterializedObject;
use super::stream::StreamedObject;

/// Properties of a stored object, as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Storage key.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Content type.
    pub content_type: Option<String>,
    /// Last modification time.
    pub last_modified: Option<DateTime<Utc>>,
    /// User metadata stored with the object.
    pub metadata: HashMap<String, String>,
}

impl ObjectInfo {
    /// Info for `name` with only the size known.
    #[must_use]
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            content_type: None,
            last_modified: None,
            metadata: HashMap::new(),
        }
    }

    pub(crate) fn from_metadata(name: &str, meta: &opendal::Metadata) -> Self {
        Self {
            name: name.to_string(),
            size: meta.content_length(),
            content_type: meta.content_type().map(String::from),
            last_modified: meta
                .last_modified()
                .and_then(|ts| ts.to_string().parse::<DateTime<Utc>>().ok()),
            metadata: meta.user_metadata().cloned().unwrap_or_default(),
        }
    }
}

/// Result of a download: a live stream or a local copy.
#[derive(Debug)]
pub enum StorageObject {
    /// Forward-only stream over an open connection.
    Streamed(StreamedObject),
    /// Fully downloaded, seekable copy.
    Materialized(MaterializedObject),
}

impl StorageObject {
    /// Object properties.
    #[must_use]
    pub fn info(&self) -> &ObjectInfo {
        match self {
            Self::Streamed(obj) => obj.info(),
            Self::Materialized(obj) => obj.info(),
        }
    }

    /// Storage key.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.info().name
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.info().size
    }

    /// Releases the connection, buffer or spool file. Safe to call twice.
    pub async fn close(&mut self) -> Result<(), StorageError> {
        match self {
            Self::Streamed(obj) => {
                obj.close();
                Ok(())
            }
            Self::Materialized(obj) => obj.close().await,
        }
    }

    /// Returns the streamed handle, if this is one.
    #[must_use]
    pub fn into_streamed(self) -> Option<StreamedObject> {
        match self {
            Self::Streamed(obj) => Some(obj),
            Self::Materialized(_) => None,
        }
    }

    /// Returns the materialized handle, if this is one.
    #[must_use]
    pub fn into_materialized(self) -> Option<MaterializedObject> {
        match self {
            Self::Materialized(obj) => Some(obj),
            Self::Streamed(_) => None,
        }
    }
}

impl AsyncRead for StorageObject {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Streamed(obj) => Pin::new(obj).poll_read(cx, buf),
            Self::Materialized(obj) => Pin::new(obj).poll_read(cx, buf),
        }
    }
}
