//! Object storage access layer using Apache OpenDAL.
//!
//! The client talks to any OpenDAL service; S3-compatible stores in
//! production, memory or local filesystem in development and tests.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                         StorageClient                              │
//! │   upload / download / url / friendly_url / delete / stat           │
//! ├──────────────────┬──────────────────────────┬─────────────────────┤
//! │ key::encode_key  │ StreamedObject           │ MaterializedObject  │
//! │ (public URLs)    │ (live, 64 KiB buffered)  │ (memory or spool)   │
//! ├──────────────────┴──────────────────────────┴─────────────────────┤
//! │                   Apache OpenDAL Operator                          │
//! │ write_with / writer_with │ stat / reader │ delete │ presign_read   │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Downloads return a [`StorageObject`]: either a live stream the caller must
//! close, or a local copy spooled to memory or a temp file depending on the
//! configured threshold.

mod client;
mod config;
mod error;
mod key;
mod object;
mod spool;
mod stream;

pub use client::{StorageClient, UploadBody, UploadOptions};
pub use config::{Credentials, StorageBackend, StorageClientConfig};
pub use error::{StorageError, StorageOp};
pub use key::encode_key;
pub use object::{ObjectInfo, StorageObject};
pub use spool::{COPY_CHUNK_SIZE, MaterializedObject, SpoolBacking, materialize};
pub use stream::{ByteStream, READ_BUFFER_SIZE, StreamedObject};
