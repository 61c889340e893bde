//! Object storage access layer for the Client Portal.
//!
//! This crate contains storage logic with ZERO web or database dependencies.
//! Request handlers and models call into it with plain keys and bytes.
//!
//! # Modules
//!
//! - `storage` - Object store client, streamed and spooled downloads, URL signing
//! - `uploads` - User upload keys and links on top of `storage`

pub mod storage;
pub mod uploads;
