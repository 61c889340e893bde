//! Shared errors and configuration for the Client Portal.
//!
//! This crate provides common types used across all other crates:
//! - Application-wide error types with stable error codes
//! - Configuration management

pub mod config;
pub mod error;

pub use config::{AppConfig, BackendSettings, StorageSettings, UploadSettings};
pub use error::AppError;
