//! Tubely Core Library
//!
//! This crate provides core domain models, error types and configuration
//! that are shared across all Tubely components.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{BaseConfig, Config, IngestConfig, MediaToolBackend, ServiceConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::{Orientation, VideoRecord, VideoResponse};
pub use storage_types::StorageBackend;
