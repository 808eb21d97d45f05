//! Tubely API Library
//!
//! HTTP surface of the video ingestion service: authentication, the upload and
//! read handlers, signed asset delivery for the local backend, and application
//! setup.

pub mod auth;
pub mod error;
mod handlers;
pub mod setup;
pub mod state;
pub mod telemetry;

pub use error::{ErrorResponse, HttpAppError};
pub use state::AppState;
