//! Tubely metadata store
//!
//! Repository access to video records. The ingest pipeline only reads a record
//! and updates its video reference; creating and deleting records belongs to
//! other services.

pub mod db;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use db::{PgVideoRepository, VideoRepository};
