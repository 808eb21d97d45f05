//! Tubely Storage Library
//!
//! Storage abstraction for processed videos, with S3 (via `object_store`) and
//! local filesystem backends.
//!
//! # Storage key format
//!
//! `{orientation}/{name}.{ext}` where orientation is `landscape`, `portrait` or
//! `other`, name is 32 lowercase hex characters and ext follows the content
//! type. Keys are generated only in the [`keys`] module.
//!
//! A stored object is referenced from the metadata store as `"{bucket},{key}"`
//! (see [`ObjectReference`]); retrievable URLs are issued on read with
//! [`Storage::signed_url`].

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod signing;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
pub use keys::{classify, extension_for, normalize_content_type, ObjectReference, StorageKey};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use signing::{SignatureError, UrlSigner};
pub use traits::{ObjectAttributes, Storage, StorageError, StorageResult, StoredObject};
pub use tubely_core::StorageBackend;
