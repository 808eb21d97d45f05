//! Shared constants

/// Issuer claim required on access tokens.
pub const JWT_ISSUER: &str = "tubely-access";

/// Multipart field carrying the uploaded video.
pub const VIDEO_FORM_FIELD: &str = "video";

/// Cache directive attached to processed assets. Keys are unique per upload and
/// objects are never rewritten in place, so they are safe to cache forever.
pub const DEFAULT_VIDEO_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Prefix for scratch files created while staging an upload.
pub const UPLOAD_SCRATCH_PREFIX: &str = "tubely-upload-";

/// Prefix for scratch files written by the fast-start rewriter.
pub const PROCESSED_SCRATCH_PREFIX: &str = "tubely-processed-";
