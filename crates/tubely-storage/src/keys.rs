//! Storage key generation and object references.
//!
//! Key format: `{orientation}/{32 hex chars}.{ext}`. All backends use keys
//! produced here.

use crate::traits::{StorageError, StorageResult};
use std::fmt;
use std::str::FromStr;
use tubely_core::Orientation;

const NAME_BYTES: usize = 16;

/// Destination key of a processed video
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lowercase MIME type without parameters (`"Video/MP4; codecs=avc1"` -> `"video/mp4"`).
pub fn normalize_content_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

/// File extension stored for a content type.
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    match normalize_content_type(content_type).as_str() {
        "video/mp4" => Some("mp4"),
        "video/quicktime" => Some("mov"),
        _ => None,
    }
}

/// Choose the storage key for a processed video.
///
/// The orientation prefix is always present; the name is fresh random
/// entropy so concurrent uploads never collide.
pub fn classify(orientation: Orientation, content_type: &str) -> StorageResult<StorageKey> {
    let name: [u8; NAME_BYTES] = rand::random();
    classify_with_name(orientation, content_type, &name)
}

fn classify_with_name(
    orientation: Orientation,
    content_type: &str,
    name: &[u8; NAME_BYTES],
) -> StorageResult<StorageKey> {
    let ext = extension_for(content_type)
        .ok_or_else(|| StorageError::UnsupportedMediaType(content_type.to_string()))?;
    Ok(StorageKey(format!(
        "{}/{}.{}",
        orientation.key_prefix(),
        hex::encode(name),
        ext
    )))
}

/// Pointer to a stored object, persisted as `"{bucket},{key}"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectReference {
    pub bucket: String,
    pub key: String,
}

impl ObjectReference {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.bucket, self.key)
    }
}

impl FromStr for ObjectReference {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(',') {
            Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
                Ok(ObjectReference::new(bucket, key))
            }
            _ => Err(StorageError::InvalidReference(format!(
                "expected \"bucket,key\", got {:?}",
                s
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_has_orientation_prefix_and_extension() {
        let key = classify_with_name(Orientation::Landscape, "video/mp4", &[0xab; 16]).unwrap();
        assert_eq!(key.as_str(), format!("landscape/{}.mp4", "ab".repeat(16)));

        let key = classify_with_name(Orientation::Portrait, "video/quicktime", &[0; 16]).unwrap();
        assert!(key.as_str().starts_with("portrait/"));
        assert!(key.as_str().ends_with(".mov"));

        let key = classify(Orientation::Other, "video/mp4").unwrap();
        assert!(key.as_str().starts_with("other/"));
    }

    #[test]
    fn random_names_are_hex_and_distinct() {
        let a = classify(Orientation::Landscape, "video/mp4").unwrap();
        let b = classify(Orientation::Landscape, "video/mp4").unwrap();
        assert_ne!(a, b);

        let name = a
            .as_str()
            .trim_start_matches("landscape/")
            .trim_end_matches(".mp4");
        assert_eq!(name.len(), 32);
        assert!(name.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn unsupported_content_type_rejected() {
        let result = classify(Orientation::Landscape, "image/gif");
        assert!(matches!(result, Err(StorageError::UnsupportedMediaType(_))));
    }

    #[test]
    fn content_type_normalization() {
        assert_eq!(normalize_content_type("Video/MP4; codecs=avc1"), "video/mp4");
        assert_eq!(extension_for("VIDEO/MP4"), Some("mp4"));
        assert_eq!(extension_for("video/webm"), None);
    }

    #[test]
    fn object_reference_parse_and_display() {
        let reference: ObjectReference = "tubely-videos,portrait/00ff.mp4".parse().unwrap();
        assert_eq!(reference.bucket, "tubely-videos");
        assert_eq!(reference.key, "portrait/00ff.mp4");
        assert_eq!(reference.to_string(), "tubely-videos,portrait/00ff.mp4");

        assert!("no-comma".parse::<ObjectReference>().is_err());
        assert!(",key".parse::<ObjectReference>().is_err());
        assert!("bucket,".parse::<ObjectReference>().is_err());
    }
}
