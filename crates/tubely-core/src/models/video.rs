use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Video metadata record owned by the metadata store.
///
/// The ingest pipeline never creates or deletes records; its only write is
/// [`VideoRecord::attach_video`] after a successful upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct VideoRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub thumbnail_url: Option<String>,
    /// Stored object reference (`"{bucket},{key}"`), not a retrievable URL.
    pub video_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VideoRecord {
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }

    /// Point the record at a newly uploaded object.
    pub fn attach_video(&mut self, reference: String) {
        self.video_url = Some(reference);
        self.updated_at = Utc::now();
    }
}

/// Record as returned to readers: `video_url` holds a time-limited signed URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub thumbnail_url: Option<String>,
    pub video_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VideoResponse {
    pub fn with_video_url(record: VideoRecord, video_url: Option<String>) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            title: record.title,
            description: record.description,
            thumbnail_url: record.thumbnail_url,
            video_url,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(owner: Uuid) -> VideoRecord {
        let now = Utc::now();
        VideoRecord {
            id: Uuid::new_v4(),
            user_id: owner,
            title: "boots".to_string(),
            description: "a video about boots".to_string(),
            thumbnail_url: None,
            video_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn ownership_check() {
        let owner = Uuid::new_v4();
        let video = record(owner);
        assert!(video.is_owned_by(owner));
        assert!(!video.is_owned_by(Uuid::new_v4()));
    }

    #[test]
    fn attach_video_sets_reference_and_bumps_timestamp() {
        let mut video = record(Uuid::new_v4());
        let before = video.updated_at;
        video.attach_video("bucket,landscape/abc.mp4".to_string());
        assert_eq!(video.video_url.as_deref(), Some("bucket,landscape/abc.mp4"));
        assert!(video.updated_at >= before);
    }
}
