//! In-memory repository for testing without a database

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tubely_core::{AppError, VideoRecord};
use uuid::Uuid;

use crate::VideoRepository;

#[derive(Clone, Default)]
pub struct MockVideoRepository {
    videos: Arc<Mutex<HashMap<Uuid, VideoRecord>>>,
    fail_updates: Arc<AtomicBool>,
    update_calls: Arc<AtomicUsize>,
}

impl MockVideoRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_video(&self, video: VideoRecord) {
        self.videos.lock().unwrap().insert(video.id, video);
    }

    /// Insert a fresh record owned by `user_id` and return it.
    pub fn seed_video(&self, user_id: Uuid) -> VideoRecord {
        let now = Utc::now();
        let video = VideoRecord {
            id: Uuid::new_v4(),
            user_id,
            title: "Boots".to_string(),
            description: "A short clip".to_string(),
            thumbnail_url: None,
            video_url: None,
            created_at: now,
            updated_at: now,
        };
        self.add_video(video.clone());
        video
    }

    pub fn video(&self, id: Uuid) -> Option<VideoRecord> {
        self.videos.lock().unwrap().get(&id).cloned()
    }

    /// Make every subsequent `update_video` fail.
    pub fn fail_updates(&self) {
        self.fail_updates.store(true, Ordering::SeqCst);
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoRepository for MockVideoRepository {
    async fn get_video(&self, id: Uuid) -> Result<Option<VideoRecord>, AppError> {
        Ok(self.video(id))
    }

    async fn update_video(&self, video: &VideoRecord) -> Result<(), AppError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(AppError::Internal("simulated database outage".to_string()));
        }
        let mut videos = self.videos.lock().unwrap();
        match videos.get_mut(&video.id) {
            Some(existing) => {
                *existing = video.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!("Video {} not found", video.id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn update_replaces_stored_record() {
        let repo = MockVideoRepository::new();
        let mut video = repo.seed_video(Uuid::new_v4());
        video.attach_video("bucket,portrait/ab.mp4".to_string());

        repo.update_video(&video).await.unwrap();

        let stored = repo.get_video(video.id).await.unwrap().unwrap();
        assert_eq!(stored.video_url.as_deref(), Some("bucket,portrait/ab.mp4"));
        assert_eq!(repo.update_calls(), 1);
    }

    #[tokio::test]
    async fn update_of_missing_record_is_not_found() {
        let repo = MockVideoRepository::new();
        let video = MockVideoRepository::new().seed_video(Uuid::new_v4());
        let err = repo.update_video(&video).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn failing_updates_leave_record_untouched() {
        let repo = MockVideoRepository::new();
        let mut video = repo.seed_video(Uuid::new_v4());
        repo.fail_updates();
        video.attach_video("bucket,other/ff.mp4".to_string());

        assert!(repo.update_video(&video).await.is_err());
        assert!(repo.video(video.id).unwrap().video_url.is_none());
    }
}
