pub mod assets;
pub mod health;
pub mod video_get;
pub mod video_upload;
