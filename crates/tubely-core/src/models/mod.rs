//! Domain models shared by the pipeline, the metadata store and the API.

mod orientation;
mod video;

pub use orientation::{Orientation, ASPECT_RATIO_TOLERANCE};
pub use video::{VideoRecord, VideoResponse};
