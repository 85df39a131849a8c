//! Upload a local video to YouTube through the resumable upload protocol.

pub mod error;
pub mod metadata;
pub mod transport;
pub mod upload;

pub use error::UploadError;
pub use metadata::{
    DEFAULT_TAGS, GAMING_CATEGORY_ID, Privacy, SHORTS_MARKER, UploadRequest, VideoMetadata,
    effective_tags, shorts_title, watch_url,
};
pub use transport::{YouTubeTransport, YouTubeUploadSession};
pub use upload::{
    ChunkOutcome, MediaSource, PublishedVideo, RetryPolicy, Upload, UploadDriver, UploadProgress,
    UploadSession, UploadState, UploadTransport, UploadedVideo,
};
