use std::path::PathBuf;

/// Errors raised while uploading a video
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The local video file could not be opened or read
    #[error("failed to read video file '{path}': {source}")]
    Media {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The upload API rejected a request
    #[error("upload API returned status {status}: {body}")]
    Api { status: u16, body: String },

    /// The upload API answered with something we could not interpret
    #[error("malformed upload response: {0}")]
    MalformedResponse(String),

    /// A rejected credential could not be renewed
    #[error(transparent)]
    Auth(#[from] yt_oauth::OAuthError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl UploadError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            UploadError::Api { status, .. } => matches!(status, 500 | 502 | 503 | 504),
            UploadError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            UploadError::Media { .. }
            | UploadError::MalformedResponse(_)
            | UploadError::Auth(_) => false,
        }
    }

    /// The API rejected the access token
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, UploadError::Api { status: 401, .. })
    }
}
