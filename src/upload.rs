//! Resumable upload driver.
//!
//! An [`UploadTransport`] opens an [`UploadSession`] for one video; [`Upload`]
//! advances that session chunk by chunk through the [`UploadState`] machine
//! until the platform returns the published video.

use crate::error::UploadError;
use crate::metadata::{UploadRequest, VideoMetadata, watch_url};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use yt_oauth::{AuthProvider, Credential, CredentialManager, CredentialStore};

/// MIME type of the uploaded media
pub const WEBM_MIME_TYPE: &str = "video/webm";

/// Local file to be sent as the media part of the upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSource {
    pub path: PathBuf,
    pub mime_type: String,
    pub len: u64,
}

impl MediaSource {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, UploadError> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|source| UploadError::Media {
                path: path.to_path_buf(),
                source,
            })?;

        if !metadata.is_file() {
            return Err(UploadError::Media {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            mime_type: WEBM_MIME_TYPE.to_string(),
            len: metadata.len(),
        })
    }
}

/// Bytes the server has acknowledged so far
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub bytes_sent: u64,
    pub total_bytes: u64,
}

impl UploadProgress {
    /// Fraction in `[0, 1]`; an empty file counts as fully sent
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        (self.bytes_sent.min(self.total_bytes) as f64) / (self.total_bytes as f64)
    }

    pub fn percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return 100;
        }
        // Integer arithmetic keeps floor() exact for large files
        (self.bytes_sent.min(self.total_bytes) as u128 * 100 / self.total_bytes as u128) as u8
    }
}

/// Final video resource returned when the upload completes
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadedVideo {
    pub id: String,
}

/// Result of sending one chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    Progress(UploadProgress),
    Complete(UploadedVideo),
}

/// Starts resumable upload sessions
#[allow(async_fn_in_trait)]
pub trait UploadTransport {
    type Session: UploadSession;

    async fn insert(
        &self,
        credential: &Credential,
        metadata: &VideoMetadata,
        media: MediaSource,
    ) -> Result<Self::Session, UploadError>;
}

/// One in-flight resumable upload
#[allow(async_fn_in_trait)]
pub trait UploadSession {
    /// Send the next chunk
    async fn next_chunk(&mut self) -> Result<ChunkOutcome, UploadError>;

    /// Ask the server how much it has received and continue from there
    async fn resume(&mut self) -> Result<ChunkOutcome, UploadError>;

    /// Authorize further requests with `credential`
    fn set_credential(&mut self, credential: &Credential);

    /// Server-side handle of the session, if there is one
    fn session_uri(&self) -> Option<&str> {
        None
    }
}

/// A video that finished uploading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedVideo {
    pub id: String,
    pub url: String,
}

impl PublishedVideo {
    pub fn from_id(id: impl Into<String>) -> Self {
        let id = id.into();
        let url = watch_url(&id);
        Self { id, url }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadState {
    Pending,
    InProgress(u8),
    Complete(PublishedVideo),
    Failed(String),
}

/// Bounded retry with exponential backoff around chunk requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// Fail on the first error
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff.saturating_mul(1 << attempt.min(16))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: Self::DEFAULT_MAX_RETRIES,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

/// State machine over one upload session
pub struct Upload<S> {
    session: S,
    state: UploadState,
    retry: RetryPolicy,
    reported_percent: u8,
}

impl<S: UploadSession> Upload<S> {
    pub fn new(session: S, retry: RetryPolicy) -> Self {
        Self {
            session,
            state: UploadState::Pending,
            retry,
            reported_percent: 0,
        }
    }

    pub fn state(&self) -> &UploadState {
        &self.state
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// Advance by one chunk.
    ///
    /// A completed upload stays completed. After a failure the next step
    /// resumes the session from the server's offset.
    pub async fn step(&mut self) -> Result<&UploadState, UploadError> {
        let outcome = match self.state {
            UploadState::Complete(_) => return Ok(&self.state),
            UploadState::Failed(_) => self.session.resume().await,
            UploadState::Pending | UploadState::InProgress(_) => self.next_with_retry().await,
        };

        match outcome {
            Ok(ChunkOutcome::Progress(progress)) => {
                // Never report less than before, even if a resume lands on a lower offset
                self.reported_percent = self.reported_percent.max(progress.percent());
                tracing::debug!(
                    bytes_sent = progress.bytes_sent,
                    total_bytes = progress.total_bytes,
                    fraction = progress.fraction(),
                    "chunk acknowledged"
                );
                self.state = UploadState::InProgress(self.reported_percent);
                Ok(&self.state)
            }
            Ok(ChunkOutcome::Complete(video)) => {
                tracing::info!(video_id = %video.id, "upload complete");
                self.state = UploadState::Complete(PublishedVideo::from_id(video.id));
                Ok(&self.state)
            }
            Err(e) => {
                self.state = UploadState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    async fn next_with_retry(&mut self) -> Result<ChunkOutcome, UploadError> {
        let mut attempt = 0;
        let mut result = self.session.next_chunk().await;

        loop {
            match result {
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    let delay = self.retry.backoff(attempt);
                    attempt += 1;
                    tracing::warn!(
                        error = %e,
                        attempt,
                        max_retries = self.retry.max_retries,
                        ?delay,
                        "transient upload error, retrying"
                    );
                    tokio::time::sleep(delay).await;

                    result = match self.session.resume().await {
                        Ok(ChunkOutcome::Progress(_)) => self.session.next_chunk().await,
                        other => other,
                    };
                }
                other => return other,
            }
        }
    }

    /// Step until the upload completes, reporting each percentage to `on_progress`
    pub async fn run(
        &mut self,
        mut on_progress: impl FnMut(u8),
    ) -> Result<PublishedVideo, UploadError> {
        loop {
            match self.step().await? {
                UploadState::InProgress(percent) => on_progress(*percent),
                UploadState::Complete(video) => return Ok(video.clone()),
                UploadState::Pending | UploadState::Failed(_) => {}
            }
        }
    }

    /// Like [`Upload::run`], but renews the credential through `credentials`
    /// when the API rejects the access token, then resumes the session.
    ///
    /// A second rejection without progress in between is returned as an error.
    pub async fn run_renewing<St, P>(
        &mut self,
        credentials: &CredentialManager<St, P>,
        credential: &Credential,
        mut on_progress: impl FnMut(u8),
    ) -> Result<PublishedVideo, UploadError>
    where
        St: CredentialStore,
        P: AuthProvider,
    {
        let mut current = credential.clone();
        let mut renewed = false;

        loop {
            let step = self.step().await.map(UploadState::clone);
            match step {
                Ok(UploadState::InProgress(percent)) => {
                    renewed = false;
                    on_progress(percent);
                }
                Ok(UploadState::Complete(video)) => return Ok(video),
                Ok(UploadState::Pending | UploadState::Failed(_)) => {}
                Err(e) if e.is_unauthorized() && !renewed => {
                    tracing::warn!(error = %e, "access token rejected, renewing credential");
                    current = credentials.renew_credential(&current).await?;
                    self.session.set_credential(&current);
                    renewed = true;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Builds upload requests and drives them through a transport
pub struct UploadDriver<T> {
    transport: T,
    retry: RetryPolicy,
}

impl<T: UploadTransport> UploadDriver<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Open the media and create the upload session
    pub async fn start(
        &self,
        credential: &Credential,
        request: &UploadRequest,
    ) -> Result<Upload<T::Session>, UploadError> {
        let media = MediaSource::open(&request.file).await?;
        tracing::info!(
            file = %media.path.display(),
            bytes = media.len,
            privacy = %request.privacy,
            "starting resumable upload"
        );

        let session = self
            .transport
            .insert(credential, &request.metadata(), media)
            .await?;
        Ok(Upload::new(session, self.retry))
    }

    /// Upload `request` and return the published video
    pub async fn upload(
        &self,
        credential: &Credential,
        request: &UploadRequest,
        on_progress: impl FnMut(u8),
    ) -> Result<PublishedVideo, UploadError> {
        self.start(credential, request).await?.run(on_progress).await
    }
}
