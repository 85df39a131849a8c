use crate::error::UploadError;
use crate::metadata::VideoMetadata;
use crate::upload::{
    ChunkOutcome, MediaSource, UploadProgress, UploadSession, UploadTransport, UploadedVideo,
};
use reqwest::header::{AUTHORIZATION, CONTENT_RANGE, CONTENT_TYPE, HeaderMap, LOCATION, RANGE};
use std::io::SeekFrom;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use yt_oauth::Credential;

/// Default base address of the upload API
pub const DEFAULT_API_ADDRESS: &str = "https://www.googleapis.com";

/// Chunk sizes must be multiples of this many bytes
pub const CHUNK_ALIGNMENT: u64 = 256 * 1024;

pub const DEFAULT_CHUNK_SIZE: u64 = 8 * 1024 * 1024;

/// Largest chunk sent in one request
pub const MAX_CHUNK_SIZE: u64 = 1024 * 1024 * 1024;

/// HTTP status the upload API uses for "chunk stored, send more"
const RESUME_INCOMPLETE: u16 = 308;

/// YouTube Data API v3 resumable upload transport
#[derive(Debug, Clone)]
pub struct YouTubeTransport {
    http: reqwest::Client,
    api_address: String,
    chunk_size: u64,
}

impl YouTubeTransport {
    pub fn new(api_address: impl Into<String>) -> Result<Self, UploadError> {
        // 308 is part of the upload protocol, not a redirect to follow
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            http,
            api_address: api_address.into().trim_end_matches('/').to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    /// Use `UPLOAD_API_ADDRESS` from the environment, or the public API
    pub fn from_env() -> Result<Self, UploadError> {
        let api_address = std::env::var("UPLOAD_API_ADDRESS")
            .unwrap_or_else(|_| DEFAULT_API_ADDRESS.to_string());
        Self::new(api_address)
    }

    /// Set the chunk size, capped at [`MAX_CHUNK_SIZE`] and rounded up to a
    /// multiple of [`CHUNK_ALIGNMENT`]
    pub fn with_chunk_size(mut self, bytes: u64) -> Self {
        let bytes = bytes.clamp(1, MAX_CHUNK_SIZE);
        self.chunk_size = bytes.div_ceil(CHUNK_ALIGNMENT) * CHUNK_ALIGNMENT;
        self
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }
}

impl UploadTransport for YouTubeTransport {
    type Session = YouTubeUploadSession;

    async fn insert(
        &self,
        credential: &Credential,
        metadata: &VideoMetadata,
        media: MediaSource,
    ) -> Result<YouTubeUploadSession, UploadError> {
        let url = format!("{}/upload/youtube/v3/videos", self.api_address);
        let authorization = credential.authorization_header();

        let response = self
            .http
            .post(&url)
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .header(AUTHORIZATION, &authorization)
            .header("X-Upload-Content-Type", &media.mime_type)
            .header("X-Upload-Content-Length", media.len.to_string())
            .json(metadata)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(UploadError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let session_uri = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                UploadError::MalformedResponse("no upload session URI in response".to_string())
            })?
            .to_string();

        tracing::debug!(%session_uri, "resumable upload session created");

        let file = tokio::fs::File::open(&media.path)
            .await
            .map_err(|source| UploadError::Media {
                path: media.path.clone(),
                source,
            })?;

        Ok(YouTubeUploadSession {
            http: self.http.clone(),
            session_uri,
            authorization,
            media,
            file,
            offset: 0,
            chunk_size: self.chunk_size,
        })
    }
}

/// Resumable upload session identified by its session URI
pub struct YouTubeUploadSession {
    http: reqwest::Client,
    session_uri: String,
    authorization: String,
    media: MediaSource,
    file: tokio::fs::File,
    offset: u64,
    chunk_size: u64,
}

impl YouTubeUploadSession {
    fn media_error(&self, source: std::io::Error) -> UploadError {
        UploadError::Media {
            path: self.media.path.clone(),
            source,
        }
    }

    async fn read_chunk(&mut self) -> Result<Vec<u8>, UploadError> {
        let len = self.chunk_size.min(self.media.len.saturating_sub(self.offset));
        let mut chunk = vec![0; len as usize];

        self.file
            .seek(SeekFrom::Start(self.offset))
            .await
            .map_err(|e| self.media_error(e))?;
        self.file
            .read_exact(&mut chunk)
            .await
            .map_err(|e| self.media_error(e))?;

        Ok(chunk)
    }

    async fn put(&self, content_range: String, body: Vec<u8>) -> Result<ChunkOutcome, UploadError> {
        let response = self
            .http
            .put(&self.session_uri)
            .header(AUTHORIZATION, &self.authorization)
            .header(CONTENT_TYPE, &self.media.mime_type)
            .header(CONTENT_RANGE, content_range)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == RESUME_INCOMPLETE {
            let bytes_sent = persisted_bytes(response.headers())?;
            return Ok(ChunkOutcome::Progress(UploadProgress {
                bytes_sent,
                total_bytes: self.media.len,
            }));
        }

        let body = response.text().await?;
        if !status.is_success() {
            return Err(UploadError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let video: UploadedVideo = serde_json::from_str(&body)
            .map_err(|e| UploadError::MalformedResponse(e.to_string()))?;
        Ok(ChunkOutcome::Complete(video))
    }

    fn record(&mut self, outcome: &ChunkOutcome) {
        self.offset = match outcome {
            ChunkOutcome::Progress(progress) => progress.bytes_sent,
            ChunkOutcome::Complete(_) => self.media.len,
        };
    }
}

impl UploadSession for YouTubeUploadSession {
    async fn next_chunk(&mut self) -> Result<ChunkOutcome, UploadError> {
        let total = self.media.len;
        let chunk = self.read_chunk().await?;

        let content_range = if chunk.is_empty() {
            format!("bytes */{}", total)
        } else {
            let last = self.offset + chunk.len() as u64 - 1;
            format!("bytes {}-{}/{}", self.offset, last, total)
        };

        let outcome = self.put(content_range, chunk).await?;
        self.record(&outcome);
        Ok(outcome)
    }

    async fn resume(&mut self) -> Result<ChunkOutcome, UploadError> {
        tracing::debug!(session_uri = %self.session_uri, "querying upload status");

        let outcome = self
            .put(format!("bytes */{}", self.media.len), Vec::new())
            .await?;
        self.record(&outcome);
        Ok(outcome)
    }

    fn set_credential(&mut self, credential: &Credential) {
        self.authorization = credential.authorization_header();
    }

    fn session_uri(&self) -> Option<&str> {
        Some(&self.session_uri)
    }
}

/// Bytes the server holds, from a `Range: bytes=0-N` header (absent means none)
fn persisted_bytes(headers: &HeaderMap) -> Result<u64, UploadError> {
    let Some(value) = headers.get(RANGE) else {
        return Ok(0);
    };

    value
        .to_str()
        .ok()
        .and_then(parse_range_end)
        .map(|last| last + 1)
        .ok_or_else(|| {
            UploadError::MalformedResponse(format!("unexpected Range header {:?}", value))
        })
}

fn parse_range_end(value: &str) -> Option<u64> {
    let (_, last) = value.trim().strip_prefix("bytes=")?.split_once('-')?;
    last.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::UploadRequest;
    use crate::upload::{RetryPolicy, UploadDriver};
    use axum::body::Bytes;
    use axum::extract::{Query, State};
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::{post, put};
    use axum::{Json, Router};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeApi {
        session_uri: String,
        received: Vec<u8>,
        total: Option<u64>,
        metadata: Option<serde_json::Value>,
        ranges: Vec<String>,
        reject_insert: bool,
        accepted_token: String,
    }

    fn bearer(headers: &axum::http::HeaderMap) -> Option<&str> {
        headers.get("authorization").and_then(|v| v.to_str().ok())
    }

    type Shared = Arc<Mutex<FakeApi>>;

    async fn insert_video(
        State(api): State<Shared>,
        Query(query): Query<HashMap<String, String>>,
        headers: axum::http::HeaderMap,
        Json(metadata): Json<serde_json::Value>,
    ) -> Response {
        let mut api = api.lock().unwrap();
        if api.reject_insert {
            return (StatusCode::FORBIDDEN, r#"{"error":{"errors":[{"reason":"quotaExceeded"}]}}"#)
                .into_response();
        }
        if query.get("uploadType").map(String::as_str) != Some("resumable")
            || bearer(&headers) != Some("Bearer ya29.token")
        {
            return StatusCode::BAD_REQUEST.into_response();
        }

        api.total = headers
            .get("x-upload-content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        api.metadata = Some(metadata);
        (StatusCode::OK, [("location", api.session_uri.clone())]).into_response()
    }

    async fn put_chunk(
        State(api): State<Shared>,
        headers: axum::http::HeaderMap,
        body: Bytes,
    ) -> Response {
        let mut api = api.lock().unwrap();
        if bearer(&headers) != Some(api.accepted_token.as_str()) {
            return (StatusCode::UNAUTHORIZED, "Invalid Credentials").into_response();
        }
        let range = headers
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        api.ranges.push(range.clone());

        if !range.starts_with("bytes */") {
            let start: usize = range
                .strip_prefix("bytes ")
                .and_then(|r| r.split('-').next())
                .and_then(|s| s.parse().ok())
                .unwrap_or(usize::MAX);
            if start != api.received.len() {
                return StatusCode::BAD_REQUEST.into_response();
            }
            api.received.extend_from_slice(&body);
        }

        let total = api.total.unwrap_or_default() as usize;
        if api.received.len() < total {
            if api.received.is_empty() {
                return StatusCode::PERMANENT_REDIRECT.into_response();
            }
            let header = format!("bytes=0-{}", api.received.len() - 1);
            return (StatusCode::PERMANENT_REDIRECT, [("range", header)]).into_response();
        }

        (
            StatusCode::OK,
            Json(serde_json::json!({"kind": "youtube#video", "id": "abc123"})),
        )
            .into_response()
    }

    async fn spawn_api(reject_insert: bool) -> (String, Shared) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let api = Arc::new(Mutex::new(FakeApi {
            session_uri: format!("http://{}/upload/session", addr),
            reject_insert,
            accepted_token: "Bearer ya29.token".to_string(),
            ..Default::default()
        }));

        let app = Router::new()
            .route("/upload/youtube/v3/videos", post(insert_video))
            .route("/upload/session", put(put_chunk))
            .with_state(api.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (format!("http://{}", addr), api)
    }

    fn credential() -> Credential {
        Credential {
            access_token: "ya29.token".to_string(),
            refresh_token: None,
            token_type: "Bearer".to_string(),
            expires_at: u64::MAX,
            scopes: vec![yt_oauth::YOUTUBE_UPLOAD_SCOPE.to_string()],
        }
    }

    fn video_file(dir: &tempfile::TempDir, len: usize) -> (std::path::PathBuf, Vec<u8>) {
        let content: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let path = dir.path().join("demo.webm");
        std::fs::write(&path, &content).unwrap();
        (path, content)
    }

    #[test]
    fn chunk_size_is_aligned() {
        let transport = YouTubeTransport::new(DEFAULT_API_ADDRESS).unwrap();
        assert_eq!(transport.chunk_size(), DEFAULT_CHUNK_SIZE);
        assert_eq!(transport.clone().with_chunk_size(1).chunk_size(), CHUNK_ALIGNMENT);
        assert_eq!(
            transport.clone().with_chunk_size(CHUNK_ALIGNMENT + 1).chunk_size(),
            2 * CHUNK_ALIGNMENT
        );
        assert_eq!(transport.with_chunk_size(u64::MAX).chunk_size(), MAX_CHUNK_SIZE);
    }

    #[test]
    fn range_header_parsing() {
        assert_eq!(parse_range_end("bytes=0-262143"), Some(262_143));
        assert_eq!(parse_range_end(" bytes=0-9 "), Some(9));
        assert_eq!(parse_range_end("0-9"), None);
        assert_eq!(parse_range_end("bytes=0-"), None);
    }

    #[tokio::test]
    async fn uploads_file_in_chunks() {
        let (address, api) = spawn_api(false).await;
        let dir = tempfile::tempdir().unwrap();
        let (path, content) = video_file(&dir, 640 * 1024);

        let transport = YouTubeTransport::new(address)
            .unwrap()
            .with_chunk_size(CHUNK_ALIGNMENT);
        let driver = UploadDriver::new(transport).with_retry(RetryPolicy::none());
        let request = UploadRequest::new(&path, "Demo #Shorts");

        let mut reported = Vec::new();
        let video = driver
            .upload(&credential(), &request, |p| reported.push(p))
            .await
            .unwrap();

        assert_eq!(video.url, "https://www.youtube.com/watch?v=abc123");
        assert_eq!(reported, vec![40, 80]);

        let api = api.lock().unwrap();
        assert_eq!(api.received, content);
        assert_eq!(
            api.ranges,
            vec![
                "bytes 0-262143/655360",
                "bytes 262144-524287/655360",
                "bytes 524288-655359/655360",
            ]
        );
        let metadata = api.metadata.as_ref().unwrap();
        assert_eq!(metadata["snippet"]["title"], "Demo #Shorts");
        assert_eq!(metadata["snippet"]["categoryId"], "20");
        assert_eq!(metadata["status"]["privacyStatus"], "public");
    }

    #[tokio::test]
    async fn renewed_credential_authorizes_later_chunks() {
        let (address, api) = spawn_api(false).await;
        let dir = tempfile::tempdir().unwrap();
        let (path, content) = video_file(&dir, 300 * 1024);

        let transport = YouTubeTransport::new(address)
            .unwrap()
            .with_chunk_size(CHUNK_ALIGNMENT);
        let media = MediaSource::open(&path).await.unwrap();
        let metadata = UploadRequest::new(&path, "Demo").metadata();
        let mut session = transport
            .insert(&credential(), &metadata, media)
            .await
            .unwrap();

        // The access token expires mid-upload
        api.lock().unwrap().accepted_token = "Bearer ya29.renewed".to_string();
        let err = session.next_chunk().await.unwrap_err();
        assert!(err.is_unauthorized());

        session.set_credential(&Credential {
            access_token: "ya29.renewed".to_string(),
            ..credential()
        });
        assert!(matches!(
            session.resume().await.unwrap(),
            ChunkOutcome::Progress(UploadProgress { bytes_sent: 0, .. })
        ));
        assert!(matches!(
            session.next_chunk().await.unwrap(),
            ChunkOutcome::Progress(_)
        ));
        assert!(matches!(
            session.next_chunk().await.unwrap(),
            ChunkOutcome::Complete(_)
        ));
        assert_eq!(api.lock().unwrap().received, content);
    }

    #[tokio::test]
    async fn resume_reports_server_offset() {
        let (address, _api) = spawn_api(false).await;
        let dir = tempfile::tempdir().unwrap();
        let (path, _) = video_file(&dir, 300 * 1024);

        let transport = YouTubeTransport::new(address)
            .unwrap()
            .with_chunk_size(CHUNK_ALIGNMENT);
        let media = MediaSource::open(&path).await.unwrap();
        let metadata = UploadRequest::new(&path, "Demo").metadata();
        let mut session = transport
            .insert(&credential(), &metadata, media)
            .await
            .unwrap();
        assert!(session.session_uri().unwrap().ends_with("/upload/session"));

        let fresh = session.resume().await.unwrap();
        assert_eq!(
            fresh,
            ChunkOutcome::Progress(UploadProgress {
                bytes_sent: 0,
                total_bytes: 300 * 1024
            })
        );

        session.next_chunk().await.unwrap();
        let resumed = session.resume().await.unwrap();
        assert_eq!(
            resumed,
            ChunkOutcome::Progress(UploadProgress {
                bytes_sent: CHUNK_ALIGNMENT,
                total_bytes: 300 * 1024
            })
        );

        let done = session.next_chunk().await.unwrap();
        assert_eq!(
            done,
            ChunkOutcome::Complete(UploadedVideo {
                id: "abc123".to_string()
            })
        );
    }

    #[tokio::test]
    async fn rejected_insert_surfaces_api_error() {
        let (address, _api) = spawn_api(true).await;
        let dir = tempfile::tempdir().unwrap();
        let (path, _) = video_file(&dir, 10);

        let driver = UploadDriver::new(YouTubeTransport::new(address).unwrap());
        let err = driver
            .upload(&credential(), &UploadRequest::new(&path, "Demo"), |_| {})
            .await
            .unwrap_err();

        match err {
            UploadError::Api { status, body } => {
                assert_eq!(status, 403);
                assert!(body.contains("quotaExceeded"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
