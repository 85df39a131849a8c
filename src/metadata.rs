use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Tags used when the caller supplies none
pub const DEFAULT_TAGS: [&str; 4] = ["Future Buddy", "gamedev", "indie", "demo"];

/// YouTube "Gaming" category
pub const GAMING_CATEGORY_ID: &str = "20";

/// Token marking a video as a YouTube Short
pub const SHORTS_MARKER: &str = "#Shorts";

const WATCH_URL_PREFIX: &str = "https://www.youtube.com/watch?v=";

/// Visibility of the published video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    #[default]
    Public,
    Private,
    Unlisted,
}

impl fmt::Display for Privacy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Privacy::Public => "public",
            Privacy::Private => "private",
            Privacy::Unlisted => "unlisted",
        })
    }
}

/// Everything needed to upload one video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub file: PathBuf,
    pub title: String,
    pub description: String,
    /// `None` or an empty list selects [`DEFAULT_TAGS`]
    pub tags: Option<Vec<String>>,
    pub category_id: String,
    pub privacy: Privacy,
    pub made_for_kids: bool,
}

impl UploadRequest {
    pub fn new(file: impl Into<PathBuf>, title: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            title: title.into(),
            description: String::new(),
            tags: None,
            category_id: GAMING_CATEGORY_ID.to_string(),
            privacy: Privacy::default(),
            made_for_kids: false,
        }
    }

    /// Resource body sent with the insert request
    pub fn metadata(&self) -> VideoMetadata {
        VideoMetadata {
            snippet: Snippet {
                title: self.title.clone(),
                description: self.description.clone(),
                tags: effective_tags(self.tags.as_deref()),
                category_id: self.category_id.clone(),
            },
            status: Status {
                privacy_status: self.privacy,
                self_declared_made_for_kids: self.made_for_kids,
            },
        }
    }
}

/// `snippet` and `status` parts of a YouTube video resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub snippet: Snippet,
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub privacy_status: Privacy,
    pub self_declared_made_for_kids: bool,
}

/// Caller tags when any were given, otherwise [`DEFAULT_TAGS`]
pub fn effective_tags(tags: Option<&[String]>) -> Vec<String> {
    match tags {
        Some(tags) if !tags.is_empty() => tags.to_vec(),
        _ => DEFAULT_TAGS.iter().map(|t| t.to_string()).collect(),
    }
}

/// Append [`SHORTS_MARKER`] unless the title already carries it
pub fn shorts_title(title: &str) -> String {
    if title.contains(SHORTS_MARKER) {
        title.to_string()
    } else {
        format!("{} {}", title, SHORTS_MARKER)
    }
}

pub fn watch_url(video_id: &str) -> String {
    format!("{}{}", WATCH_URL_PREFIX, video_id)
}
