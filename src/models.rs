//! Data models for the Google Photos Library and Picker APIs.

use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{PhotosError, Result};

/// Google's JSON encoding of `google.protobuf.Duration`, e.g. `"5s"` or `"1.5s"`.
static DURATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)(?:\.(\d{1,9}))?s$").expect("Invalid duration regex")
});

/// What kind of bytes a media reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
    Unspecified,
}

/// A remote file to fetch: a base URL plus the name to store it under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    pub id: String,
    pub base_url: String,
    pub filename: String,
    pub mime_type: Option<String>,
    pub kind: MediaKind,
}

impl MediaRef {
    /// URL that returns the original bytes rather than a resized rendition.
    pub fn download_url(&self) -> String {
        match self.kind {
            MediaKind::Video => format!("{}=dv", self.base_url),
            MediaKind::Photo | MediaKind::Unspecified => format!("{}=d", self.base_url),
        }
    }

    /// Name of the file to write inside the download folder.
    ///
    /// Only the last path component of the remote filename is used, so a
    /// server-provided name can never escape the folder. When the name has no
    /// extension one is derived from the MIME type.
    pub fn local_file_name(&self) -> Result<String> {
        let base = self
            .filename
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .trim();

        if base.is_empty() || base == "." || base == ".." {
            return Err(PhotosError::InvalidFilename(self.filename.clone()));
        }

        if std::path::Path::new(base).extension().is_some() {
            return Ok(base.to_string());
        }

        match self.mime_type.as_deref().and_then(extension_for_mime) {
            Some(ext) => Ok(format!("{}.{}", base, ext)),
            None => Ok(base.to_string()),
        }
    }
}

/// Pick a file extension for a MIME type, preferring one named after the subtype.
fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let exts = mime_guess::get_mime_extensions_str(mime)?;
    let subtype = mime.split('/').nth(1).unwrap_or_default();
    exts.iter()
        .find(|ext| ext.eq_ignore_ascii_case(subtype))
        .or_else(|| exts.first())
        .copied()
}

/// Parse a Google JSON duration string such as `"5s"` or `"1800.25s"`.
pub fn parse_duration(value: &str) -> Result<Duration> {
    let caps = DURATION_REGEX
        .captures(value.trim())
        .ok_or_else(|| PhotosError::InvalidDuration(value.to_string()))?;

    let secs: u64 = caps[1]
        .parse()
        .map_err(|_| PhotosError::InvalidDuration(value.to_string()))?;

    let nanos = match caps.get(2) {
        Some(frac) => {
            // Right-pad to nine digits: "25" -> 250_000_000ns.
            let padded = format!("{:0<9}", frac.as_str());
            padded
                .parse::<u32>()
                .map_err(|_| PhotosError::InvalidDuration(value.to_string()))?
        }
        None => 0,
    };

    Ok(Duration::new(secs, nanos))
}

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Option<Duration>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    match opt {
        Some(s) => parse_duration(&s).map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// Format bytes into human-readable size.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// Library API (mediaItems:search)

/// A media item from the Library API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub id: String,
    pub base_url: String,
    pub filename: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub media_metadata: Option<MediaMetadata>,
}

/// Metadata attached to a Library API media item. Exactly one of `photo`
/// and `video` is normally present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMetadata {
    #[serde(default)]
    pub creation_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub photo: Option<serde_json::Value>,
    #[serde(default)]
    pub video: Option<serde_json::Value>,
}

impl From<MediaItem> for MediaRef {
    fn from(item: MediaItem) -> Self {
        let kind = match item.media_metadata {
            Some(MediaMetadata { video: Some(_), .. }) => MediaKind::Video,
            Some(MediaMetadata { photo: Some(_), .. }) => MediaKind::Photo,
            _ => MediaKind::Unspecified,
        };
        MediaRef {
            id: item.id,
            base_url: item.base_url,
            filename: item.filename,
            mime_type: item.mime_type,
            kind,
        }
    }
}

/// Response from the mediaItems:search endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItemsResponse {
    #[serde(default)]
    pub media_items: Vec<MediaItem>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

// Picker API

/// A picker session as returned by `sessions.create` and `sessions.get`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickingSession {
    pub id: String,
    #[serde(default)]
    pub picker_uri: Option<String>,
    #[serde(default)]
    pub polling_config: Option<PollingConfig>,
    #[serde(default)]
    pub media_items_set: bool,
    #[serde(default)]
    pub expire_time: Option<DateTime<Utc>>,
}

/// Server hints for how often and how long to poll a session.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollingConfig {
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub poll_interval: Option<Duration>,
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub timeout_in: Option<Duration>,
}

/// A media item the user picked.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickedMediaItem {
    pub id: String,
    #[serde(default)]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default, rename = "type")]
    pub media_type: Option<String>,
    pub media_file: PickedMediaFile,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickedMediaFile {
    pub base_url: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    pub filename: String,
}

impl From<PickedMediaItem> for MediaRef {
    fn from(item: PickedMediaItem) -> Self {
        let kind = match item.media_type.as_deref() {
            Some("PHOTO") => MediaKind::Photo,
            Some("VIDEO") => MediaKind::Video,
            _ => MediaKind::Unspecified,
        };
        MediaRef {
            id: item.id,
            base_url: item.media_file.base_url,
            filename: item.media_file.filename,
            mime_type: item.media_file.mime_type,
            kind,
        }
    }
}

/// Response from the picker `mediaItems.list` endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickedMediaItemsResponse {
    #[serde(default)]
    pub media_items: Vec<PickedMediaItem>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

// OAuth

/// Contents of a Google OAuth client `credentials.json`.
#[derive(Debug, Deserialize)]
pub struct ClientSecretsFile {
    pub installed: Option<ClientSecrets>,
    pub web: Option<ClientSecrets>,
}

/// OAuth client identity and endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: Option<String>,
    pub token_uri: Option<String>,
}

/// OAuth2 token response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Google API error response.
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    pub code: u16,
    pub message: String,
}
