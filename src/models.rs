use serde::{Deserialize, Serialize};

/// Simplified song record emitted by `search`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Song {
    pub id: String,
    #[serde(rename = "videoId")]
    pub video_id: String,
    pub title: String,
    pub artists: String,
    pub album: Option<String>,
    pub duration: Option<String>,
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Artist {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Album {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Thumbnail {
    pub url: String,
}

/// One raw item from a search response, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResult {
    pub result_type: Option<String>,
    pub video_id: Option<String>,
    pub title: Option<String>,
    pub artists: Vec<Artist>,
    pub album: Option<Album>,
    pub duration: Option<String>,
    pub length: Option<String>,
    pub thumbnails: Vec<Thumbnail>,
}

/// Subset of `yt-dlp --dump-single-json` output.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoInfo {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub formats: Vec<Format>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Format {
    #[serde(default)]
    pub format_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub abr: Option<f64>,
}

impl Format {
    pub fn is_audio_only(&self) -> bool {
        self.acodec.as_deref().is_some_and(|a| !a.is_empty() && a != "none")
            && self.vcodec.as_deref() == Some("none")
    }
}

/// Subset of an InnerTube player response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResponse {
    #[serde(default)]
    pub playability_status: Option<PlayabilityStatus>,
    #[serde(default)]
    pub streaming_data: Option<StreamingData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayabilityStatus {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingData {
    #[serde(default)]
    pub formats: Vec<PlayerFormat>,
    #[serde(default)]
    pub adaptive_formats: Vec<PlayerFormat>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerFormat {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// The single JSON object written to stdout.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Results { results: Vec<Song> },
    StreamUrl { stream_url: String },
    Error { error: String },
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            error: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!("{{\"error\":\"Failed to encode response: {}\"}}", e))
    }
}
