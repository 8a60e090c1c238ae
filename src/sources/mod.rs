pub mod webpage;
pub mod ytdlp;
pub mod ytmusic;

use anyhow::Result;

use crate::models::SearchResult;

/// Search filter understood by the metadata service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchFilter {
    Songs,
}

impl SearchFilter {
    /// Result type every item of a filtered search has.
    pub fn result_type(self) -> &'static str {
        match self {
            SearchFilter::Songs => "song",
        }
    }
}

/// Metadata search backend.
pub trait MetadataSource {
    /// Searches by free text. `None` means an unfiltered search.
    fn search(&self, query: &str, filter: Option<SearchFilter>) -> Result<Vec<SearchResult>>;
}

/// One strategy for turning a video id into a playable URL.
pub trait StreamSource {
    /// Short name used in logs.
    fn name(&self) -> &str;
    fn stream_url(&self, video_id: &str) -> Result<String>;
}
