use anyhow::Result;

use crate::core::normalize;
use crate::models::Song;
use crate::sources::{MetadataSource, SearchFilter};

/// Searches songs first and falls back to an unfiltered search when the
/// filtered one comes back empty. Items that cannot be normalized are
/// dropped.
pub fn search_songs(source: &dyn MetadataSource, query: &str) -> Result<Vec<Song>> {
    let mut results = source.search(query, Some(SearchFilter::Songs))?;
    if results.is_empty() {
        log::info!("no song results for '{}', retrying unfiltered", query);
        results = source.search(query, None)?;
    }

    Ok(results.iter().filter_map(normalize::simplify_song).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SearchResult;
    use std::cell::RefCell;

    struct FakeSource {
        songs: Vec<SearchResult>,
        everything: Vec<SearchResult>,
        fail: bool,
        calls: RefCell<Vec<Option<SearchFilter>>>,
    }

    impl FakeSource {
        fn new(songs: Vec<SearchResult>, everything: Vec<SearchResult>) -> Self {
            Self {
                songs,
                everything,
                fail: false,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl MetadataSource for FakeSource {
        fn search(&self, _query: &str, filter: Option<SearchFilter>) -> Result<Vec<SearchResult>> {
            self.calls.borrow_mut().push(filter);
            if self.fail {
                anyhow::bail!("HTTP status client error (401 Unauthorized)");
            }
            Ok(match filter {
                Some(_) => self.songs.clone(),
                None => self.everything.clone(),
            })
        }
    }

    fn result(result_type: &str, video_id: Option<&str>) -> SearchResult {
        SearchResult {
            result_type: Some(result_type.to_string()),
            video_id: video_id.map(str::to_string),
            title: Some("t".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_filtered_results_used() {
        let source = FakeSource::new(vec![result("song", Some("a"))], vec![result("video", Some("b"))]);
        let songs = search_songs(&source, "q").unwrap();
        assert_eq!(songs.len(), 1);
        assert_eq!(songs[0].video_id, "a");
        assert_eq!(*source.calls.borrow(), vec![Some(SearchFilter::Songs)]);
    }

    #[test]
    fn test_unfiltered_fallback() {
        let source = FakeSource::new(
            Vec::new(),
            vec![
                result("artist", Some("x")),
                result("video", Some("b")),
                result("song", None),
                result("song", Some("c")),
            ],
        );
        let songs = search_songs(&source, "q").unwrap();
        let ids: Vec<&str> = songs.iter().map(|s| s.video_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(*source.calls.borrow(), vec![Some(SearchFilter::Songs), None]);
        assert!(songs.iter().all(|s| !s.video_id.is_empty() && s.id == s.video_id));
    }

    #[test]
    fn test_filtered_items_all_dropped_does_not_refetch() {
        let source = FakeSource::new(vec![result("song", None)], vec![result("song", Some("z"))]);
        assert!(search_songs(&source, "q").unwrap().is_empty());
        assert_eq!(source.calls.borrow().len(), 1);
    }

    #[test]
    fn test_source_error_propagates() {
        let mut source = FakeSource::new(Vec::new(), Vec::new());
        source.fail = true;
        let err = search_songs(&source, "q").unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}
