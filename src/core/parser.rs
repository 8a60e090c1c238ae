use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::models::{Album, Artist, SearchResult, Thumbnail};

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+:)*\d+:\d+$").unwrap());
static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{4}$").unwrap());
static VIEWS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d([^ ])* [^ ]*$").unwrap());

const SEPARATOR: &str = " • ";
const TYPE_LABELS: &[&str] = &[
    "song", "video", "album", "artist", "playlist", "episode", "podcast", "profile", "single",
    "ep",
];

/// Walks a JSON value along a path of object keys and array indices.
/// Numeric segments index arrays.
pub fn nav<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |cur, key| match key.parse::<usize>() {
        Ok(idx) => cur.get(idx),
        Err(_) => cur.get(*key),
    })
}

fn nav_str<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    nav(value, path).and_then(Value::as_str)
}

/// Parses an InnerTube search response into raw results.
///
/// `forced_type` is the result type implied by a search filter; it overrides
/// whatever the item itself says.
pub fn parse_search_response(response: &Value, forced_type: Option<&str>) -> Vec<SearchResult> {
    let sections = nav(
        response,
        &[
            "contents",
            "tabbedSearchResultsRenderer",
            "tabs",
            "0",
            "tabRenderer",
            "content",
            "sectionListRenderer",
            "contents",
        ],
    )
    .or_else(|| nav(response, &["contents", "sectionListRenderer", "contents"]))
    .and_then(Value::as_array);

    let Some(sections) = sections else {
        return Vec::new();
    };

    let mut results = Vec::new();
    for section in sections {
        if let Some(card) = section.get("musicCardShelfRenderer") {
            if let Some(top) = parse_top_result(card, forced_type) {
                results.push(top);
            }
            results.extend(parse_list_items(card.get("contents"), forced_type));
        } else if let Some(shelf) = section.get("musicShelfRenderer") {
            results.extend(parse_list_items(shelf.get("contents"), forced_type));
        }
    }
    results
}

fn parse_list_items(contents: Option<&Value>, forced_type: Option<&str>) -> Vec<SearchResult> {
    contents
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("musicResponsiveListItemRenderer"))
                .filter_map(|renderer| parse_list_item(renderer, forced_type))
                .collect()
        })
        .unwrap_or_default()
}

fn flex_column_runs<'a>(renderer: &'a Value, index: usize) -> &'a [Value] {
    let idx = index.to_string();
    nav(
        renderer,
        &[
            "flexColumns",
            idx.as_str(),
            "musicResponsiveListItemFlexColumnRenderer",
            "text",
            "runs",
        ],
    )
    .and_then(Value::as_array)
    .map(Vec::as_slice)
    .unwrap_or(&[])
}

/// Parses one `musicResponsiveListItemRenderer`. Returns `None` when the item
/// has no title column at all.
pub fn parse_list_item(renderer: &Value, forced_type: Option<&str>) -> Option<SearchResult> {
    let title_runs = flex_column_runs(renderer, 0);
    let title_run = title_runs.first()?;
    let subtitle_runs = flex_column_runs(renderer, 1);

    let watch_endpoint = nav(
        renderer,
        &[
            "overlay",
            "musicItemThumbnailOverlayRenderer",
            "content",
            "musicPlayButtonRenderer",
            "playNavigationEndpoint",
            "watchEndpoint",
        ],
    )
    .or_else(|| nav(title_run, &["navigationEndpoint", "watchEndpoint"]));

    let video_id = nav_str(renderer, &["playlistItemData", "videoId"])
        .or_else(|| watch_endpoint.and_then(|w| nav_str(w, &["videoId"])))
        .map(str::to_string);

    let length = nav_str(
        renderer,
        &[
            "fixedColumns",
            "0",
            "musicResponsiveListItemFixedColumnRenderer",
            "text",
            "runs",
            "0",
            "text",
        ],
    )
    .map(str::to_string);

    let result_type = detect_result_type(
        forced_type,
        watch_endpoint,
        subtitle_runs,
        renderer.get("navigationEndpoint"),
    );

    let mut result = SearchResult {
        result_type,
        video_id,
        title: title_run
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string),
        length,
        thumbnails: parse_thumbnails(renderer.get("thumbnail")),
        ..Default::default()
    };
    apply_subtitle_runs(&mut result, subtitle_runs, forced_type.is_none());
    Some(result)
}

fn parse_top_result(card: &Value, forced_type: Option<&str>) -> Option<SearchResult> {
    let title_run = nav(card, &["title", "runs", "0"])?;
    let subtitle_runs = nav(card, &["subtitle", "runs"])
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let watch_endpoint = nav(card, &["onTap", "watchEndpoint"])
        .or_else(|| nav(title_run, &["navigationEndpoint", "watchEndpoint"]));

    let result_type = detect_result_type(
        forced_type,
        watch_endpoint,
        subtitle_runs,
        title_run.get("navigationEndpoint"),
    );

    let mut result = SearchResult {
        result_type,
        video_id: watch_endpoint
            .and_then(|w| nav_str(w, &["videoId"]))
            .map(str::to_string),
        title: title_run
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string),
        thumbnails: parse_thumbnails(card.get("thumbnail")),
        ..Default::default()
    };
    apply_subtitle_runs(&mut result, subtitle_runs, forced_type.is_none());
    Some(result)
}

fn detect_result_type(
    forced_type: Option<&str>,
    watch_endpoint: Option<&Value>,
    subtitle_runs: &[Value],
    browse_endpoint: Option<&Value>,
) -> Option<String> {
    if let Some(t) = forced_type {
        return Some(t.to_string());
    }

    let video_type = watch_endpoint.and_then(|w| {
        nav_str(
            w,
            &[
                "watchEndpointMusicSupportedConfigs",
                "watchEndpointMusicConfig",
                "musicVideoType",
            ],
        )
    });
    match video_type {
        Some("MUSIC_VIDEO_TYPE_ATV") => return Some("song".to_string()),
        Some("MUSIC_VIDEO_TYPE_OMV" | "MUSIC_VIDEO_TYPE_UGC" | "MUSIC_VIDEO_TYPE_OFFICIAL_SOURCE_MUSIC") => {
            return Some("video".to_string())
        }
        _ => {}
    }

    if let Some(label) = subtitle_runs
        .first()
        .and_then(|r| r.get("text"))
        .and_then(Value::as_str)
        .map(str::to_lowercase)
        .filter(|l| TYPE_LABELS.contains(&l.as_str()))
    {
        return Some(label);
    }

    match browse_endpoint.and_then(page_type) {
        Some("MUSIC_PAGE_TYPE_ARTIST") => Some("artist".to_string()),
        Some("MUSIC_PAGE_TYPE_ALBUM") => Some("album".to_string()),
        Some("MUSIC_PAGE_TYPE_PLAYLIST") => Some("playlist".to_string()),
        _ => None,
    }
}

fn page_type(endpoint: &Value) -> Option<&str> {
    nav_str(
        endpoint,
        &[
            "browseEndpoint",
            "browseEndpointContextSupportedConfigs",
            "browseEndpointContextMusicConfig",
            "pageType",
        ],
    )
}

/// Reads artists, album and duration out of the subtitle runs.
fn apply_subtitle_runs(result: &mut SearchResult, runs: &[Value], may_have_label: bool) {
    let mut runs = runs
        .iter()
        .filter(|r| r.get("text").and_then(Value::as_str) != Some(SEPARATOR))
        .peekable();

    if may_have_label {
        let has_label = runs
            .peek()
            .and_then(|r| r.get("text"))
            .and_then(Value::as_str)
            .is_some_and(|t| TYPE_LABELS.contains(&t.to_lowercase().as_str()));
        if has_label {
            runs.next();
        }
    }

    for (i, run) in runs.enumerate() {
        let Some(text) = run.get("text").and_then(Value::as_str) else {
            continue;
        };
        let text = text.trim();
        if text.is_empty() {
            continue;
        }

        if let Some(endpoint) = run.get("navigationEndpoint") {
            match page_type(endpoint) {
                Some("MUSIC_PAGE_TYPE_ALBUM") => {
                    result.album = Some(Album {
                        name: text.to_string(),
                    });
                }
                Some("MUSIC_PAGE_TYPE_ARTIST" | "MUSIC_PAGE_TYPE_USER_CHANNEL") => {
                    result.artists.push(Artist {
                        name: text.to_string(),
                    });
                }
                _ => {}
            }
            continue;
        }

        if DURATION_RE.is_match(text) {
            result.duration = Some(text.to_string());
        } else if YEAR_RE.is_match(text) || (i > 0 && VIEWS_RE.is_match(text)) {
            // years and view counts are not part of the record
        } else {
            result.artists.push(Artist {
                name: text.to_string(),
            });
        }
    }
}

fn parse_thumbnails(thumbnail: Option<&Value>) -> Vec<Thumbnail> {
    thumbnail
        .and_then(|t| nav(t, &["musicThumbnailRenderer", "thumbnail", "thumbnails"]))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|t| {
                    Some(Thumbnail {
                        url: t.get("url")?.as_str()?.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}
