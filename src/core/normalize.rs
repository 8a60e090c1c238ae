use anyhow::Result;
use url::Url;

use crate::models::{SearchResult, Song};

/// Reduces a raw search item to the flat record the desktop side consumes.
/// Anything that is not a playable song or video is dropped.
pub fn simplify_song(item: &SearchResult) -> Option<Song> {
    match item.result_type.as_deref() {
        Some("song") | Some("video") => {}
        _ => return None,
    }

    let video_id = item.video_id.as_deref().filter(|id| !id.is_empty())?;

    let artists = item
        .artists
        .iter()
        .map(|a| a.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    Some(Song {
        id: video_id.to_string(),
        video_id: video_id.to_string(),
        title: item.title.clone().unwrap_or_default(),
        artists,
        album: item.album.as_ref().map(|a| a.name.clone()),
        duration: item.duration.clone().or_else(|| item.length.clone()),
        thumbnail: item.thumbnails.last().map(|t| t.url.clone()),
    })
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Accepts a bare video id or a YouTube / YouTube Music link and returns
/// the id.
pub fn parse_video_id(input: &str) -> Result<String> {
    let input = input.trim();
    if is_valid_id(input) {
        return Ok(input.to_string());
    }

    let invalid = || anyhow::anyhow!("Invalid video id: {}", input);
    let url = Url::parse(input).map_err(|_| invalid())?;
    let host = url.host_str().unwrap_or_default();

    let id = match host {
        "youtu.be" => url
            .path_segments()
            .and_then(|mut s| s.next())
            .map(str::to_string),
        "youtube.com" | "www.youtube.com" | "m.youtube.com" | "music.youtube.com" => {
            let path = url.path();
            if path.starts_with("/watch") {
                url.query_pairs()
                    .find(|(k, _)| k == "v")
                    .map(|(_, v)| v.into_owned())
            } else if let Some(rest) = path
                .strip_prefix("/embed/")
                .or_else(|| path.strip_prefix("/shorts/"))
            {
                rest.split('/').next().map(str::to_string)
            } else {
                None
            }
        }
        _ => None,
    };

    id.filter(|id| is_valid_id(id)).ok_or_else(invalid)
}
