use std::cmp::Ordering;

use crate::models::{Format, PlayerResponse, VideoInfo};

fn has_url(url: &Option<String>) -> bool {
    url.as_deref().is_some_and(|u| !u.is_empty())
}

fn by_abr_desc(a: &&Format, b: &&Format) -> Ordering {
    let a = a.abr.unwrap_or(0.0);
    let b = b.abr.unwrap_or(0.0);
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// Picks a stream URL out of yt-dlp's info JSON.
///
/// Order: the selected format's top-level `url`, then the audio-only format
/// with the highest `abr`, then any format with a URL (again by `abr`).
pub fn select_stream_url(info: &VideoInfo) -> Option<String> {
    if has_url(&info.url) {
        return info.url.clone();
    }

    let mut audio: Vec<&Format> = info
        .formats
        .iter()
        .filter(|f| f.is_audio_only() && has_url(&f.url))
        .collect();
    audio.sort_by(by_abr_desc);
    if let Some(best) = audio.first() {
        log::debug!("audio-only format {}", format_label(best));
        return best.url.clone();
    }

    let mut any: Vec<&Format> = info.formats.iter().filter(|f| has_url(&f.url)).collect();
    any.sort_by(by_abr_desc);
    let best = any.first()?;
    log::debug!("fallback format {}", format_label(best));
    best.url.clone()
}

fn format_label(format: &Format) -> &str {
    format.format_id.as_deref().unwrap_or("?")
}

/// First `audio/*` format with a plain URL, adaptive formats first.
/// Cipher-protected formats carry no `url` and are skipped.
pub fn select_audio_url(player: &PlayerResponse) -> Option<String> {
    let data = player.streaming_data.as_ref()?;
    data.adaptive_formats
        .iter()
        .chain(data.formats.iter())
        .find(|f| f.mime_type.starts_with("audio/") && has_url(&f.url))
        .and_then(|f| f.url.clone())
}
