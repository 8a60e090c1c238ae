use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use scraper::{Html, Selector};
use serde::de::DeserializeOwned;

use crate::config::NetworkConfig;
use crate::core::formats;
use crate::models::PlayerResponse;
use crate::sources::StreamSource;

static INLINE_RESPONSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ytInitialPlayerResponse\s*=\s*\{").unwrap());
static EMBEDDED_RESPONSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""embedded_player_response"\s*:\s*""#).unwrap());

/// 임베드 플레이어 페이지 스크래핑 클라이언트.
/// 페이지에 포함된 player response JSON에서 오디오 포맷 URL을 찾는다.
pub struct EmbedPageClient {
    client: reqwest::blocking::Client,
}

impl EmbedPageClient {
    /// 브라우저 User-Agent와 짧은 타임아웃을 가진 클라이언트를 만든다.
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.page_timeout_secs))
            .build()
            .context("cannot build embed page HTTP client")?;

        Ok(Self { client })
    }

    fn fetch_page(&self, video_id: &str) -> Result<String> {
        let url = format!("https://www.youtube.com/embed/{}", video_id);
        self.client
            .get(&url)
            .send()
            .context("embed page request could not be sent")?
            .error_for_status()
            .context("embed page request was rejected")?
            .text()
            .context("embed page body could not be read")
    }
}

/// Decodes the first JSON value starting at `text`; trailing script is
/// ignored.
fn first_json_value<T: DeserializeOwned>(text: &str) -> Option<T> {
    serde_json::Deserializer::from_str(text)
        .into_iter::<T>()
        .next()
        .and_then(|r| r.ok())
}

/// Finds the player response embedded in a player page, either as an inline
/// `ytInitialPlayerResponse` object or as a JSON-encoded string.
pub fn extract_player_response(html: &str) -> Option<PlayerResponse> {
    let document = Html::parse_document(html);
    let script_sel = Selector::parse("script").ok()?;

    for script in document.select(&script_sel) {
        let body: String = script.text().collect();

        if let Some(m) = INLINE_RESPONSE_RE.find(&body) {
            if let Some(resp) = first_json_value::<PlayerResponse>(&body[m.end() - 1..]) {
                return Some(resp);
            }
        }

        if let Some(m) = EMBEDDED_RESPONSE_RE.find(&body) {
            let encoded = first_json_value::<String>(&body[m.end() - 1..]);
            if let Some(resp) = encoded.and_then(|s| serde_json::from_str(&s).ok()) {
                return Some(resp);
            }
        }
    }
    None
}

impl StreamSource for EmbedPageClient {
    fn name(&self) -> &str {
        "embed page"
    }

    fn stream_url(&self, video_id: &str) -> Result<String> {
        let html = self.fetch_page(video_id)?;
        let player =
            extract_player_response(&html).context("no player response found in embed page")?;
        formats::select_audio_url(&player).context("embed page has no audio format with a URL")
    }
}
