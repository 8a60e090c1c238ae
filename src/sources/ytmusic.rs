use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};
use sha1::{Digest, Sha1};

use crate::config::Config;
use crate::core::{formats, parser};
use crate::models::{PlayerResponse, SearchResult};
use crate::sources::{MetadataSource, SearchFilter, StreamSource};

const API_BASE: &str = "https://music.youtube.com/youtubei/v1";
const ORIGIN: &str = "https://music.youtube.com";
const SONGS_PARAMS: &str = "EgWKAQIIAWoMEA4QChADEAQQCRAF";

/// Cookies whose value signs authenticated requests, most specific first.
const SAPISID_COOKIES: [&str; 2] = ["__Secure-3PAPISID", "SAPISID"];

/// YouTube Music InnerTube client.
pub struct YtMusicClient {
    client: reqwest::blocking::Client,
    language: String,
    sapisid: Option<String>,
}

impl YtMusicClient {
    /// `auth` holds the headers from `headers_auth.json`; `None` makes
    /// unauthenticated requests.
    pub fn new(config: &Config, auth: Option<&BTreeMap<String, String>>) -> Result<Self> {
        let sapisid = auth
            .and_then(|a| a.get("cookie"))
            .and_then(|c| sapisid_from_cookie(c));
        let headers = build_headers(&config.network.user_agent, auth, sapisid.is_some())?;
        let client = reqwest::blocking::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.network.api_timeout_secs))
            .build()
            .context("cannot build YouTube Music HTTP client")?;

        Ok(Self {
            client,
            language: config.network.language.clone(),
            sapisid,
        })
    }

    fn context(&self) -> Value {
        json!({
            "client": {
                "clientName": "WEB_REMIX",
                "clientVersion": client_version(),
                "hl": self.language,
            },
            "user": {}
        })
    }

    fn send(&self, endpoint: &str, mut body: Value) -> Result<Value> {
        body["context"] = self.context();
        let url = format!("{}/{}", API_BASE, endpoint);

        log::debug!("POST {}", url);
        let mut request = self.client.post(&url).query(&[("alt", "json")]).json(&body);
        if let Some(sapisid) = &self.sapisid {
            request = request.header(
                AUTHORIZATION,
                sapisid_hash(sapisid, ORIGIN, Utc::now().timestamp()),
            );
        }

        let resp: Value = request
            .send()
            .with_context(|| format!("YouTube Music {} request could not be sent", endpoint))?
            .error_for_status()
            .with_context(|| format!("YouTube Music {} request was rejected", endpoint))?
            .json()
            .with_context(|| format!("YouTube Music {} response is not JSON", endpoint))?;

        Ok(resp)
    }

    pub fn player(&self, video_id: &str) -> Result<PlayerResponse> {
        let raw = self.send("player", json!({ "videoId": video_id }))?;
        serde_json::from_value(raw).context("YouTube Music player response has an unexpected shape")
    }
}

fn client_version() -> String {
    format!("1.{}.01.00", Utc::now().format("%Y%m%d"))
}

/// Value of the signing cookie in a `cookie` header, if present.
fn sapisid_from_cookie(cookie: &str) -> Option<String> {
    let pairs: Vec<(&str, &str)> = cookie
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim(), v.trim()))
        .collect();

    SAPISID_COOKIES.iter().find_map(|name| {
        pairs
            .iter()
            .find(|(k, v)| k == name && !v.is_empty())
            .map(|(_, v)| v.to_string())
    })
}

/// `SAPISIDHASH <ts>_<sha1("<ts> <sapisid> <origin>")>`
fn sapisid_hash(sapisid: &str, origin: &str, timestamp: i64) -> String {
    let digest = Sha1::digest(format!("{} {} {}", timestamp, sapisid, origin).as_bytes());
    format!("SAPISIDHASH {}_{:x}", timestamp, digest)
}

/// With `signed` set, a captured `authorization` header is dropped; each
/// request carries a fresh hash instead.
fn build_headers(
    user_agent: &str,
    auth: Option<&BTreeMap<String, String>>,
    signed: bool,
) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::USER_AGENT,
        HeaderValue::from_str(user_agent).context("invalid user agent")?,
    );
    headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(reqwest::header::ORIGIN, HeaderValue::from_static(ORIGIN));
    headers.insert("x-origin", HeaderValue::from_static(ORIGIN));

    for (name, value) in auth.into_iter().flatten() {
        if signed && name.eq_ignore_ascii_case("authorization") {
            continue;
        }
        let name = HeaderName::from_bytes(name.as_bytes())
            .with_context(|| format!("invalid header name in credentials: {}", name))?;
        let value = HeaderValue::from_str(value)
            .with_context(|| format!("invalid value for header {}", name))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

impl MetadataSource for YtMusicClient {
    fn search(&self, query: &str, filter: Option<SearchFilter>) -> Result<Vec<SearchResult>> {
        let mut body = json!({ "query": query });
        if filter == Some(SearchFilter::Songs) {
            body["params"] = json!(SONGS_PARAMS);
        }

        let resp = self.send("search", body)?;
        Ok(parser::parse_search_response(
            &resp,
            filter.map(SearchFilter::result_type),
        ))
    }
}

/// Last strategy of the chain: ask the metadata service for the player
/// response directly.
impl StreamSource for YtMusicClient {
    fn name(&self) -> &str {
        "metadata player lookup"
    }

    fn stream_url(&self, video_id: &str) -> Result<String> {
        let player = self.player(video_id)?;

        if let Some(status) = &player.playability_status {
            if let Some(s) = status.status.as_deref().filter(|s| *s != "OK") {
                anyhow::bail!(
                    "video is not playable ({}): {}",
                    s,
                    status.reason.as_deref().unwrap_or("no reason given")
                );
            }
        }

        formats::select_audio_url(&player).context("player response has no audio format with a URL")
    }
}
