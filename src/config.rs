use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const CONFIG_PATH_ENV: &str = "YTMUSIC_HELPER_CONFIG";
const HEADERS_FILE: &str = "headers_auth.json";
const APP_SUPPORT_DIR: &str = "Library/Application Support/SpotlightMusic";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    pub language: String,
    pub user_agent: String,
    pub page_timeout_secs: u64,
    pub api_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            page_timeout_secs: 10,
            api_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtractorConfig {
    pub ytdlp_path: String,
    pub format_preferences: Vec<String>,
    pub update_interval_hours: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_command: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throttle_path: Option<PathBuf>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: "yt-dlp".to_string(),
            format_preferences: vec![
                "bestaudio[ext=m4a]/bestaudio/best".to_string(),
                "best[height<=720]/best".to_string(),
                "worst".to_string(),
            ],
            update_interval_hours: 24,
            update_command: None,
            throttle_path: None,
        }
    }
}

impl ExtractorConfig {
    /// Command used to upgrade yt-dlp. Homebrew installs are upgraded with
    /// brew, everything else through pip.
    pub fn resolved_update_command(&self) -> Vec<String> {
        if let Some(cmd) = self.update_command.as_ref().filter(|c| !c.is_empty()) {
            return cmd.clone();
        }
        let parts: &[&str] = if Path::new("/opt/homebrew/bin/brew").exists() {
            &["brew", "upgrade", "yt-dlp"]
        } else {
            &["python3", "-m", "pip", "install", "--upgrade", "yt-dlp"]
        };
        parts.iter().map(|s| s.to_string()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AuthConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers_path: Option<PathBuf>,
}

fn home_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home)
}

pub fn app_support_dir() -> PathBuf {
    home_dir().join(APP_SUPPORT_DIR)
}

pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    home_dir()
        .join(".config")
        .join("ytmusic-helper")
        .join("config.toml")
}

pub fn load_config() -> Config {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &Path) -> Config {
    if !path.exists() {
        return Config::default();
    }
    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
            log::warn!("ignoring invalid config {}: {}", path.display(), e);
            Config::default()
        }),
        Err(_) => Config::default(),
    }
}

pub fn save_config(config: &Config) -> Result<()> {
    save_config_to(config, &config_path())
}

pub fn save_config_to(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).with_context(|| format!("cannot write {}", path.display()))?;
    Ok(())
}

/// Throttle timestamp location. The app support directory wins when the
/// desktop app has already created it.
pub fn throttle_path(config: &Config) -> PathBuf {
    if let Some(path) = &config.extractor.throttle_path {
        return path.clone();
    }
    let support = app_support_dir();
    if support.is_dir() {
        support.join("ytdlp_last_update")
    } else {
        home_dir().join(".ytmusic_helper_last_update")
    }
}

/// Candidate credential files, highest priority first.
pub fn headers_candidates(config: &Config) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(path) = &config.auth.headers_path {
        candidates.push(path.clone());
    }
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        candidates.push(dir.join(HEADERS_FILE));
    }
    candidates.push(app_support_dir().join(HEADERS_FILE));
    candidates
}

pub fn find_headers_file(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find(|p| p.is_file()).cloned()
}

/// Reads a `headers_auth.json` file: a flat object of header name to value.
pub fn load_auth_headers(path: &Path) -> Result<BTreeMap<String, String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let headers: BTreeMap<String, String> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON object of strings", path.display()))?;

    Ok(headers
        .into_iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v))
        .filter(|(k, _)| !matches!(k.as_str(), "content-length" | "accept-encoding" | "host"))
        .collect())
}
