use std::process::Command;

use anyhow::{Context, Result};

use crate::config::ExtractorConfig;
use crate::core::formats;
use crate::models::VideoInfo;
use crate::sources::StreamSource;

/// yt-dlp 실행 파일을 통한 스트림 URL 추출기.
/// 포맷 선호 순서대로 시도하고 처음 찾은 URL을 반환한다.
pub struct YtDlp {
    path: String,
    formats: Vec<String>,
}

impl YtDlp {
    pub fn new(config: &ExtractorConfig) -> Self {
        Self {
            path: config.ytdlp_path.clone(),
            formats: config.format_preferences.clone(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// `yt-dlp --version`. Fails when the binary cannot be run at all.
    pub fn version(&self) -> Result<String> {
        let output = Command::new(&self.path)
            .arg("--version")
            .output()
            .with_context(|| format!("cannot run {}", self.path))?;
        if !output.status.success() {
            anyhow::bail!("{} --version exited with {}", self.path, output.status);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn build_args(video_id: &str, format: &str) -> Vec<String> {
        vec![
            "--dump-single-json".to_string(),
            "--no-playlist".to_string(),
            "--no-check-certificates".to_string(),
            "--no-warnings".to_string(),
            "-f".to_string(),
            format.to_string(),
            format!("https://www.youtube.com/watch?v={}", video_id),
        ]
    }

    /// 한 가지 포맷 문자열로 메타데이터를 추출한다 (다운로드 없음).
    pub fn extract_info(&self, video_id: &str, format: &str) -> Result<VideoInfo> {
        let args = Self::build_args(video_id, format);
        log::debug!("{} {}", self.path, args.join(" "));

        let output = Command::new(&self.path)
            .args(&args)
            .output()
            .with_context(|| format!("cannot run {}", self.path))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "yt-dlp failed with format '{}': {}",
                format,
                last_line(&stderr).unwrap_or("no error output")
            );
        }

        serde_json::from_slice(&output.stdout).context("yt-dlp printed invalid JSON")
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty()).last()
}

impl StreamSource for YtDlp {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    fn stream_url(&self, video_id: &str) -> Result<String> {
        let mut last_error = None;

        for format in &self.formats {
            match self.extract_info(video_id, format) {
                Ok(info) => match formats::select_stream_url(&info) {
                    Some(url) => return Ok(url),
                    None => {
                        log::debug!("yt-dlp format '{}' gave no usable URL", format);
                        last_error = Some(anyhow::anyhow!("no usable URL for format '{}'", format));
                    }
                },
                Err(e) => {
                    log::debug!("{:#}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("no yt-dlp format preferences configured")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args() {
        let args = YtDlp::build_args("dQw4w9WgXcQ", "worst");
        assert_eq!(args[0], "--dump-single-json");
        assert!(args.contains(&"--no-playlist".to_string()));
        let f = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(args[f + 1], "worst");
        assert_eq!(
            args.last().map(String::as_str),
            Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
        );
    }

    #[test]
    fn test_last_line() {
        assert_eq!(
            last_line("WARNING: x\nERROR: Video unavailable\n\n"),
            Some("ERROR: Video unavailable")
        );
        assert_eq!(last_line("  \n"), None);
    }

    #[test]
    fn test_missing_binary() {
        let cfg = ExtractorConfig {
            ytdlp_path: "/nonexistent/yt-dlp-binary".to_string(),
            ..Default::default()
        };
        let ytdlp = YtDlp::new(&cfg);
        assert!(ytdlp.version().is_err());
        assert!(ytdlp.stream_url("dQw4w9WgXcQ").is_err());
    }

    #[test]
    fn test_no_formats_configured() {
        let cfg = ExtractorConfig {
            format_preferences: Vec::new(),
            ..Default::default()
        };
        let err = YtDlp::new(&cfg).stream_url("x").unwrap_err();
        assert!(err.to_string().contains("no yt-dlp format preferences"));
    }

    /// yt-dlp와 네트워크가 필요하다.
    #[test]
    #[ignore]
    fn test_live_extraction() {
        let ytdlp = YtDlp::new(&ExtractorConfig::default());
        let url = ytdlp.stream_url("dQw4w9WgXcQ").expect("stream url");
        assert!(url.starts_with("https://"));
    }
}
