use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};

/// Persisted marker limiting how often the yt-dlp update may run.
///
/// The file holds unix seconds as text. It is read and written without
/// locking; one helper process runs at a time.
pub struct UpdateThrottle {
    path: PathBuf,
    interval: Duration,
}

impl UpdateThrottle {
    pub fn new(path: PathBuf, interval_hours: u64) -> Self {
        // capped well below chrono's range limit
        let hours = interval_hours.min(1_000_000) as i64;
        Self {
            path,
            interval: Duration::hours(hours),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Last recorded attempt. Missing or unreadable files count as never.
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        parse_timestamp(content.trim())
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_update() {
            None => true,
            Some(last) => now.signed_duration_since(last) > self.interval,
        }
    }

    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.last_update()
            .and_then(|last| last.checked_add_signed(self.interval))
    }

    pub fn record(&self, now: DateTime<Utc>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        std::fs::write(&self.path, now.timestamp().to_string())
            .with_context(|| format!("cannot write {}", self.path.display()))?;
        Ok(())
    }
}

/// Accepts integer or fractional unix seconds.
fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(secs) = text.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0);
    }
    let secs = text.parse::<f64>().ok().filter(|s| s.is_finite())?;
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9) as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
}
