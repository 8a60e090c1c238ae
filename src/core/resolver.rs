use std::process::Command;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::core::throttle::UpdateThrottle;
use crate::sources::StreamSource;

pub const ALL_FAILED: &str = "All extraction methods failed";

/// Tries each source in order and returns the first non-empty URL.
pub fn resolve_stream_url(video_id: &str, sources: &[&dyn StreamSource]) -> Result<String> {
    for source in sources {
        match source.stream_url(video_id) {
            Ok(url) if !url.trim().is_empty() => {
                log::info!("{}: stream URL resolved", source.name());
                return Ok(url);
            }
            Ok(_) => log::debug!("{}: empty URL", source.name()),
            Err(e) => log::debug!("{}: {:#}", source.name(), e),
        }
    }
    anyhow::bail!(ALL_FAILED)
}

/// Upgrades the extraction library.
pub trait Updater {
    fn update(&self) -> Result<()>;
}

/// Runs an external upgrade command such as `pip install --upgrade yt-dlp`.
pub struct ProcessUpdater {
    command: Vec<String>,
}

impl ProcessUpdater {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}

impl Updater for ProcessUpdater {
    fn update(&self) -> Result<()> {
        let (program, args) = self
            .command
            .split_first()
            .context("update command is empty")?;

        log::info!("updating yt-dlp: {}", self.command_line());
        let output = Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("cannot run {}", program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "{} exited with {}: {}",
                self.command_line(),
                output.status,
                stderr.trim()
            );
        }
        Ok(())
    }
}

/// Outcome of a throttle-gated update attempt.
#[derive(Debug)]
pub enum UpdateOutcome {
    Skipped { next_due: Option<DateTime<Utc>> },
    Updated,
    Failed(anyhow::Error),
}

/// Runs the updater if the throttle allows it (or `force` is set).
///
/// The attempt is recorded before the updater starts, so an update that
/// fails or hangs is not repeated within the interval. A stamp that cannot
/// be written is logged and does not stop the update.
pub fn run_throttled_update(
    throttle: &UpdateThrottle,
    updater: &dyn Updater,
    now: DateTime<Utc>,
    force: bool,
) -> UpdateOutcome {
    if !force && !throttle.is_due(now) {
        return UpdateOutcome::Skipped {
            next_due: throttle.next_due(),
        };
    }

    if let Err(e) = throttle.record(now) {
        log::warn!("cannot record yt-dlp update time: {:#}", e);
    }

    match updater.update() {
        Ok(()) => UpdateOutcome::Updated,
        Err(e) => UpdateOutcome::Failed(e),
    }
}

/// Third strategy: update yt-dlp (at most once per throttle interval) and
/// retry the extractor once.
pub struct SelfUpdateRetry<'a> {
    throttle: UpdateThrottle,
    updater: &'a dyn Updater,
    extractor: &'a dyn StreamSource,
}

impl<'a> SelfUpdateRetry<'a> {
    pub fn new(
        throttle: UpdateThrottle,
        updater: &'a dyn Updater,
        extractor: &'a dyn StreamSource,
    ) -> Self {
        Self {
            throttle,
            updater,
            extractor,
        }
    }

    fn stream_url_at(&self, video_id: &str, now: DateTime<Utc>) -> Result<String> {
        match run_throttled_update(&self.throttle, self.updater, now, false) {
            UpdateOutcome::Skipped { next_due } => {
                anyhow::bail!(
                    "update skipped, next allowed after {}",
                    next_due.map_or_else(|| "unknown".to_string(), |t| t.to_rfc3339())
                );
            }
            UpdateOutcome::Failed(e) => log::warn!("yt-dlp update failed: {:#}", e),
            UpdateOutcome::Updated => {}
        }
        self.extractor.stream_url(video_id)
    }
}

impl StreamSource for SelfUpdateRetry<'_> {
    fn name(&self) -> &str {
        "update and retry"
    }

    fn stream_url(&self, video_id: &str) -> Result<String> {
        self.stream_url_at(video_id, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::cell::{Cell, RefCell};

    struct Fake {
        name: &'static str,
        result: Option<&'static str>,
        calls: Cell<usize>,
    }

    impl Fake {
        fn ok(name: &'static str, url: &'static str) -> Self {
            Self {
                name,
                result: Some(url),
                calls: Cell::new(0),
            }
        }

        fn failing(name: &'static str) -> Self {
            Self {
                name,
                result: None,
                calls: Cell::new(0),
            }
        }
    }

    impl StreamSource for Fake {
        fn name(&self) -> &str {
            self.name
        }

        fn stream_url(&self, _video_id: &str) -> Result<String> {
            self.calls.set(self.calls.get() + 1);
            match self.result {
                Some(url) => Ok(url.to_string()),
                None => anyhow::bail!("{} failed", self.name),
            }
        }
    }

    struct CountingUpdater {
        calls: Cell<usize>,
        fail: bool,
        log: RefCell<Vec<&'static str>>,
    }

    impl CountingUpdater {
        fn new(fail: bool) -> Self {
            Self {
                calls: Cell::new(0),
                fail,
                log: RefCell::new(Vec::new()),
            }
        }
    }

    impl Updater for CountingUpdater {
        fn update(&self) -> Result<()> {
            self.calls.set(self.calls.get() + 1);
            self.log.borrow_mut().push("update");
            if self.fail {
                anyhow::bail!("pip exploded");
            }
            Ok(())
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_first_success_wins() {
        let a = Fake::failing("a");
        let b = Fake::ok("b", "https://b");
        let c = Fake::ok("c", "https://c");

        let url = resolve_stream_url("vid", &[&a, &b, &c]).unwrap();
        assert_eq!(url, "https://b");
        assert_eq!(a.calls.get(), 1);
        assert_eq!(b.calls.get(), 1);
        assert_eq!(c.calls.get(), 0);
    }

    #[test]
    fn test_empty_url_is_a_failure() {
        let a = Fake::ok("a", "  ");
        let b = Fake::ok("b", "https://b");
        assert_eq!(resolve_stream_url("vid", &[&a, &b]).unwrap(), "https://b");
    }

    #[test]
    fn test_all_failing_gives_terminal_error() {
        let a = Fake::failing("a");
        let b = Fake::ok("b", "");
        let err = resolve_stream_url("vid", &[&a, &b]).unwrap_err();
        assert_eq!(err.to_string(), ALL_FAILED);
        assert_eq!(resolve_stream_url("vid", &[]).unwrap_err().to_string(), ALL_FAILED);
    }

    #[test]
    fn test_update_then_retry() {
        let dir = tempfile::tempdir().unwrap();
        let throttle = UpdateThrottle::new(dir.path().join("stamp"), 24);
        let updater = CountingUpdater::new(false);
        let extractor = Fake::ok("yt-dlp", "https://after-update");
        let step = SelfUpdateRetry::new(throttle, &updater, &extractor);

        let url = step.stream_url_at("vid", at(1_700_000_000)).unwrap();
        assert_eq!(url, "https://after-update");
        assert_eq!(updater.calls.get(), 1);
        assert_eq!(extractor.calls.get(), 1);
    }

    #[test]
    fn test_update_throttled_within_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stamp");
        let updater = CountingUpdater::new(false);
        let extractor = Fake::failing("yt-dlp");
        let t0 = at(1_700_000_000);

        for hours in [0, 1, 12, 24] {
            let step =
                SelfUpdateRetry::new(UpdateThrottle::new(path.clone(), 24), &updater, &extractor);
            assert!(step.stream_url_at("vid", t0 + Duration::hours(hours)).is_err());
        }
        assert_eq!(updater.calls.get(), 1);
        assert_eq!(extractor.calls.get(), 1);

        let step = SelfUpdateRetry::new(UpdateThrottle::new(path, 24), &updater, &extractor);
        let _ = step.stream_url_at("vid", t0 + Duration::hours(25));
        assert_eq!(updater.calls.get(), 2);
    }

    #[test]
    fn test_failed_update_still_recorded_and_retried() {
        let dir = tempfile::tempdir().unwrap();
        let throttle = UpdateThrottle::new(dir.path().join("stamp"), 24);
        let updater = CountingUpdater::new(true);
        let extractor = Fake::ok("yt-dlp", "https://x");
        let now = at(1_700_000_000);

        let step = SelfUpdateRetry::new(throttle, &updater, &extractor);
        assert_eq!(step.stream_url_at("vid", now).unwrap(), "https://x");
        assert_eq!(step.throttle.last_update(), Some(now));
    }

    #[test]
    fn test_unwritable_stamp_still_retries() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "not a directory").unwrap();
        let throttle = UpdateThrottle::new(blocker.join("stamp"), 24);
        let updater = CountingUpdater::new(false);
        let extractor = Fake::ok("yt-dlp", "https://after-update");

        let step = SelfUpdateRetry::new(throttle, &updater, &extractor);
        let url = step.stream_url_at("vid", at(1_700_000_000)).unwrap();
        assert_eq!(url, "https://after-update");
        assert_eq!(updater.calls.get(), 1);
        assert_eq!(extractor.calls.get(), 1);
        assert!(step.throttle.last_update().is_none());
    }

    #[test]
    fn test_attempt_recorded_before_update() {
        struct StampCheck<'a> {
            throttle: &'a UpdateThrottle,
            seen: Cell<Option<DateTime<Utc>>>,
        }

        impl Updater for StampCheck<'_> {
            fn update(&self) -> Result<()> {
                self.seen.set(self.throttle.last_update());
                anyhow::bail!("killed")
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let throttle = UpdateThrottle::new(dir.path().join("stamp"), 24);
        let updater = StampCheck {
            throttle: &throttle,
            seen: Cell::new(None),
        };
        let now = at(1_700_000_000);

        let outcome = run_throttled_update(&throttle, &updater, now, false);
        assert!(matches!(outcome, UpdateOutcome::Failed(_)));
        assert_eq!(updater.seen.get(), Some(now));
    }

    #[test]
    fn test_forced_update_ignores_throttle() {
        let dir = tempfile::tempdir().unwrap();
        let throttle = UpdateThrottle::new(dir.path().join("stamp"), 24);
        let updater = CountingUpdater::new(false);
        let now = at(1_700_000_000);

        run_throttled_update(&throttle, &updater, now, false);
        let skipped = run_throttled_update(&throttle, &updater, now, false);
        assert!(matches!(skipped, UpdateOutcome::Skipped { next_due: Some(_) }));

        let forced = run_throttled_update(&throttle, &updater, now, true);
        assert!(matches!(forced, UpdateOutcome::Updated));
        assert_eq!(*updater.log.borrow(), vec!["update", "update"]);
    }

    #[test]
    fn test_full_chain_order() {
        let dir = tempfile::tempdir().unwrap();
        let updater = CountingUpdater::new(false);
        let ytdlp = Fake::failing("yt-dlp");
        let page = Fake::failing("embed page");
        let retry = SelfUpdateRetry::new(
            UpdateThrottle::new(dir.path().join("stamp"), 24),
            &updater,
            &ytdlp,
        );
        let player = Fake::ok("player", "https://player");

        let url = resolve_stream_url("vid", &[&ytdlp, &page, &retry, &player]).unwrap();
        assert_eq!(url, "https://player");
        assert_eq!(ytdlp.calls.get(), 2);
        assert_eq!(page.calls.get(), 1);
        assert_eq!(updater.calls.get(), 1);
    }

    #[test]
    fn test_process_updater_reports_failure() {
        assert!(ProcessUpdater::new(Vec::new()).update().is_err());
        assert!(ProcessUpdater::new(vec!["/nonexistent/updater".to_string()])
            .update()
            .is_err());
    }
}
