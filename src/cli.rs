use anyhow::{Context, Result};
use chrono::Utc;
use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::{ArgAction, Parser, Subcommand};
use comfy_table::{Cell, Table};
use dialoguer::Input;

use crate::config::{self, Config};
use crate::core::resolver::{self, ProcessUpdater, SelfUpdateRetry, UpdateOutcome};
use crate::core::throttle::UpdateThrottle;
use crate::core::{normalize, search};
use crate::models::Response;
use crate::sources::webpage::EmbedPageClient;
use crate::sources::ytdlp::YtDlp;
use crate::sources::ytmusic::YtMusicClient;
use crate::sources::StreamSource;

pub const USAGE: &str = "Usage: ytmusic-helper [search <query> | stream_url <video_id>]";

#[derive(Parser)]
#[command(
    name = "ytmusic-helper",
    version,
    about = "YouTube Music search and stream URL helper"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log more to stderr (-v info, -vv debug); must precede the subcommand
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search songs and print them as JSON
    Search {
        /// Free-text query; all words are joined with spaces
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        query: Vec<String>,
    },
    /// Resolve a playable audio stream URL and print it as JSON
    #[command(name = "stream_url")]
    StreamUrl {
        /// Video id or YouTube / YouTube Music link
        #[arg(allow_hyphen_values = true)]
        video_id: String,
    },
    /// Update yt-dlp unless it was updated recently
    Update {
        /// Ignore the update throttle
        #[arg(long)]
        force: bool,
    },
    /// Show configuration, credentials and yt-dlp state
    Status,
    /// Edit the configuration file
    Config,
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Search { query } => {
            emit(&cmd_search(&query.join(" ")));
            Ok(())
        }
        Commands::StreamUrl { video_id } => {
            emit(&cmd_stream_url(&video_id));
            Ok(())
        }
        Commands::Update { force } => cmd_update(force),
        Commands::Status => cmd_status(),
        Commands::Config => cmd_config(),
    }
}

/// JSON error for arguments clap rejected.
pub fn parse_error_response(err: &clap::Error) -> Response {
    if err.kind() == ErrorKind::InvalidSubcommand {
        if let Some(ContextValue::String(cmd)) = err.get(ContextKind::InvalidSubcommand) {
            return Response::error(format!("Unknown command: {}", cmd));
        }
    }
    Response::error(USAGE)
}

pub fn emit(response: &Response) {
    println!("{}", response.to_json());
}

/// Finds a credentials file and builds the metadata client from it.
fn build_metadata_client(cfg: &Config) -> Result<YtMusicClient> {
    let auth = match config::find_headers_file(&config::headers_candidates(cfg)) {
        Some(path) => {
            log::info!("using credentials from {}", path.display());
            Some(config::load_auth_headers(&path)?)
        }
        None => {
            log::info!("no credentials file found, searching unauthenticated");
            None
        }
    };
    YtMusicClient::new(cfg, auth.as_ref())
}

fn update_throttle(cfg: &Config) -> UpdateThrottle {
    UpdateThrottle::new(
        config::throttle_path(cfg),
        cfg.extractor.update_interval_hours,
    )
}

fn cmd_search(query: &str) -> Response {
    let query = query.trim();
    if query.is_empty() {
        return Response::error("Search query is empty");
    }

    let cfg = config::load_config();
    let client = match build_metadata_client(&cfg) {
        Ok(c) => c,
        Err(e) => {
            return Response::error(format!(
                "Failed to initialize YouTube Music client: {:#}",
                e
            ))
        }
    };

    match search::search_songs(&client, query) {
        Ok(results) => Response::Results { results },
        Err(e) => Response::error(format!("Search failed: {:#}", e)),
    }
}

fn cmd_stream_url(input: &str) -> Response {
    let video_id = match normalize::parse_video_id(input) {
        Ok(id) => id,
        Err(e) => return Response::error(e.to_string()),
    };

    let cfg = config::load_config();
    let ytdlp = YtDlp::new(&cfg.extractor);
    match ytdlp.version() {
        Ok(v) => log::info!("yt-dlp {}", v),
        Err(e) => return Response::error(format!("yt-dlp not available: {:#}", e)),
    }

    let page = EmbedPageClient::new(&cfg.network)
        .map_err(|e| log::warn!("embed page strategy disabled: {:#}", e))
        .ok();
    let updater = ProcessUpdater::new(cfg.extractor.resolved_update_command());
    let retry = SelfUpdateRetry::new(update_throttle(&cfg), &updater, &ytdlp);
    let player = build_metadata_client(&cfg)
        .map_err(|e| log::warn!("player lookup strategy disabled: {:#}", e))
        .ok();

    let mut sources: Vec<&dyn StreamSource> = vec![&ytdlp];
    if let Some(page) = &page {
        sources.push(page);
    }
    sources.push(&retry);
    if let Some(player) = &player {
        sources.push(player);
    }

    match resolver::resolve_stream_url(&video_id, &sources) {
        Ok(stream_url) => Response::StreamUrl { stream_url },
        Err(e) => Response::error(e.to_string()),
    }
}

fn cmd_update(force: bool) -> Result<()> {
    let cfg = config::load_config();
    let throttle = update_throttle(&cfg);
    let updater = ProcessUpdater::new(cfg.extractor.resolved_update_command());

    match resolver::run_throttled_update(&throttle, &updater, Utc::now(), force) {
        UpdateOutcome::Skipped { next_due } => {
            let next = next_due.map_or_else(|| "-".to_string(), |t| t.to_rfc3339());
            println!("yt-dlp was updated recently; next update allowed after {}", next);
            println!("Use --force to update anyway.");
        }
        UpdateOutcome::Updated => {
            println!("yt-dlp updated ({})", updater.command_line());
        }
        UpdateOutcome::Failed(e) => {
            return Err(e.context("yt-dlp update failed"));
        }
    }
    Ok(())
}

fn cmd_status() -> Result<()> {
    let cfg = config::load_config();
    let config_path = config::config_path();
    let throttle = update_throttle(&cfg);
    let ytdlp = YtDlp::new(&cfg.extractor);

    let mut table = Table::new();
    table.set_header(vec!["Item", "Value"]);

    let config_state = if config_path.exists() {
        config_path.display().to_string()
    } else {
        format!("{} (not found, using defaults)", config_path.display())
    };
    table.add_row(vec![Cell::new("Config file"), Cell::new(config_state)]);

    let credentials = config::find_headers_file(&config::headers_candidates(&cfg))
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "none (unauthenticated)".to_string());
    table.add_row(vec![Cell::new("Credentials"), Cell::new(credentials)]);

    let version = ytdlp
        .version()
        .unwrap_or_else(|e| format!("unavailable: {:#}", e));
    table.add_row(vec![
        Cell::new("yt-dlp"),
        Cell::new(format!("{} ({})", ytdlp.path(), version)),
    ]);
    table.add_row(vec![
        Cell::new("Format preferences"),
        Cell::new(cfg.extractor.format_preferences.join("  |  ")),
    ]);
    table.add_row(vec![
        Cell::new("Update command"),
        Cell::new(cfg.extractor.resolved_update_command().join(" ")),
    ]);
    table.add_row(vec![
        Cell::new("Throttle file"),
        Cell::new(throttle.path().display()),
    ]);

    let last = throttle
        .last_update()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());
    table.add_row(vec![Cell::new("Last update"), Cell::new(last)]);

    let due = if throttle.is_due(Utc::now()) {
        "yes".to_string()
    } else {
        format!("no (every {}h)", throttle.interval().num_hours())
    };
    table.add_row(vec![Cell::new("Update due"), Cell::new(due)]);

    println!("{table}");
    Ok(())
}

fn cmd_config() -> Result<()> {
    let mut cfg = config::load_config();

    println!("ytmusic-helper settings");
    println!("(leave the credentials path empty to use the default lookup)\n");

    cfg.network.language = Input::new()
        .with_prompt("Language (hl)")
        .with_initial_text(cfg.network.language.clone())
        .interact_text()?;

    cfg.extractor.ytdlp_path = Input::new()
        .with_prompt("yt-dlp path")
        .with_initial_text(cfg.extractor.ytdlp_path.clone())
        .interact_text()?;

    let current_headers = cfg
        .auth
        .headers_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let headers: String = Input::new()
        .with_prompt("headers_auth.json path")
        .with_initial_text(current_headers)
        .allow_empty(true)
        .interact_text()?;
    let headers = headers.trim();
    cfg.auth.headers_path = (!headers.is_empty()).then(|| headers.into());

    cfg.extractor.update_interval_hours = Input::new()
        .with_prompt("Hours between yt-dlp updates")
        .with_initial_text(cfg.extractor.update_interval_hours.to_string())
        .interact_text()?;

    config::save_config(&cfg).context("cannot save config")?;
    println!("\nSaved to {}", config::config_path().display());
    Ok(())
}
