mod cli;
mod config;
mod core;
mod models;
mod sources;

use clap::error::ErrorKind;
use clap::Parser;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    let mut clog = colog::default_builder();
    clog.filter(None, level);
    clog.init();
}

fn main() {
    let cli = match cli::Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            // stdout is read by the desktop side; keep it a single JSON object
            cli::emit(&cli::parse_error_response(&e));
            return;
        }
    };

    init_logging(cli.verbose);

    if let Err(e) = cli::run(cli) {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}
