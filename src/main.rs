// Entrypoint for the CLI.
// - Keeps `main` small: parse flags, set up logging, load settings and
//   hand everything to `app::run`.
// - Returns `anyhow::Result` so any failure exits non-zero with its cause.

use anyhow::Context;
use clap::Parser;
use comic_poster::{app, transport::HttpTransport, Settings};
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;
use std::io::Write;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "comic-poster")]
#[command(about = "Post a random xkcd comic to a VK group wall", long_about = None)]
struct Cli {
    /// Log upload tokens and the raw API responses
    #[arg(short, long)]
    debug: bool,
}

fn init_logging(debug: bool) {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .filter_module("reqwest", LevelFilter::Warn)
        .filter_module("hyper", LevelFilter::Warn)
        .filter_module("hyper_util", LevelFilter::Warn)
        .format(|buf, record| {
            let module = record.module_path().unwrap_or_else(|| record.target());
            writeln!(buf, "{}() \u{2192}  {}", module, record.args())
        })
        .parse_default_env()
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let settings = Settings::from_env().context("Failed to load settings")?;
    log::debug!("{:?}", settings);

    let transport = HttpTransport::new().context("Failed to build HTTP client")?;
    let work_dir = std::env::current_dir().context("Failed to read current directory")?;

    // The spinner would interleave with debug output, so it only runs in
    // quiet mode.
    let spinner = if cli.debug {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    spinner.set_message("Posting a random comic...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = app::run(&settings, &transport, &mut rand::rng(), &work_dir);
    spinner.finish_and_clear();

    let post = result.context("Failed to post comic")?;
    match post.post_id() {
        Some(id) => log::info!("Published post {} on group {}", id, settings.group_id),
        None => log::info!("Published post on group {}", settings.group_id),
    }
    Ok(())
}
