use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::Result;
use clap::Parser;
use colored::*;
use tracing_subscriber::EnvFilter;

mod app;
mod cli;
mod handler;
mod input;
mod markdown;
mod tui;
mod ui;

use app::App;
use cli::Commands;
use jukebox_core::{ApiClient, ApiError, Config};
use tui::{EventHandler, Tui};

const DEFAULT_LOG_FILTER: &str = "jukebox=info,jukebox_core=info";

#[derive(Parser)]
#[command(name = "jukebox")]
#[command(version, about = "Terminal client for goal-driven assistant conversations")]
struct Cli {
    /// Base URL of the Jukebox API
    #[arg(long, global = true, env = "JUKEBOX_API_URL")]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// The TUI owns the terminal, so its logs go to a file in the config directory
fn init_file_logging() -> Result<()> {
    let dir = Config::config_dir()?;
    std::fs::create_dir_all(&dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("jukebox.log"))?;

    tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("{} {}", "Ignoring unreadable config:".yellow(), e);
        Config::new()
    });
    let client = ApiClient::new(&config.resolve_api_url(cli.api_url.as_deref()));

    match cli.command {
        Some(command) => {
            init_stderr_logging();
            if let Err(e) = cli::run(command, client, &config).await {
                tracing::debug!(error = %e, "command failed");
                eprintln!("{} {}", "Error:".red().bold(), error_text(&e));
                std::process::exit(1);
            }
            Ok(())
        }
        None => {
            // Logging is best-effort; the TUI still works without a log file
            let _ = init_file_logging();
            run_tui(client, config).await
        }
    }
}

/// API failures print their user-facing text; everything else prints as-is
fn error_text(err: &anyhow::Error) -> String {
    err.downcast_ref::<ApiError>()
        .map(ApiError::user_message)
        .unwrap_or_else(|| err.to_string())
}

async fn run_tui(client: ApiClient, config: Config) -> Result<()> {
    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();

    let mut app = App::new(client, &config);
    app.refresh_conversations().await;

    let result = run_loop(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    result
}

async fn run_loop(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        app.sync_view();
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }
    Ok(())
}
