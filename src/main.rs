mod adaptive;
mod app;
mod config;
mod constants;
mod directory;
mod display;
mod error;
mod events;
mod fetch;
mod graphics;
mod hls;
mod input;
mod mpv;
mod player;
mod playlist;
mod selector;
mod surface;
mod theme;
mod ui;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use directories::ProjectDirs;
use ratatui::{
  DefaultTerminal,
  crossterm::event::{self, Event, KeyEventKind},
};
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use app::App;
use config::Config;
use constants::constants;
use display::CliDisplayMode;
use hls::HlsEngine;
use mpv::{MpvProcess, MpvSurface};
use player::Player;

// --- CLI ---

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Args {
  /// M3U playlist URL to load at startup (default: last loaded, then the built-in list)
  #[arg(short, long)]
  playlist: Option<String>,

  /// Logo display mode: 'auto', 'direct', or 'ascii' (default: saved pref, then auto-detect)
  #[arg(short, long, default_value = "auto")]
  display_mode: CliDisplayMode,

  /// Hand HLS manifests straight to mpv instead of the built-in HLS engine
  #[arg(long)]
  no_adaptive: bool,

  /// Print shell completions and exit
  #[arg(long, value_name = "SHELL")]
  completions: Option<clap_complete::Shell>,
}

// --- Logging ---

/// The terminal belongs to ratatui, so logs go to `<data dir>/tvp.log`.
fn init_logging() -> Option<WorkerGuard> {
  let dirs = ProjectDirs::from("", "", "tvp")?;
  let log_dir = dirs.data_dir();
  std::fs::create_dir_all(log_dir).ok()?;

  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(log_dir, "tvp.log"));
  let filter = EnvFilter::try_from_env("TVP_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt().with_writer(writer).with_env_filter(filter).with_ansi(false).init();
  Some(guard)
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  if let Some(shell) = args.completions {
    clap_complete::generate(shell, &mut Args::command(), "tvp", &mut std::io::stdout());
    return Ok(());
  }

  let _log_guard = init_logging();
  info!(version = env!("CARGO_PKG_VERSION"), "tvp starting");

  // mpv must be up before the terminal is taken over so spawn errors print normally.
  // mpv plays HLS itself, so manifests fall back to it when the built-in engine is off.
  let adaptive_enabled = constants().adaptive.enabled && !args.no_adaptive;
  let (surface, mpv) = MpvSurface::spawn(true).await.context("Failed to start mpv")?;

  let default_hook = std::panic::take_hook();
  std::panic::set_hook(Box::new(move |info| {
    ratatui::restore();
    default_hook(info);
  }));

  let mut terminal = ratatui::init();
  let result = run(&mut terminal, args, surface, mpv, adaptive_enabled).await;
  ratatui::restore();
  if let Err(ref e) = result {
    error!(err = format!("{:#}", e), "tvp exited with error");
  }
  result
}

async fn run(
  terminal: &mut DefaultTerminal,
  args: Args,
  surface: MpvSurface,
  mut mpv: MpvProcess,
  adaptive_enabled: bool,
) -> Result<()> {
  let c = constants();
  let config = Config::load();
  let display_mode = display::resolve_display_mode(args.display_mode, config.display_mode.as_deref());

  let http = Client::builder()
    .user_agent(concat!("tvp/", env!("CARGO_PKG_VERSION")))
    .build()
    .context("Failed to build HTTP client")?;
  let engine = HlsEngine::new(http.clone(), adaptive_enabled);
  let player = Player::new(Box::new(surface), Box::new(engine), c.adaptive.clone(), c.auto_advance_delay(), c.channel_cap);

  let mut app = App::new(player, http, &config, display_mode, config::prefs_path());
  if let Some(url) = args.playlist {
    app.playlist_input = app::TextInput::with_text(&url);
  }
  app.trigger_playlist_load();

  let result = event_loop(terminal, &mut app);

  app.player.stop();
  app.save_config();
  mpv.shutdown().await?;
  result
}

fn event_loop(terminal: &mut DefaultTerminal, app: &mut App) -> Result<()> {
  loop {
    app.check_pending();
    let now = Instant::now();
    app.poll_player(now);
    app.expire_messages(now);

    terminal.draw(|frame| ui::ui(frame, app)).context("Failed to draw frame")?;

    if event::poll(Duration::from_millis(100)).context("Failed to poll terminal events")? {
      match event::read().context("Failed to read terminal event")? {
        Event::Key(key) if key.kind == KeyEventKind::Press => input::handle_key_event(app, key),
        _ => {}
      }
    }

    if app.should_quit {
      return Ok(());
    }
  }
}
