use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tile_proto::TileCoord;
use tilestream_client_core::config::Config;
use tilestream_client_core::session::{SessionConfig, run_session};
use tilestream_client_core::telemetry::logging::{self, LogConfig, LogLevel};
use tilestream_client_core::{HeadlessViewport, TileLayer};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "tilestream",
    version,
    about = "Stream a rendered document's tiles from a rendering engine"
)]
struct Cli {
    /// Websocket endpoint of the rendering engine.
    #[arg(long, env = "TILESTREAM_SERVER")]
    server: Option<String>,

    /// Document URL the engine should load.
    #[arg(long)]
    doc: Option<String>,

    /// TOML file with `server` and a `[layer]` table.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogLevel::Warn)]
    log_level: LogLevel,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Treat the display as high density (honoured when the layer enables retina detection).
    #[arg(long, default_value_t = false)]
    retina: bool,

    /// Request one tile, as `x,y,zoom`, once the document extent is known.
    #[arg(long, value_parser = parse_tile)]
    tile: Option<TileCoord>,
}

fn parse_tile(value: &str) -> Result<TileCoord> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    let [x, y, zoom] = parts.as_slice() else {
        bail!("expected x,y,zoom");
    };
    Ok(TileCoord::new(
        x.parse().context("tile x")?,
        y.parse().context("tile y")?,
        zoom.parse().context("tile zoom")?,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&LogConfig {
        level: cli.log_level,
        file: cli.log_file.clone(),
    })?;

    let mut config = match &cli.config {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::from_env(),
    };
    if let Some(server) = cli.server {
        config.server = server;
    }
    if cli.doc.is_some() {
        config.layer.doc = cli.doc;
    }
    config.layer.apply_retina(cli.retina);

    let mut viewport = HeadlessViewport::new(
        config.layer.geometry(),
        config.layer.default_zoom_config(),
    );
    let session = SessionConfig {
        url: config.server.clone(),
        doc: config.layer.doc.clone(),
        initial_tile: cli.tile,
    };
    let mut layer = TileLayer::new(config.layer);

    tokio::select! {
        result = run_session(&session, &mut layer, &mut viewport) => {
            let summary = result.with_context(|| format!("session with {}", session.url))?;
            info!(?summary, "disconnected");
        }
        _ = tokio::signal::ctrl_c() => {
            let blanked = layer.abort_loading();
            warn!(blanked, "interrupted");
        }
    }

    if let Some((columns, rows)) = viewport.grid_span() {
        info!(columns, rows, refreshes = viewport.refreshes(), "final document grid");
    }
    Ok(())
}
