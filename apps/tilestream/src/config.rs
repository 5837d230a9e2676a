use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tile_proto::coords::{DEFAULT_TILE_SIZE_PX, DEFAULT_TILE_TWIPS};
use tile_proto::{TileGeometry, ZoomConfig, BASE_ZOOM};

const DEFAULT_SERVER: &str = "ws://127.0.0.1:9980/ws";
const ENV_SERVER: &str = "TILESTREAM_SERVER";

/// Options for the tile layer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayerOptions {
    /// Edge length of a tile on screen, in pixels.
    pub tile_size: u32,
    /// Twips covered by a tile edge at the base zoom. Must match the engine.
    pub tile_width_twips: i64,
    pub tile_height_twips: i64,
    pub zoom_offset: i32,
    pub min_zoom: i32,
    pub max_zoom: i32,
    pub max_native_zoom: Option<i32>,
    pub zoom_reverse: bool,
    pub detect_retina: bool,
    /// Image shown in place of a tile that failed to load.
    pub error_tile_url: Option<String>,
    /// Document the engine is asked to load on connect.
    pub doc: Option<String>,
}

impl Default for LayerOptions {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE_PX,
            tile_width_twips: DEFAULT_TILE_TWIPS,
            tile_height_twips: DEFAULT_TILE_TWIPS,
            zoom_offset: 0,
            min_zoom: 0,
            max_zoom: 18,
            max_native_zoom: None,
            zoom_reverse: false,
            detect_retina: false,
            error_tile_url: None,
            doc: None,
        }
    }
}

impl LayerOptions {
    /// On high-density displays, request half-size tiles one zoom deeper.
    pub fn apply_retina(&mut self, is_retina: bool) {
        if !(self.detect_retina && is_retina && self.max_zoom > 0) {
            return;
        }
        self.tile_size /= 2;
        self.zoom_offset += 1;
        self.min_zoom = self.min_zoom.max(0);
        self.max_zoom -= 1;
    }

    pub fn geometry(&self) -> TileGeometry {
        TileGeometry::new(self.tile_width_twips, self.tile_height_twips)
    }

    pub fn zoom_config(&self, tile_zoom: i32) -> ZoomConfig {
        ZoomConfig {
            tile_zoom,
            zoom_offset: self.zoom_offset,
            max_zoom: self.max_zoom,
            max_native_zoom: self.max_native_zoom,
            zoom_reverse: self.zoom_reverse,
            tile_size: self.tile_size,
        }
    }

    /// Zoom config at the base zoom.
    pub fn default_zoom_config(&self) -> ZoomConfig {
        self.zoom_config(BASE_ZOOM as i32)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Websocket endpoint of the rendering engine.
    pub server: String,
    pub layer: LayerOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            layer: LayerOptions::default(),
        }
    }
}

impl Config {
    /// Defaults, with the server taken from `TILESTREAM_SERVER` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(server) = env::var(ENV_SERVER) {
            config.server = normalize_server(&server);
        }
        config
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        config.server = normalize_server(&config.server);
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}

/// Prefer IPv4 loopback so `localhost` does not resolve to `::1` first.
fn normalize_server(server: &str) -> String {
    let server = server.trim();
    for scheme in ["ws://", "wss://"] {
        if let Some(rest) = server.strip_prefix(scheme) {
            if rest == "localhost" || rest.starts_with("localhost:") || rest.starts_with("localhost/") {
                return format!("{scheme}{}", rest.replacen("localhost", "127.0.0.1", 1));
            }
            return server.to_string();
        }
    }
    if server.starts_with("localhost:") {
        return format!("ws://{}", server.replacen("localhost", "127.0.0.1", 1));
    }
    if server.contains("://") {
        server.to_string()
    } else {
        format!("ws://{server}")
    }
}
