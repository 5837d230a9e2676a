//! Conversions between document twips, tile pixels and grid coordinates.
//!
//! The engine renders tiles on an exponential schedule: each zoom step
//! changes the twips covered by one tile by a factor of [`ZOOM_RATIO`], with
//! [`BASE_ZOOM`] covering exactly the configured tile twips. Both constants
//! are shared with the engine. A mismatch does not fail, it just makes every
//! recovered zoom wrong, so zoom recovery is best-effort by nature.

use std::fmt;

pub const BASE_ZOOM: f64 = 10.0;
pub const ZOOM_RATIO: f64 = 1.2;

/// Default twips covered by one tile edge at [`BASE_ZOOM`].
pub const DEFAULT_TILE_TWIPS: i64 = 3840;
pub const DEFAULT_TILE_SIZE_PX: u32 = 256;

/// Point in document space (1/1440 inch).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TwipsPoint {
    pub x: i64,
    pub y: i64,
}

impl TwipsPoint {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// Grid index of one tile. Two tiles with equal fields are the same tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    pub x: i64,
    pub y: i64,
    pub zoom: i32,
}

impl TileCoord {
    pub fn new(x: i64, y: i64, zoom: i32) -> Self {
        Self { x, y, zoom }
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.x, self.y, self.zoom)
    }
}

/// Inverts the engine's size schedule: `zoom = round(10 - ln(scale) / ln(1.2))`
/// with `scale = tile_width / tile_width_twips`.
///
/// Both tile dimensions must be present and positive; otherwise there is no
/// zoom and geometry-dependent handling of the message is skipped.
pub fn recover_zoom(
    tile_width: Option<i64>,
    tile_height: Option<i64>,
    tile_width_twips: i64,
) -> Option<i32> {
    let width = tile_width.filter(|w| *w > 0)?;
    tile_height.filter(|h| *h > 0)?;
    if tile_width_twips <= 0 {
        return None;
    }
    let scale = width as f64 / tile_width_twips as f64;
    let zoom = (BASE_ZOOM - scale.ln() / ZOOM_RATIO.ln()).round();
    if !zoom.is_finite() || zoom < i32::MIN as f64 || zoom > i32::MAX as f64 {
        return None;
    }
    Some(zoom as i32)
}

/// Twips covered by one tile edge at `zoom`; the forward form of [`recover_zoom`].
pub fn tile_twips_at(zoom: i32, base_twips: i64) -> i64 {
    let scale = ZOOM_RATIO.powf(BASE_ZOOM - f64::from(zoom));
    ((base_twips as f64) * scale).round() as i64
}

/// Tile footprint in twips at [`BASE_ZOOM`]; the default projection between
/// twips and the tile grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGeometry {
    pub tile_width_twips: i64,
    pub tile_height_twips: i64,
}

impl Default for TileGeometry {
    fn default() -> Self {
        Self {
            tile_width_twips: DEFAULT_TILE_TWIPS,
            tile_height_twips: DEFAULT_TILE_TWIPS,
        }
    }
}

impl TileGeometry {
    pub fn new(tile_width_twips: i64, tile_height_twips: i64) -> Self {
        Self {
            tile_width_twips,
            tile_height_twips,
        }
    }

    /// `(width, height)` in twips of a tile at `zoom`.
    pub fn tile_twips(&self, zoom: i32) -> (i64, i64) {
        (
            tile_twips_at(zoom, self.tile_width_twips),
            tile_twips_at(zoom, self.tile_height_twips),
        )
    }

    pub fn twips_to_coords(&self, point: TwipsPoint, zoom: i32) -> TileCoord {
        let (width, height) = self.tile_twips(zoom);
        TileCoord::new(div_round(point.x, width), div_round(point.y, height), zoom)
    }

    pub fn coords_to_twips(&self, coord: TileCoord) -> TwipsPoint {
        let (width, height) = self.tile_twips(coord.zoom);
        TwipsPoint::new(coord.x * width, coord.y * height)
    }
}

fn div_round(value: i64, step: i64) -> i64 {
    if step <= 0 {
        return 0;
    }
    (value as f64 / step as f64).round() as i64
}

/// Zoom state of the layer as the viewport currently sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomConfig {
    pub tile_zoom: i32,
    pub zoom_offset: i32,
    pub max_zoom: i32,
    pub max_native_zoom: Option<i32>,
    pub zoom_reverse: bool,
    pub tile_size: u32,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self {
            tile_zoom: BASE_ZOOM as i32,
            zoom_offset: 0,
            max_zoom: 18,
            max_native_zoom: None,
            zoom_reverse: false,
            tile_size: DEFAULT_TILE_SIZE_PX,
        }
    }
}

/// On-screen tile size in pixels. Past the engine's native zoom the tile is
/// stretched by `zoom_scale(max_native, zoom)` instead of asking for more
/// resolution than the engine renders.
///
/// `zoom_scale(to, from)` is the viewport's scale factor between two zooms.
pub fn target_tile_size_px<F>(config: &ZoomConfig, zoom_scale: F) -> u32
where
    F: Fn(f64, f64) -> f64,
{
    let zoom = config.tile_zoom + config.zoom_offset;
    match config.max_native_zoom {
        Some(native) if zoom > native => {
            let ratio = zoom_scale(f64::from(native), f64::from(zoom));
            if ratio > 0.0 && ratio.is_finite() {
                (f64::from(config.tile_size) / ratio).round() as u32
            } else {
                config.tile_size
            }
        }
        _ => config.tile_size,
    }
}

/// Zoom index to put on an outbound tile request.
pub fn zoom_for_request(config: &ZoomConfig) -> i32 {
    let mut zoom = config.tile_zoom;
    if config.zoom_reverse {
        zoom = config.max_zoom - zoom;
    }
    zoom += config.zoom_offset;
    match config.max_native_zoom {
        Some(native) => zoom.min(native),
        None => zoom,
    }
}

/// Scale between zoom levels for a doubling-per-level viewport.
pub fn power_of_two_zoom_scale(to: f64, from: f64) -> f64 {
    2f64.powf(to - from)
}
