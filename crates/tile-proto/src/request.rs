//! Outbound commands sent to the engine.

use std::fmt::Write as _;

use crate::coords::{TileCoord, TileGeometry};
use crate::message::{COMMAND_STATUS, COMMAND_TILE};

/// Ask the engine to open `url`.
pub fn load_command(url: &str) -> String {
    format!("load url={url}")
}

/// Ask the engine for the current document status.
pub fn status_command() -> String {
    COMMAND_STATUS.to_owned()
}

/// A request for one tile. The engine echoes these fields in its response
/// header, which is what lets the response be matched back to a grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRequest {
    pub part: i64,
    pub width_px: u32,
    pub height_px: u32,
    pub pos_x: i64,
    pub pos_y: i64,
    pub tile_width: i64,
    pub tile_height: i64,
}

impl TileRequest {
    pub fn for_coord(coord: TileCoord, geometry: &TileGeometry, tile_size_px: u32, part: i64) -> Self {
        let origin = geometry.coords_to_twips(coord);
        let (tile_width, tile_height) = geometry.tile_twips(coord.zoom);
        Self {
            part,
            width_px: tile_size_px,
            height_px: tile_size_px,
            pos_x: origin.x,
            pos_y: origin.y,
            tile_width,
            tile_height,
        }
    }

    pub fn to_command(&self) -> String {
        let mut out = String::from(COMMAND_TILE);
        let _ = write!(
            out,
            " part={} width={} height={} tileposx={} tileposy={} tilewidth={} tileheight={}",
            self.part,
            self.width_px,
            self.height_px,
            self.pos_x,
            self.pos_y,
            self.tile_width,
            self.tile_height
        );
        out
    }
}
