//! Image decoding for tile bodies. Runs off the session loop; results are
//! fed back through [`crate::cache::TileCache::complete_load`].

use std::fmt;

use bytes::Bytes;

/// Tile pixels after decoding, as tightly packed RGBA8.
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedTile {
    pub width: u32,
    pub height: u32,
    pub rgba: Bytes,
}

impl fmt::Debug for DecodedTile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedTile")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.rgba.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TileLoadError {
    #[error("tile body is empty")]
    Empty,
    #[error("failed to decode tile image: {0}")]
    Decode(String),
}

pub fn decode_tile(data: &[u8]) -> Result<DecodedTile, TileLoadError> {
    if data.is_empty() {
        return Err(TileLoadError::Empty);
    }
    let image = image::load_from_memory(data).map_err(|err| TileLoadError::Decode(err.to_string()))?;
    let rgba = image.to_rgba8();
    Ok(DecodedTile {
        width: rgba.width(),
        height: rgba.height(),
        rgba: Bytes::from(rgba.into_raw()),
    })
}
