//! The viewport the tile layer renders into.
//!
//! Pan/zoom handling and tile layout belong to the host; the layer only needs
//! the projection into grid space, the zoom state, and a way to announce a new
//! document extent and ask for a refresh.

use tile_proto::{power_of_two_zoom_scale, TileCoord, TileGeometry, TwipsPoint, ZoomConfig};
use tracing::debug;

/// Size of the whole document in twips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentExtent {
    pub width_twips: i64,
    pub height_twips: i64,
}

impl DocumentExtent {
    /// Tiles needed to cover the document at `zoom`, as `(columns, rows)`.
    pub fn grid_span(&self, geometry: &TileGeometry, zoom: i32) -> (i64, i64) {
        let (tile_width, tile_height) = geometry.tile_twips(zoom);
        (
            div_ceil(self.width_twips, tile_width),
            div_ceil(self.height_twips, tile_height),
        )
    }
}

fn div_ceil(value: i64, step: i64) -> i64 {
    if step <= 0 || value <= 0 {
        return 0;
    }
    value / step + i64::from(value % step != 0)
}

pub trait Viewport {
    fn geometry(&self) -> TileGeometry;

    fn zoom_config(&self) -> ZoomConfig;

    /// Scale factor between two zoom levels.
    fn zoom_scale(&self, to: f64, from: f64) -> f64 {
        power_of_two_zoom_scale(to, from)
    }

    fn twips_to_coords(&self, point: TwipsPoint, zoom: i32) -> TileCoord {
        self.geometry().twips_to_coords(point, zoom)
    }

    /// The document was resized; recompute anything bounded by it.
    fn set_document_extent(&mut self, extent: DocumentExtent);

    /// Ask for every visible tile to be re-acquired.
    fn request_refresh(&mut self);
}

/// Viewport without a display: tracks bounds and refresh requests only.
#[derive(Debug, Clone)]
pub struct HeadlessViewport {
    geometry: TileGeometry,
    zoom: ZoomConfig,
    extent: Option<DocumentExtent>,
    span: Option<(i64, i64)>,
    refreshes: u64,
}

impl HeadlessViewport {
    pub fn new(geometry: TileGeometry, zoom: ZoomConfig) -> Self {
        Self {
            geometry,
            zoom,
            extent: None,
            span: None,
            refreshes: 0,
        }
    }

    pub fn extent(&self) -> Option<DocumentExtent> {
        self.extent
    }

    /// Grid size at the current tile zoom, once an extent is known.
    pub fn grid_span(&self) -> Option<(i64, i64)> {
        self.span
    }

    pub fn refreshes(&self) -> u64 {
        self.refreshes
    }

    pub fn set_tile_zoom(&mut self, zoom: i32) {
        self.zoom.tile_zoom = zoom;
        self.span = self
            .extent
            .map(|extent| extent.grid_span(&self.geometry, zoom));
    }
}

impl Viewport for HeadlessViewport {
    fn geometry(&self) -> TileGeometry {
        self.geometry
    }

    fn zoom_config(&self) -> ZoomConfig {
        self.zoom
    }

    fn set_document_extent(&mut self, extent: DocumentExtent) {
        let span = extent.grid_span(&self.geometry, self.zoom.tile_zoom);
        debug!(
            target = "tilestream::viewport",
            width_twips = extent.width_twips,
            height_twips = extent.height_twips,
            columns = span.0,
            rows = span.1,
            "document bounds updated"
        );
        self.extent = Some(extent);
        self.span = Some(span);
    }

    fn request_refresh(&mut self) {
        self.refreshes += 1;
    }
}
