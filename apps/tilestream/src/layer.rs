//! Entry point for engine messages: routes `status` to the document extent
//! and `tile` to the tile cache. Stateless per message apart from the
//! last-seen status, which suppresses redundant refreshes.

use bytes::Bytes;
use tile_proto::{
    parse_message, recover_zoom, split_frame, target_tile_size_px, Payload, StatusMessage,
    TileCoord, TileMessage, TwipsPoint, WireMessage,
};
use tokio::sync::oneshot;
use tracing::{debug, enabled, trace, Level};

use crate::cache::{LoadTicket, TileCache, TileOutcome};
use crate::config::LayerOptions;
use crate::decode::{DecodedTile, TileLoadError};
use crate::telemetry::logging::hexdump;
use crate::viewport::{DocumentExtent, Viewport};

/// Why a recognized message had no effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// `status` without both document dimensions.
    MissingExtent,
    /// `tile` without tile size (no zoom) or position.
    MissingGeometry,
}

/// What handling one message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    StatusApplied(DocumentExtent),
    /// Byte-identical to the previous status.
    StatusUnchanged,
    /// The image was assigned; decode `image` and report back with `ticket`.
    TileAssigned { ticket: LoadTicket, image: Bytes },
    /// No element tracks this coordinate any more.
    TileDropped(TileCoord),
    Ignored(IgnoreReason),
    /// Not ours; handed back for other consumers.
    Forwarded(WireMessage),
}

pub struct TileLayer {
    options: LayerOptions,
    cache: TileCache,
    extent: Option<DocumentExtent>,
    last_status: Option<String>,
}

impl TileLayer {
    pub fn new(options: LayerOptions) -> Self {
        let cache = TileCache::new(options.error_tile_url.clone());
        Self {
            options,
            cache,
            extent: None,
            last_status: None,
        }
    }

    pub fn options(&self) -> &LayerOptions {
        &self.options
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn extent(&self) -> Option<DocumentExtent> {
        self.extent
    }

    /// Handle one inbound socket message.
    pub fn handle_payload(&mut self, payload: Payload, viewport: &mut dyn Viewport) -> Dispatch {
        let frame = split_frame(payload);
        if enabled!(Level::TRACE) {
            trace!(
                target = "tilestream::layer",
                header_len = frame.header.len(),
                body_len = frame.body.len(),
                "frame\n{}",
                hexdump(frame.header.as_bytes())
            );
        }
        self.handle_message(parse_message(frame), viewport)
    }

    pub fn handle_message(&mut self, message: WireMessage, viewport: &mut dyn Viewport) -> Dispatch {
        match message {
            WireMessage::Status(status) => self.on_status(status, viewport),
            WireMessage::Tile(tile) => self.on_tile(tile, viewport),
            other => {
                trace!(target = "tilestream::layer", command = other.command(), "forwarding message");
                Dispatch::Forwarded(other)
            }
        }
    }

    fn on_status(&mut self, status: StatusMessage, viewport: &mut dyn Viewport) -> Dispatch {
        let Some((width_twips, height_twips)) = status.extent() else {
            debug!(target = "tilestream::layer", header = %status.header.trim_end(), "status without extent");
            return Dispatch::Ignored(IgnoreReason::MissingExtent);
        };
        if self.last_status.as_deref() == Some(status.header.as_str()) {
            return Dispatch::StatusUnchanged;
        }
        let extent = DocumentExtent {
            width_twips,
            height_twips,
        };
        self.extent = Some(extent);
        viewport.set_document_extent(extent);
        self.last_status = Some(status.header);
        viewport.request_refresh();
        debug!(
            target = "tilestream::layer",
            width_twips, height_twips, "document extent changed"
        );
        Dispatch::StatusApplied(extent)
    }

    fn on_tile(&mut self, tile: TileMessage, viewport: &mut dyn Viewport) -> Dispatch {
        let zoom = recover_zoom(tile.tile_width, tile.tile_height, self.options.tile_width_twips);
        let (Some(zoom), Some(x), Some(y)) = (zoom, tile.pos_x, tile.pos_y) else {
            debug!(
                target = "tilestream::layer",
                tile_width = ?tile.tile_width,
                tile_height = ?tile.tile_height,
                pos_x = ?tile.pos_x,
                pos_y = ?tile.pos_y,
                "tile without usable geometry"
            );
            return Dispatch::Ignored(IgnoreReason::MissingGeometry);
        };
        let coord = viewport.twips_to_coords(TwipsPoint::new(x, y), zoom);
        match self.cache.assign_image(coord, tile.image.clone()) {
            Some(ticket) => {
                trace!(target = "tilestream::layer", tile = %coord, bytes = tile.image.len(), "tile assigned");
                Dispatch::TileAssigned {
                    ticket,
                    image: tile.image,
                }
            }
            None => {
                debug!(target = "tilestream::layer", tile = %coord, "dropping tile with no element");
                Dispatch::TileDropped(coord)
            }
        }
    }

    /// The viewport wants a tile at `coord`; returns its completion.
    pub fn create_tile(&mut self, coord: TileCoord) -> oneshot::Receiver<TileOutcome> {
        self.cache.create_tile(coord)
    }

    pub fn evict_tile(&mut self, coord: TileCoord) -> bool {
        self.cache.evict(coord).is_some()
    }

    pub fn complete_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<DecodedTile, TileLoadError>,
    ) -> bool {
        self.cache.complete_load(ticket, result)
    }

    /// Tear-down: make every in-flight load unobservable.
    pub fn abort_loading(&mut self) -> usize {
        self.cache.abort_loading()
    }

    /// Pixel size tiles are displayed at for the viewport's current zoom.
    pub fn tile_size_px(&self, viewport: &dyn Viewport) -> u32 {
        target_tile_size_px(&viewport.zoom_config(), |to, from| viewport.zoom_scale(to, from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TileSource;
    use crate::viewport::HeadlessViewport;
    use tile_proto::{TileGeometry, TileRequest, ZoomConfig};

    fn layer() -> (TileLayer, HeadlessViewport) {
        let options = LayerOptions::default();
        let viewport = HeadlessViewport::new(options.geometry(), options.default_zoom_config());
        (TileLayer::new(options), viewport)
    }

    fn tile_payload(coord: TileCoord, body: &[u8]) -> Payload {
        let request = TileRequest::for_coord(coord, &TileGeometry::default(), 256, 0);
        let mut raw = request.to_command().into_bytes();
        raw.push(b'\n');
        raw.extend_from_slice(body);
        Payload::from(raw)
    }

    #[test_timeout::timeout]
    fn status_updates_extent_and_refreshes() {
        let (mut layer, mut viewport) = layer();
        let dispatch = layer.handle_payload(
            Payload::from("status type=text parts=1 current=0 width=12240 height=15840"),
            &mut viewport,
        );
        let extent = DocumentExtent {
            width_twips: 12240,
            height_twips: 15840,
        };
        assert_eq!(dispatch, Dispatch::StatusApplied(extent));
        assert_eq!(layer.extent(), Some(extent));
        assert_eq!(viewport.extent(), Some(extent));
        assert_eq!(viewport.refreshes(), 1);
    }

    #[test_timeout::timeout]
    fn identical_status_is_not_reapplied() {
        let (mut layer, mut viewport) = layer();
        let status = "status type=text parts=1 width=12240 height=15840";
        layer.handle_payload(Payload::from(status), &mut viewport);
        let second = layer.handle_payload(Payload::from(status), &mut viewport);
        assert_eq!(second, Dispatch::StatusUnchanged);
        assert_eq!(viewport.refreshes(), 1);

        // Same extent, different header text: still a new status.
        let third = layer.handle_payload(
            Payload::from("status type=text parts=2 width=12240 height=15840"),
            &mut viewport,
        );
        assert!(matches!(third, Dispatch::StatusApplied(_)));
        assert_eq!(viewport.refreshes(), 2);
    }

    #[test_timeout::timeout]
    fn binary_and_text_status_with_same_header_dedupe() {
        let (mut layer, mut viewport) = layer();
        layer.handle_payload(Payload::from("status width=10 height=20"), &mut viewport);
        let binary = layer.handle_payload(
            Payload::from(b"status width=10 height=20".to_vec()),
            &mut viewport,
        );
        assert_eq!(binary, Dispatch::StatusUnchanged);
    }

    #[test_timeout::timeout]
    fn oversized_status_extent_is_applied() {
        let (mut layer, mut viewport) = layer();
        let dispatch = layer.handle_payload(
            Payload::from("status width=9223372036854775807 height=100"),
            &mut viewport,
        );
        assert!(matches!(dispatch, Dispatch::StatusApplied(_)));
        let (columns, rows) = viewport.grid_span().expect("span");
        assert!(columns > 0);
        assert_eq!(rows, 1);
    }

    #[test_timeout::timeout]
    fn status_missing_height_is_ignored() {
        let (mut layer, mut viewport) = layer();
        let dispatch = layer.handle_payload(Payload::from("status width=12240"), &mut viewport);
        assert_eq!(dispatch, Dispatch::Ignored(IgnoreReason::MissingExtent));
        assert_eq!(layer.extent(), None);
        assert_eq!(viewport.refreshes(), 0);
    }

    #[test_timeout::timeout]
    fn tile_for_tracked_element_is_assigned() {
        let (mut layer, mut viewport) = layer();
        let coord = TileCoord::new(3, 1, 12);
        let _rx = layer.create_tile(coord);
        let dispatch = layer.handle_payload(tile_payload(coord, b"image-bytes"), &mut viewport);
        let Dispatch::TileAssigned { ticket, image } = dispatch else {
            panic!("expected assignment, got {dispatch:?}");
        };
        assert_eq!(ticket.coord, coord);
        assert_eq!(&image[..], b"image-bytes");
        assert_eq!(
            layer.cache().get(coord).unwrap().source(),
            &TileSource::Image(Bytes::from_static(b"image-bytes"))
        );
    }

    #[test_timeout::timeout]
    fn tile_without_element_is_dropped() {
        let (mut layer, mut viewport) = layer();
        let tracked = TileCoord::new(0, 0, 10);
        let _rx = layer.create_tile(tracked);
        let stray = TileCoord::new(5, 5, 10);
        let dispatch = layer.handle_payload(tile_payload(stray, b"late"), &mut viewport);
        assert_eq!(dispatch, Dispatch::TileDropped(stray));
        assert_eq!(layer.cache().len(), 1);
        assert_eq!(layer.cache().get(tracked).unwrap().source(), &TileSource::Empty);
    }

    #[test_timeout::timeout]
    fn tile_without_size_is_ignored() {
        let (mut layer, mut viewport) = layer();
        let _rx = layer.create_tile(TileCoord::new(0, 0, 10));
        let dispatch = layer.handle_payload(
            Payload::from(b"tile tileposx=0 tileposy=0 tilewidth=3840\n\x89PNG".to_vec()),
            &mut viewport,
        );
        assert_eq!(dispatch, Dispatch::Ignored(IgnoreReason::MissingGeometry));
    }

    #[test_timeout::timeout]
    fn unknown_commands_are_forwarded() {
        let (mut layer, mut viewport) = layer();
        let dispatch = layer.handle_payload(Payload::from("invalidatetiles: EMPTY"), &mut viewport);
        let Dispatch::Forwarded(message) = dispatch else {
            panic!("expected forward");
        };
        assert_eq!(message.command(), "invalidatetiles:");
    }

    #[test_timeout::timeout]
    fn garbage_does_not_panic() {
        let (mut layer, mut viewport) = layer();
        for payload in [
            Payload::from(""),
            Payload::from(vec![0xff, 0xfe, 0x00]),
            Payload::from("tile"),
            Payload::from("status"),
            Payload::from("tile tileposx=1 tileposy=2 tilewidth=-3 tileheight=-3"),
        ] {
            let _ = layer.handle_payload(payload, &mut viewport);
        }
        assert!(layer.cache().is_empty());
    }

    #[test_timeout::timeout]
    fn tile_size_follows_viewport_zoom() {
        let options = LayerOptions {
            max_native_zoom: Some(12),
            ..LayerOptions::default()
        };
        let viewport = HeadlessViewport::new(options.geometry(), options.zoom_config(13));
        let layer = TileLayer::new(options);
        assert_eq!(layer.tile_size_px(&viewport), 512);

        let native = HeadlessViewport::new(TileGeometry::default(), ZoomConfig::default());
        assert_eq!(layer.tile_size_px(&native), 256);
    }
}
