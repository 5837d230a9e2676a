//! Wire primitives shared by tiled-document clients.
//!
//! ```
//! use tile_proto::{parse_message, split_frame, Payload, WireMessage};
//!
//! let msg = parse_message(split_frame(Payload::from("status width=12240 height=15840")));
//! let WireMessage::Status(status) = msg else { unreachable!() };
//! assert_eq!(status.extent(), Some((12240, 15840)));
//! ```

pub mod coords;
pub mod frame;
pub mod message;
pub mod request;

pub use coords::{
    power_of_two_zoom_scale, recover_zoom, target_tile_size_px, tile_twips_at, zoom_for_request,
    TileCoord, TileGeometry, TwipsPoint, ZoomConfig, BASE_ZOOM, ZOOM_RATIO,
};
pub use frame::{split_frame, Frame, Payload};
pub use message::{parse_message, Fields, StatusMessage, TileMessage, WireMessage};
pub use request::{load_command, status_command, TileRequest};
