//! Classifies a framed header into a typed engine message.
//!
//! Headers are a command keyword followed by space-separated `key=value`
//! tokens. Parsing is lenient: unknown keys are skipped and integers that do
//! not parse are treated as absent, so a newer engine can add fields without
//! breaking older clients.

use bytes::Bytes;

use crate::frame::Frame;

pub const COMMAND_STATUS: &str = "status";
pub const COMMAND_TILE: &str = "tile";

const KEY_TILE_POS_X: &str = "tileposx";
const KEY_TILE_POS_Y: &str = "tileposy";
const KEY_TILE_WIDTH: &str = "tilewidth";
const KEY_TILE_HEIGHT: &str = "tileheight";
const KEY_WIDTH: &str = "width";
const KEY_HEIGHT: &str = "height";
const KEY_PART: &str = "part";

/// Geometry fields recognized in `status` and `tile` headers.
///
/// Sizes of zero are reported as absent; positions may legitimately be zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fields {
    pub tile_pos_x: Option<i64>,
    pub tile_pos_y: Option<i64>,
    pub tile_width: Option<i64>,
    pub tile_height: Option<i64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub part: Option<i64>,
}

impl Fields {
    pub fn parse(header: &str) -> Self {
        let mut fields = Fields::default();
        let line = header.trim_end_matches(['\r', '\n']);
        for token in line.split(' ').skip(1) {
            let Some((key, value)) = token.split_once('=') else {
                continue;
            };
            let value = parse_int(value);
            match key {
                KEY_TILE_POS_X => fields.tile_pos_x = value,
                KEY_TILE_POS_Y => fields.tile_pos_y = value,
                KEY_TILE_WIDTH => fields.tile_width = nonzero(value),
                KEY_TILE_HEIGHT => fields.tile_height = nonzero(value),
                KEY_WIDTH => fields.width = nonzero(value),
                KEY_HEIGHT => fields.height = nonzero(value),
                KEY_PART => fields.part = value,
                _ => {}
            }
        }
        fields
    }
}

fn parse_int(value: &str) -> Option<i64> {
    value.parse().ok()
}

fn nonzero(value: Option<i64>) -> Option<i64> {
    value.filter(|v| *v != 0)
}

/// Document extent announcement. `header` is kept verbatim for deduplication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub header: String,
    pub width_twips: Option<i64>,
    pub height_twips: Option<i64>,
}

impl StatusMessage {
    /// Both dimensions, when the engine sent them.
    pub fn extent(&self) -> Option<(i64, i64)> {
        Some((self.width_twips?, self.height_twips?))
    }
}

/// Tile response: where the tile sits (twips), how large it is in twips, and
/// the encoded image that follows the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileMessage {
    pub part: Option<i64>,
    pub width_px: Option<i64>,
    pub height_px: Option<i64>,
    pub pos_x: Option<i64>,
    pub pos_y: Option<i64>,
    pub tile_width: Option<i64>,
    pub tile_height: Option<i64>,
    pub image: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    Status(StatusMessage),
    Tile(TileMessage),
    /// Any other command; passed through untouched for other consumers.
    Unknown { command: String, frame: Frame },
}

impl WireMessage {
    pub fn command(&self) -> &str {
        match self {
            WireMessage::Status(_) => COMMAND_STATUS,
            WireMessage::Tile(_) => COMMAND_TILE,
            WireMessage::Unknown { command, .. } => command,
        }
    }
}

pub fn parse_message(frame: Frame) -> WireMessage {
    match frame.command() {
        COMMAND_STATUS => {
            let fields = Fields::parse(&frame.header);
            WireMessage::Status(StatusMessage {
                width_twips: fields.width,
                height_twips: fields.height,
                header: frame.header,
            })
        }
        COMMAND_TILE => {
            let fields = Fields::parse(&frame.header);
            WireMessage::Tile(TileMessage {
                part: fields.part,
                width_px: fields.width,
                height_px: fields.height,
                pos_x: fields.tile_pos_x,
                pos_y: fields.tile_pos_y,
                tile_width: fields.tile_width,
                tile_height: fields.tile_height,
                image: frame.body,
            })
        }
        other => WireMessage::Unknown {
            command: other.to_owned(),
            frame,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{split_frame, Payload};

    #[test_timeout::timeout]
    fn parses_tile_header_fields() {
        let fields = Fields::parse(
            "tile part=0 width=256 height=256 tileposx=7680 tileposy=3840 tilewidth=3840 tileheight=3840\n",
        );
        assert_eq!(fields.part, Some(0));
        assert_eq!(fields.width, Some(256));
        assert_eq!(fields.height, Some(256));
        assert_eq!(fields.tile_pos_x, Some(7680));
        assert_eq!(fields.tile_pos_y, Some(3840));
        assert_eq!(fields.tile_width, Some(3840));
        assert_eq!(fields.tile_height, Some(3840));
    }

    #[test_timeout::timeout]
    fn unknown_keys_and_bare_tokens_are_ignored() {
        let fields = Fields::parse("status type=text parts=1 current=0 readonly width=100 height=200");
        assert_eq!(fields.width, Some(100));
        assert_eq!(fields.height, Some(200));
        assert_eq!(fields.tile_pos_x, None);
        assert_eq!(fields.part, None);
    }

    #[test_timeout::timeout]
    fn bad_integers_are_absent() {
        let fields = Fields::parse("tile tileposx=abc tileposy= tilewidth=12x tileheight=-5");
        assert_eq!(fields.tile_pos_x, None);
        assert_eq!(fields.tile_pos_y, None);
        assert_eq!(fields.tile_width, None);
        assert_eq!(fields.tile_height, Some(-5));
    }

    #[test_timeout::timeout]
    fn zero_sizes_are_absent_but_zero_positions_are_not() {
        let fields = Fields::parse("tile tileposx=0 tileposy=0 tilewidth=0 tileheight=3840");
        assert_eq!(fields.tile_pos_x, Some(0));
        assert_eq!(fields.tile_pos_y, Some(0));
        assert_eq!(fields.tile_width, None);
        assert_eq!(fields.tile_height, Some(3840));
    }

    #[test_timeout::timeout]
    fn command_keyword_must_match_exactly() {
        let msg = parse_message(Frame::header_only("statusindicator: start"));
        assert!(matches!(
            msg,
            WireMessage::Unknown { ref command, .. } if command == "statusindicator:"
        ));

        let msg = parse_message(Frame::header_only("tiles 1 2 3"));
        assert_eq!(msg.command(), "tiles");
    }

    #[test_timeout::timeout]
    fn status_keeps_raw_header_for_dedup() {
        let header = "status type=text width=12240 height=15840";
        let WireMessage::Status(status) = parse_message(Frame::header_only(header)) else {
            panic!("expected status");
        };
        assert_eq!(status.header, header);
        assert_eq!(status.extent(), Some((12240, 15840)));
    }

    #[test_timeout::timeout]
    fn status_without_height_has_no_extent() {
        let WireMessage::Status(status) = parse_message(Frame::header_only("status width=5")) else {
            panic!("expected status");
        };
        assert_eq!(status.extent(), None);
    }

    #[test_timeout::timeout]
    fn tile_message_carries_body() {
        let mut raw = b"tile tileposx=0 tileposy=3840 tilewidth=3840 tileheight=3840\n".to_vec();
        raw.extend_from_slice(&[0x89, b'P', b'N', b'G']);
        let WireMessage::Tile(tile) = parse_message(split_frame(Payload::from(raw))) else {
            panic!("expected tile");
        };
        assert_eq!(tile.pos_x, Some(0));
        assert_eq!(tile.pos_y, Some(3840));
        assert_eq!(&tile.image[..], &[0x89, b'P', b'N', b'G']);
    }

    #[test_timeout::timeout]
    fn empty_header_is_unknown() {
        let msg = parse_message(Frame::header_only(""));
        assert!(matches!(msg, WireMessage::Unknown { ref command, .. } if command.is_empty()));
    }
}
