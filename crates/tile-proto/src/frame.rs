//! Splits one socket delivery into a text header and an optional body.
//!
//! Every engine message starts with a newline-terminated text header. Tile
//! messages follow the header with image bytes: raw on binary frames, base64
//! on text frames. Splitting never fails; a payload without a newline is all
//! header.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use tracing::debug;

const NEWLINE: u8 = b'\n';

/// One inbound socket delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Bytes),
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Text(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_owned())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Payload::Binary(Bytes::from(value))
    }
}

impl From<Bytes> for Payload {
    fn from(value: Bytes) -> Self {
        Payload::Binary(value)
    }
}

/// Header text (including its terminating newline, when present) plus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: String,
    pub body: Bytes,
}

impl Frame {
    pub fn header_only(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            body: Bytes::new(),
        }
    }

    /// The first space-delimited word of the header, without line terminators.
    pub fn command(&self) -> &str {
        let line = self.header.trim_end_matches(['\r', '\n']);
        line.split(' ').next().unwrap_or("")
    }
}

pub fn split_frame(payload: Payload) -> Frame {
    match payload {
        Payload::Binary(bytes) => split_binary(bytes),
        Payload::Text(text) => split_text(text),
    }
}

fn split_binary(bytes: Bytes) -> Frame {
    let header_len = match bytes.iter().position(|&byte| byte == NEWLINE) {
        Some(index) => index + 1,
        None => bytes.len(),
    };
    // Byte-per-char decoding keeps the header length equal to its byte length.
    let header: String = bytes[..header_len].iter().map(|&byte| byte as char).collect();
    let body = bytes.slice(header_len..);
    Frame { header, body }
}

fn split_text(mut text: String) -> Frame {
    let Some(index) = text.find('\n') else {
        return Frame::header_only(text);
    };
    let encoded = text.split_off(index + 1);
    let compact: String = encoded.chars().filter(|ch| !ch.is_whitespace()).collect();
    if compact.is_empty() {
        return Frame::header_only(text);
    }
    let body = match STANDARD.decode(compact.as_bytes()) {
        Ok(decoded) => Bytes::from(decoded),
        Err(err) => {
            debug!(
                target = "tile_proto::frame",
                error = %err,
                command = text.split(' ').next().unwrap_or(""),
                "discarding undecodable text frame body"
            );
            Bytes::new()
        }
    };
    Frame { header: text, body }
}
