//! Tile elements tracked for the visible grid, keyed by [`TileCoord`].
//!
//! The viewport creates and evicts elements; the protocol layer only fills
//! them with image data. Each element carries a [`TileCompletion`] that the
//! viewport awaits: it resolves exactly once, whether the tile loads, fails,
//! is aborted or is evicted, so the viewport's pending-tile accounting can
//! never be left dangling.
//!
//! ```
//! # use tilestream_client_core::cache::{TileCache, TileSource};
//! # use tile_proto::TileCoord;
//! let mut cache = TileCache::new(None);
//! let coord = TileCoord::new(0, 0, 10);
//! let _done = cache.create_tile(coord);
//! let ticket = cache.assign_image(coord, bytes::Bytes::from_static(b"png")).unwrap();
//! assert!(matches!(cache.get(coord).unwrap().source(), TileSource::Image(_)));
//! cache.abort_loading();
//! assert!(!cache.complete_load(ticket, Err(tilestream_client_core::decode::TileLoadError::Empty)));
//! ```

use std::sync::Arc;

use bytes::Bytes;
use tile_proto::TileCoord;
use tokio::sync::oneshot;

use crate::decode::{DecodedTile, TileLoadError};

pub mod tiles;

pub use tiles::{TileCache, TileElement};

/// What an element currently displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileSource {
    /// Created, nothing assigned yet.
    Empty,
    /// Encoded image assigned; decode in flight.
    Image(Bytes),
    Loaded(Arc<DecodedTile>),
    /// Redirected to the configured error tile after a failed load.
    Fallback(String),
    /// Reset by an abort before its load finished.
    Blank,
}

/// How an element's lifetime resolved, as reported to the viewport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileOutcome {
    Loaded,
    Failed {
        error: TileLoadError,
        fallback: Option<String>,
    },
    Aborted,
    Evicted,
}

/// Identifies one image assignment. A newer assignment to the same element
/// makes older tickets stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    pub coord: TileCoord,
    pub generation: u64,
}

/// Single-use sender for an element's [`TileOutcome`].
///
/// Consumed by [`TileCompletion::resolve`]; dropping it unresolved reports
/// [`TileOutcome::Evicted`].
#[derive(Debug)]
pub struct TileCompletion {
    tx: Option<oneshot::Sender<TileOutcome>>,
}

impl TileCompletion {
    pub fn channel() -> (Self, oneshot::Receiver<TileOutcome>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn resolve(mut self, outcome: TileOutcome) {
        if let Some(tx) = self.tx.take() {
            // The viewport may have stopped listening; that is fine.
            let _ = tx.send(outcome);
        }
    }
}

impl Drop for TileCompletion {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(TileOutcome::Evicted);
        }
    }
}
