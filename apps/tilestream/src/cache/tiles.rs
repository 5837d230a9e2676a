use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tile_proto::TileCoord;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use super::{LoadTicket, TileCompletion, TileOutcome, TileSource};
use crate::decode::{DecodedTile, TileLoadError};

#[derive(Debug)]
pub struct TileElement {
    coord: TileCoord,
    source: TileSource,
    attached: bool,
    complete: bool,
    handlers_armed: bool,
    generation: u64,
    completion: Option<TileCompletion>,
}

impl TileElement {
    fn new(coord: TileCoord, completion: TileCompletion) -> Self {
        Self {
            coord,
            source: TileSource::Empty,
            attached: true,
            complete: false,
            handlers_armed: true,
            generation: 0,
            completion: Some(completion),
        }
    }

    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    pub fn source(&self) -> &TileSource {
        &self.source
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn handlers_armed(&self) -> bool {
        self.handlers_armed
    }

    /// An image is assigned but its load has not finished.
    pub fn is_loading(&self) -> bool {
        matches!(self.source, TileSource::Image(_)) && !self.complete
    }

    fn resolve(&mut self, outcome: TileOutcome) {
        if let Some(completion) = self.completion.take() {
            completion.resolve(outcome);
        }
    }
}

/// Registry of live tile elements, owned by the layer.
///
/// All mutation happens on the session loop; there is no interior locking.
#[derive(Debug, Default)]
pub struct TileCache {
    tiles: HashMap<TileCoord, TileElement>,
    error_tile_url: Option<String>,
}

impl TileCache {
    pub fn new(error_tile_url: Option<String>) -> Self {
        Self {
            tiles: HashMap::new(),
            error_tile_url: error_tile_url.filter(|url| !url.is_empty()),
        }
    }

    /// Materialize an element for `coord`. Re-creating a tracked coordinate
    /// replaces the old element, whose completion then reports `Evicted`.
    pub fn create_tile(&mut self, coord: TileCoord) -> oneshot::Receiver<TileOutcome> {
        let (completion, rx) = TileCompletion::channel();
        if let Some(mut previous) = self.tiles.insert(coord, TileElement::new(coord, completion)) {
            previous.handlers_armed = false;
            previous.resolve(TileOutcome::Evicted);
        }
        trace!(target = "tilestream::cache", tile = %coord, "tile created");
        rx
    }

    /// Point the element at `coord` to a freshly received image. Returns
    /// `None` when nothing tracks that coordinate, leaving the cache as is.
    pub fn assign_image(&mut self, coord: TileCoord, image: Bytes) -> Option<LoadTicket> {
        let element = self.tiles.get_mut(&coord)?;
        element.generation += 1;
        element.source = TileSource::Image(image);
        element.complete = false;
        Some(LoadTicket {
            coord,
            generation: element.generation,
        })
    }

    /// Deliver the result of a load started by [`Self::assign_image`].
    ///
    /// Returns `false` when the result was discarded: the element is gone,
    /// its handlers were disarmed, or a newer image superseded the ticket.
    pub fn complete_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<DecodedTile, TileLoadError>,
    ) -> bool {
        let Some(element) = self.tiles.get_mut(&ticket.coord) else {
            trace!(target = "tilestream::cache", tile = %ticket.coord, "load finished for untracked tile");
            return false;
        };
        if !element.handlers_armed || element.generation != ticket.generation {
            trace!(
                target = "tilestream::cache",
                tile = %ticket.coord,
                armed = element.handlers_armed,
                generation = ticket.generation,
                current = element.generation,
                "ignoring stale load result"
            );
            return false;
        }
        element.complete = true;
        match result {
            Ok(decoded) => {
                element.source = TileSource::Loaded(Arc::new(decoded));
                element.resolve(TileOutcome::Loaded);
            }
            Err(error) => {
                debug!(target = "tilestream::cache", tile = %ticket.coord, %error, "tile failed to load");
                let fallback = self.error_tile_url.clone();
                if let Some(url) = &fallback {
                    element.source = TileSource::Fallback(url.clone());
                }
                element.resolve(TileOutcome::Failed { error, fallback });
            }
        }
        true
    }

    /// Stop every tile from reacting to loads still in flight. Tiles that
    /// have not finished loading are blanked and detached right away so a
    /// late decode cannot surface stale pixels. Returns how many were blanked.
    pub fn abort_loading(&mut self) -> usize {
        let mut blanked = 0;
        for element in self.tiles.values_mut() {
            element.handlers_armed = false;
            if element.is_loading() {
                element.source = TileSource::Blank;
                element.attached = false;
                blanked += 1;
            }
            element.resolve(TileOutcome::Aborted);
        }
        debug!(
            target = "tilestream::cache",
            tracked = self.tiles.len(),
            blanked,
            "aborted tile loading"
        );
        blanked
    }

    /// Remove an element on the viewport's behalf.
    pub fn evict(&mut self, coord: TileCoord) -> Option<TileElement> {
        let mut element = self.tiles.remove(&coord)?;
        element.handlers_armed = false;
        element.resolve(TileOutcome::Evicted);
        Some(element)
    }

    pub fn get(&self, coord: TileCoord) -> Option<&TileElement> {
        self.tiles.get(&coord)
    }

    pub fn contains(&self, coord: TileCoord) -> bool {
        self.tiles.contains_key(&coord)
    }

    pub fn keys(&self) -> impl Iterator<Item = TileCoord> + '_ {
        self.tiles.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}
