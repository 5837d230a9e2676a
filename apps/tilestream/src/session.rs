//! Websocket session with the rendering engine.
//!
//! One task owns the [`TileLayer`]: socket messages are handled strictly in
//! arrival order, image decodes run on the blocking pool and report back over
//! a channel into the same loop. When the socket closes or a send fails,
//! decodes for tiles already received are allowed to finish, then loading is
//! aborted. There is no reconnect.

use futures_util::{SinkExt, StreamExt};
use tile_proto::{load_command, status_command, Payload, TileCoord, TileRequest};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, WebSocketStream};
use tracing::{debug, info, warn};

use crate::cache::{LoadTicket, TileOutcome};
use crate::decode::{decode_tile, DecodedTile, TileLoadError};
use crate::layer::{Dispatch, TileLayer};
use crate::viewport::Viewport;

#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub url: String,
    /// Sent as `load url=...` followed by `status` on connect.
    pub doc: Option<String>,
    /// Tile to create and request once the document extent is known.
    pub initial_tile: Option<TileCoord>,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
}

/// Counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub messages: u64,
    pub statuses_applied: u64,
    pub statuses_unchanged: u64,
    pub tiles_loaded: u64,
    pub tiles_failed: u64,
    pub tiles_dropped: u64,
    pub ignored: u64,
    pub forwarded: u64,
    pub aborted: usize,
}

type DecodeResult = (LoadTicket, Result<DecodedTile, TileLoadError>);

pub async fn run_session(
    config: &SessionConfig,
    layer: &mut TileLayer,
    viewport: &mut dyn Viewport,
) -> Result<SessionSummary, SessionError> {
    info!(target = "tilestream::session", url = %config.url, "connecting");
    let (ws, _) = connect_async(config.url.as_str()).await?;
    drive(ws, config, layer, viewport).await
}

/// Run the message loop over an established websocket.
pub async fn drive<S>(
    mut ws: WebSocketStream<S>,
    config: &SessionConfig,
    layer: &mut TileLayer,
    viewport: &mut dyn Viewport,
) -> Result<SessionSummary, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Some(doc) = &config.doc {
        ws.send(Message::Text(load_command(doc))).await?;
        ws.send(Message::Text(status_command())).await?;
    }

    let (decode_tx, mut decode_rx) = mpsc::unbounded_channel::<DecodeResult>();
    let mut summary = SessionSummary::default();
    let mut pending_decodes = 0usize;
    let mut pending_request = config.initial_tile;
    let mut failure = None;

    loop {
        tokio::select! {
            Some((ticket, result)) = decode_rx.recv() => {
                pending_decodes -= 1;
                apply_decode(layer, &mut summary, ticket, result);
            }
            next = ws.next() => {
                let payload = match next {
                    Some(Ok(Message::Text(text))) => Payload::Text(text),
                    Some(Ok(Message::Binary(data))) => Payload::from(data),
                    Some(Ok(Message::Close(frame))) => {
                        debug!(target = "tilestream::session", ?frame, "engine closed the socket");
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        warn!(target = "tilestream::session", error = %err, "socket error");
                        break;
                    }
                    None => break,
                };
                summary.messages += 1;
                match layer.handle_payload(payload, viewport) {
                    Dispatch::StatusApplied(extent) => {
                        summary.statuses_applied += 1;
                        info!(
                            target = "tilestream::session",
                            width_twips = extent.width_twips,
                            height_twips = extent.height_twips,
                            "document extent"
                        );
                        if let Some(coord) = pending_request.take() {
                            if let Err(err) = request_tile(&mut ws, layer, viewport, coord).await {
                                failure = Some(err);
                                break;
                            }
                        }
                    }
                    Dispatch::StatusUnchanged => summary.statuses_unchanged += 1,
                    Dispatch::TileAssigned { ticket, image } => {
                        pending_decodes += 1;
                        let tx = decode_tx.clone();
                        tokio::task::spawn_blocking(move || {
                            let _ = tx.send((ticket, decode_tile(&image)));
                        });
                    }
                    Dispatch::TileDropped(_) => summary.tiles_dropped += 1,
                    Dispatch::Ignored(_) => summary.ignored += 1,
                    Dispatch::Forwarded(message) => {
                        summary.forwarded += 1;
                        debug!(target = "tilestream::session", command = message.command(), "unhandled engine message");
                    }
                }
            }
        }
    }

    while pending_decodes > 0 {
        let Some((ticket, result)) = decode_rx.recv().await else {
            break;
        };
        pending_decodes -= 1;
        apply_decode(layer, &mut summary, ticket, result);
    }
    summary.aborted = layer.abort_loading();
    info!(target = "tilestream::session", ?summary, "session finished");
    match failure {
        Some(err) => Err(err),
        None => Ok(summary),
    }
}

fn apply_decode(
    layer: &mut TileLayer,
    summary: &mut SessionSummary,
    ticket: LoadTicket,
    result: Result<DecodedTile, TileLoadError>,
) {
    let failed = result.is_err();
    if layer.complete_load(ticket, result) {
        if failed {
            summary.tiles_failed += 1;
        } else {
            summary.tiles_loaded += 1;
        }
    }
}

async fn request_tile<S>(
    ws: &mut WebSocketStream<S>,
    layer: &mut TileLayer,
    viewport: &dyn Viewport,
    coord: TileCoord,
) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let done = layer.create_tile(coord);
    tokio::spawn(log_outcome(coord, done));
    let request = TileRequest::for_coord(coord, &viewport.geometry(), layer.tile_size_px(viewport), 0);
    debug!(target = "tilestream::session", tile = %coord, "requesting tile");
    ws.send(Message::Text(request.to_command())).await?;
    Ok(())
}

async fn log_outcome(coord: TileCoord, done: tokio::sync::oneshot::Receiver<TileOutcome>) {
    match done.await {
        Ok(TileOutcome::Loaded) => info!(target = "tilestream::session", tile = %coord, "tile loaded"),
        Ok(outcome) => warn!(target = "tilestream::session", tile = %coord, ?outcome, "tile not loaded"),
        Err(_) => {}
    }
}
