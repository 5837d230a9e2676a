use std::io::Cursor;

use futures_util::{SinkExt, StreamExt};
use image::{ImageBuffer, ImageFormat, Rgba};
use tile_proto::{Fields, TileCoord};
use tilestream_client_core::cache::TileSource;
use tilestream_client_core::config::LayerOptions;
use tilestream_client_core::session::{SessionConfig, drive, run_session};
use tilestream_client_core::{DocumentExtent, HeadlessViewport, TileLayer};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, client_async};

const STATUS: &str = "status type=text parts=1 current=0 width=12240 height=15840";

fn png_tile() -> Vec<u8> {
    let buffer = ImageBuffer::from_pixel(8, 8, Rgba([200u8, 100, 50, 255]));
    let mut out = Cursor::new(Vec::new());
    buffer
        .write_to(&mut out, ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

fn binary_frame(header: &str, body: &[u8]) -> Message {
    let mut raw = header.as_bytes().to_vec();
    raw.push(b'\n');
    raw.extend_from_slice(body);
    Message::Binary(raw)
}

async fn next_text<S>(ws: &mut tokio_tungstenite::WebSocketStream<S>) -> String
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    loop {
        match ws.next().await.expect("client hung up").expect("read") {
            Message::Text(text) => return text,
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected client message: {other:?}"),
        }
    }
}

/// Plays the engine: answers the document load with a status (twice), echoes
/// the requested tile with real image data, then sends a stray tile and a
/// message the layer does not handle before closing.
async fn fake_engine(listener: TcpListener) -> Vec<String> {
    let (stream, _) = listener.accept().await.expect("accept");
    let mut ws = accept_async(stream).await.expect("handshake");
    let mut received = Vec::new();

    received.push(next_text(&mut ws).await);
    received.push(next_text(&mut ws).await);
    ws.send(Message::Text(STATUS.into())).await.expect("send status");
    ws.send(Message::Text(STATUS.into())).await.expect("send status");

    let request = next_text(&mut ws).await;
    let fields = Fields::parse(&request);
    assert_eq!(fields.tile_pos_x, Some(3840));
    received.push(request.clone());
    ws.send(binary_frame(&request, &png_tile())).await.expect("send tile");

    let stray = request.replace("tileposx=3840", "tileposx=38400");
    ws.send(binary_frame(&stray, &png_tile())).await.expect("send stray");
    ws.send(Message::Text("invalidatetiles: EMPTY".into()))
        .await
        .expect("send invalidate");
    ws.close(None).await.expect("close");
    received
}

fn layer_and_viewport() -> (TileLayer, HeadlessViewport) {
    let options = LayerOptions {
        doc: Some("file:///srv/docs/report.odt".into()),
        ..LayerOptions::default()
    };
    let viewport = HeadlessViewport::new(options.geometry(), options.default_zoom_config());
    (TileLayer::new(options), viewport)
}

#[test_timeout::tokio_timeout_test(30)]
async fn session_loads_requested_tile_and_drops_strays() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let engine = tokio::spawn(fake_engine(listener));

    let (mut layer, mut viewport) = layer_and_viewport();
    let coord = TileCoord::new(1, 0, 10);
    let config = SessionConfig {
        url: format!("ws://{addr}/ws"),
        doc: layer.options().doc.clone(),
        initial_tile: Some(coord),
    };
    let summary = run_session(&config, &mut layer, &mut viewport)
        .await
        .expect("session");

    let received = engine.await.expect("engine task");
    assert_eq!(received[0], "load url=file:///srv/docs/report.odt");
    assert_eq!(received[1], "status");
    assert!(received[2].starts_with("tile part=0 width=256 height=256 tileposx=3840 tileposy=0"));

    assert_eq!(summary.statuses_applied, 1);
    assert_eq!(summary.statuses_unchanged, 1);
    assert_eq!(summary.tiles_loaded, 1);
    assert_eq!(summary.tiles_dropped, 1);
    assert_eq!(summary.forwarded, 1);
    assert_eq!(summary.aborted, 0);

    assert_eq!(
        viewport.extent(),
        Some(DocumentExtent {
            width_twips: 12240,
            height_twips: 15840,
        })
    );
    assert_eq!(viewport.refreshes(), 1);

    let element = layer.cache().get(coord).expect("tile tracked");
    assert!(element.is_attached());
    assert!(!element.handlers_armed());
    match element.source() {
        TileSource::Loaded(tile) => assert_eq!((tile.width, tile.height), (8, 8)),
        other => panic!("tile not loaded: {other:?}"),
    }
}

#[test_timeout::tokio_timeout_test(30)]
async fn session_without_document_only_listens() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let engine = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("handshake");
        ws.send(Message::Binary(STATUS.as_bytes().to_vec()))
            .await
            .expect("send status");
        ws.send(Message::Text("status width=0 height=0".into()))
            .await
            .expect("send empty status");
        ws.close(None).await.expect("close");
    });

    let stream = tokio::net::TcpStream::connect(addr).await.expect("connect");
    let (ws, _) = client_async(format!("ws://{addr}/ws"), stream)
        .await
        .expect("client handshake");
    let (mut layer, mut viewport) = layer_and_viewport();
    let summary = drive(ws, &SessionConfig::default(), &mut layer, &mut viewport)
        .await
        .expect("session");
    engine.await.expect("engine task");

    assert_eq!(summary.messages, 2);
    assert_eq!(summary.statuses_applied, 1);
    assert_eq!(summary.ignored, 1);
    assert!(layer.cache().is_empty());
    assert_eq!(viewport.grid_span(), Some((4, 5)));
}
