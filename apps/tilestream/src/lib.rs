pub mod cache;
pub mod config;
pub mod decode;
pub mod layer;
pub mod session;
pub mod telemetry;
pub mod viewport;

pub use layer::{Dispatch, TileLayer};
pub use viewport::{DocumentExtent, HeadlessViewport, Viewport};
