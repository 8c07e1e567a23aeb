//! Renderer adapters: sources the pipeline fetches metatile images from.

mod wms;

pub use wms::WmsRenderer;

use anyhow::Result;
use async_trait::async_trait;
use tileforge_core::{Blob, Tile};

/// A source of rendered images.
///
/// The pipeline never inspects renderer internals: any failure becomes a
/// per-tile `TileError::Render` and the stream continues.
#[async_trait]
pub trait Renderer: Send + Sync {
	/// Render the image covering `tile.coord` (a metatile renders all its
	/// constituents at once, plus the configured pixel border).
	async fn fetch(&self, tile: &Tile) -> Result<Blob>;
}
