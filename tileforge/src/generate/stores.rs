//! Builds the configured store backend for each layer.

use crate::config::{CacheConfig, LayerConfig};
use anyhow::Result;
use std::sync::Arc;
use tileforge_core::Grid;
use tileforge_store::{FileStore, MemoryStore, ObjectTileStore, SqliteStore, TileStore, TimedStore, WmtsLayout};

/// The WMTS cache key layout of a layer: its grid name is the matrix set,
/// its dimension values become path components.
pub fn layer_layout(name: &str, layer: &LayerConfig, grid: &Grid) -> WmtsLayout {
	let dimensions = layer.dimensions.iter().map(|dimension| dimension.value.clone()).collect();
	let identifiers = (0..grid.zoom_count()).map(|z| grid.matrix_identifier(z)).collect();
	WmtsLayout::new(
		name,
		layer.wmts_style.as_str(),
		dimensions,
		layer.grid.as_str(),
		identifiers,
		layer.extension.as_str(),
	)
}

/// Open one layer's store on the given cache backend, wrapped for per-op
/// duration logging.
pub fn open_store(cache: &CacheConfig, name: &str, layer: &LayerConfig, grid: &Grid) -> Result<Arc<dyn TileStore>> {
	let layout = layer_layout(name, layer, grid);
	let store: Arc<dyn TileStore> = match cache {
		CacheConfig::Filesystem { folder } => Arc::new(FileStore::new(folder.clone(), layout)),
		CacheConfig::Sqlite { folder } => {
			let path = folder.join(format!("{name}.sqlite"));
			Arc::new(SqliteStore::open(&path)?)
		}
		CacheConfig::S3 { bucket, folder } => {
			let store = ObjectTileStore::s3(bucket, layout)?;
			Arc::new(if folder.is_empty() {
				store
			} else {
				store.with_prefix(folder.as_str())
			})
		}
		CacheConfig::Memory {} => Arc::new(MemoryStore::new()),
	};
	Ok(Arc::new(TimedStore::new(store)))
}
