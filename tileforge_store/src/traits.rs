use anyhow::Result;
use async_trait::async_trait;
use tileforge_core::{Tile, TileCoord};

/// A tile cache backend.
///
/// All operations address single tiles; callers resolve a metatile into its
/// constituents before touching the store. `put_one` overwrites, `delete_one`
/// of a missing tile succeeds, so replaying a redelivered job is safe.
#[async_trait]
pub trait TileStore: Send + Sync {
	/// Backend name for logs, e.g. `"file(/var/cache/tiles)"`.
	fn name(&self) -> String;

	/// Load the cached payload into `tile.data`. Returns `false` and leaves
	/// the tile untouched when the coordinate is not cached.
	async fn get_one(&self, tile: &mut Tile) -> Result<bool>;

	/// Write `tile.data` under the tile's coordinate.
	async fn put_one(&self, tile: &Tile) -> Result<()>;

	/// Remove the tile's coordinate from the cache, if present.
	async fn delete_one(&self, tile: &Tile) -> Result<()>;

	/// Enumerate every cached coordinate.
	async fn list(&self) -> Result<Vec<TileCoord>>;
}
