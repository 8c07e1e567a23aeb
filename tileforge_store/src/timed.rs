use crate::traits::TileStore;
use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;
use std::time::Instant;
use tileforge_core::{Tile, TileCoord};

/// Wraps any store and logs the duration of each operation at DEBUG level.
/// Semantics are unchanged.
pub struct TimedStore {
	inner: Arc<dyn TileStore>,
}

impl TimedStore {
	#[must_use]
	pub fn new(inner: Arc<dyn TileStore>) -> TimedStore {
		TimedStore { inner }
	}
}

#[async_trait]
impl TileStore for TimedStore {
	fn name(&self) -> String {
		self.inner.name()
	}

	async fn get_one(&self, tile: &mut Tile) -> Result<bool> {
		let start = Instant::now();
		let found = self.inner.get_one(tile).await?;
		debug!("{}: get {} took {:?}", self.inner.name(), tile.coord, start.elapsed());
		Ok(found)
	}

	async fn put_one(&self, tile: &Tile) -> Result<()> {
		let start = Instant::now();
		self.inner.put_one(tile).await?;
		debug!("{}: put {} took {:?}", self.inner.name(), tile.coord, start.elapsed());
		Ok(())
	}

	async fn delete_one(&self, tile: &Tile) -> Result<()> {
		let start = Instant::now();
		self.inner.delete_one(tile).await?;
		debug!(
			"{}: delete {} took {:?}",
			self.inner.name(),
			tile.coord,
			start.elapsed()
		);
		Ok(())
	}

	async fn list(&self) -> Result<Vec<TileCoord>> {
		self.inner.list().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::memory::MemoryStore;
	use tileforge_core::Blob;

	#[tokio::test]
	async fn semantics_unchanged() {
		let inner = Arc::new(MemoryStore::new());
		let timed = TimedStore::new(inner.clone());

		let coord = TileCoord::new(2, 1, 1);
		timed
			.put_one(&Tile::new(coord).with_data(Blob::from("x")))
			.await
			.unwrap();
		assert!(inner.contains(&coord));

		let mut tile = Tile::new(coord);
		assert!(timed.get_one(&mut tile).await.unwrap());
		timed.delete_one(&tile).await.unwrap();
		assert!(inner.is_empty());
	}
}
