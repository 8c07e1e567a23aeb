use crate::traits::TileStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tileforge_core::{Blob, Tile, TileCoord};

/// An in-process tile cache for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
	tiles: Mutex<BTreeMap<TileCoord, Blob>>,
}

impl MemoryStore {
	#[must_use]
	pub fn new() -> MemoryStore {
		MemoryStore::default()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.tiles.lock().unwrap().len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	#[must_use]
	pub fn contains(&self, coord: &TileCoord) -> bool {
		self.tiles.lock().unwrap().contains_key(coord)
	}
}

#[async_trait]
impl TileStore for MemoryStore {
	fn name(&self) -> String {
		"memory".to_string()
	}

	async fn get_one(&self, tile: &mut Tile) -> Result<bool> {
		match self.tiles.lock().unwrap().get(&tile.coord) {
			Some(data) => {
				tile.data = Some(data.clone());
				Ok(true)
			}
			None => Ok(false),
		}
	}

	async fn put_one(&self, tile: &Tile) -> Result<()> {
		let data = tile
			.data
			.as_ref()
			.with_context(|| format!("tile {} has no data to store", tile.coord))?;
		self.tiles.lock().unwrap().insert(tile.coord, data.clone());
		Ok(())
	}

	async fn delete_one(&self, tile: &Tile) -> Result<()> {
		self.tiles.lock().unwrap().remove(&tile.coord);
		Ok(())
	}

	async fn list(&self) -> Result<Vec<TileCoord>> {
		Ok(self.tiles.lock().unwrap().keys().copied().collect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn round_trip() {
		let store = MemoryStore::new();
		let coord = TileCoord::new(3, 1, 2);
		store
			.put_one(&Tile::new(coord).with_data(Blob::from("x")))
			.await
			.unwrap();
		assert!(store.contains(&coord));

		let mut tile = Tile::new(coord);
		assert!(store.get_one(&mut tile).await.unwrap());
		assert_eq!(tile.data, Some(Blob::from("x")));

		store.delete_one(&tile).await.unwrap();
		assert!(store.is_empty());
	}
}
