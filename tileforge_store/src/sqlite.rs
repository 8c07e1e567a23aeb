use crate::traits::TileStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::rusqlite::{params, OptionalExtension};
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;
use tileforge_core::{Blob, Tile, TileCoord};

/// An SQLite tile cache, one database file per layer and style.
///
/// Tiles live in a `tiles` table keyed by `(zoom_level, tile_column,
/// tile_row)`; rows are stored top-down, matching the grid origin.
pub struct SqliteStore {
	pool: Pool<SqliteConnectionManager>,
	path: String,
}

impl SqliteStore {
	/// Open (and initialize if needed) the database at `path`.
	pub fn open(path: &Path) -> Result<SqliteStore> {
		let manager = SqliteConnectionManager::file(path);
		let pool = Pool::builder()
			.max_size(4)
			.build(manager)
			.with_context(|| format!("opening tile database {path:?}"))?;
		let connection = pool.get()?;
		connection.execute_batch(
			"CREATE TABLE IF NOT EXISTS tiles (
				zoom_level INTEGER NOT NULL,
				tile_column INTEGER NOT NULL,
				tile_row INTEGER NOT NULL,
				tile_data BLOB NOT NULL,
				PRIMARY KEY (zoom_level, tile_column, tile_row)
			)",
		)?;
		Ok(SqliteStore {
			pool,
			path: path.display().to_string(),
		})
	}
}

#[async_trait]
impl TileStore for SqliteStore {
	fn name(&self) -> String {
		format!("sqlite({})", self.path)
	}

	async fn get_one(&self, tile: &mut Tile) -> Result<bool> {
		let connection = self.pool.get()?;
		let data: Option<Vec<u8>> = connection
			.query_row(
				"SELECT tile_data FROM tiles WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3",
				params![tile.coord.z, tile.coord.x, tile.coord.y],
				|row| row.get(0),
			)
			.optional()?;
		match data {
			Some(data) => {
				tile.data = Some(Blob::from(data));
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
		let connection = self.pool.get()?;
		connection.execute(
			"INSERT OR REPLACE INTO tiles (zoom_level, tile_column, tile_row, tile_data)
			 VALUES (?1, ?2, ?3, ?4)",
			params![tile.coord.z, tile.coord.x, tile.coord.y, data.as_slice()],
		)?;
		Ok(())
	}

	async fn delete_one(&self, tile: &Tile) -> Result<()> {
		let connection = self.pool.get()?;
		connection.execute(
			"DELETE FROM tiles WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3",
			params![tile.coord.z, tile.coord.x, tile.coord.y],
		)?;
		Ok(())
	}

	async fn list(&self) -> Result<Vec<TileCoord>> {
		let connection = self.pool.get()?;
		let mut statement = connection
			.prepare("SELECT zoom_level, tile_column, tile_row FROM tiles ORDER BY zoom_level, tile_row, tile_column")?;
		let coords = statement
			.query_map([], |row| {
				Ok(TileCoord::new(row.get::<_, u8>(0)?, row.get::<_, u32>(1)?, row.get::<_, u32>(2)?))
			})?
			.collect::<Result<Vec<_>, _>>()?;
		Ok(coords)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let store = SqliteStore::open(&dir.path().join("plan.sqlitedb")).unwrap();

		let coord = TileCoord::new(4, 6, 2);
		store
			.put_one(&Tile::new(coord).with_data(Blob::from("payload")))
			.await
			.unwrap();

		let mut tile = Tile::new(coord);
		assert!(store.get_one(&mut tile).await.unwrap());
		assert_eq!(tile.data, Some(Blob::from("payload")));

		store.delete_one(&tile).await.unwrap();
		assert!(!store.get_one(&mut tile).await.unwrap());
	}

	#[tokio::test]
	async fn put_overwrites() {
		let dir = tempfile::tempdir().unwrap();
		let store = SqliteStore::open(&dir.path().join("plan.sqlitedb")).unwrap();

		let coord = TileCoord::new(1, 0, 0);
		for payload in ["first", "second"] {
			store
				.put_one(&Tile::new(coord).with_data(Blob::from(payload)))
				.await
				.unwrap();
		}
		let mut tile = Tile::new(coord);
		store.get_one(&mut tile).await.unwrap();
		assert_eq!(tile.data, Some(Blob::from("second")));
		assert_eq!(store.list().await.unwrap(), vec![coord]);
	}
}
