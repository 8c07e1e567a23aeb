//! Detection and dropping of "empty" tiles.
//!
//! A WMS server renders areas without content as a perfectly reproducible
//! image, so an empty tile is recognizable by its exact byte size and SHA-1
//! digest. Dropped tiles are also deleted from the cache, so re-generation
//! removes content that has since disappeared.

use anyhow::{ensure, Result};
use sha1::{Digest, Sha1};
use std::sync::Arc;
use tileforge_core::{Blob, Count, Tile, TileError};
use tileforge_store::queue::{receipt, TileQueue};
use tileforge_store::TileStore;

/// Hex SHA-1 digest of a payload.
#[must_use]
pub fn sha1_hex(data: &[u8]) -> String {
	let mut hasher = Sha1::new();
	hasher.update(data);
	format!("{:x}", hasher.finalize())
}

/// The size/hash pair identifying an empty rendering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmptySignature {
	pub size: u64,
	pub hash: String,
}

impl EmptySignature {
	/// The size is compared first so almost every tile skips the digest.
	#[must_use]
	pub fn matches(&self, data: &Blob) -> bool {
		data.len() as u64 == self.size && sha1_hex(data.as_slice()) == self.hash
	}
}

/// Drops tiles (or whole metatiles) matching an [`EmptySignature`], deleting
/// their cache entries and retiring their queue jobs.
pub struct HashDropper {
	signature: EmptySignature,
	store: Option<Arc<dyn TileStore>>,
	queue: Option<Arc<dyn TileQueue>>,
	pub dropped: Count,
}

impl HashDropper {
	#[must_use]
	pub fn new(
		signature: EmptySignature,
		store: Option<Arc<dyn TileStore>>,
		queue: Option<Arc<dyn TileQueue>>,
	) -> HashDropper {
		HashDropper {
			signature,
			store,
			queue,
			dropped: Count::default(),
		}
	}

	/// Drop the tile when its payload matches the signature.
	///
	/// For a matching metatile every constituent coordinate is deleted from
	/// the cache and the queue job is acknowledged at once. For a matching
	/// sub-tile only its own coordinate is deleted, and the job is
	/// acknowledged once the last sibling completes.
	pub async fn apply(&self, tile: Tile) -> Result<Option<Tile>, (Tile, TileError)> {
		let matches = match &tile.data {
			Some(data) => self.signature.matches(data),
			None => false,
		};
		if !matches {
			return Ok(Some(tile));
		}

		if let Err(error) = self.drop_tile(&tile).await {
			return Err((tile, TileError::Store(format!("{error:#}"))));
		}
		self.dropped.inc();
		Ok(None)
	}

	async fn drop_tile(&self, tile: &Tile) -> Result<()> {
		if let Some(store) = &self.store {
			for coord in tile.coord.tiles() {
				let mut target = Tile::new(coord);
				target.metadata = tile.metadata.clone();
				store.delete_one(&target).await?;
			}
		}

		let Some(queue) = &self.queue else {
			return Ok(());
		};
		if tile.coord.is_meta() || tile.parent.is_none() {
			// unsplit metatile, acknowledged directly
			if receipt(tile).is_some() {
				queue.delete(tile).await?;
			}
		} else if let Some(parent) = &tile.parent {
			if parent.complete_one() && parent.queue_id.is_some() {
				queue.delete(tile).await?;
			}
		}
		Ok(())
	}
}

/// Computes the signature of a known-empty tile for `--get-hash`.
pub struct HashReporter;

impl HashReporter {
	/// Report the payload's signature, refusing non-uniform images since a
	/// tile with visible content makes no sense as an emptiness reference.
	pub fn report(data: &Blob) -> Result<String> {
		let image = image::load_from_memory(data.as_slice())?.to_rgba8();
		let first = image.pixels().next();
		ensure!(
			image.pixels().all(|pixel| Some(pixel) == first),
			"the tile is not uniform, it has real content and cannot serve as an emptiness reference"
		);
		Ok(format!(
			"  size: {}\n  hash: {}",
			data.len(),
			sha1_hex(data.as_slice())
		))
	}
}
