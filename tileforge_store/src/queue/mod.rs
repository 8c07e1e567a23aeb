//! The distributed metatile work queue.
//!
//! Jobs are serialized [`TileJob`]s; a pulled tile carries the queue receipt
//! in `queue_id` (or, after splitting, on its parent metatile) and the job is
//! deleted only once the whole metatile has been processed. Delivery is
//! at-least-once: a consumer crash leaves the job pending for redelivery,
//! and all stores tolerate the resulting replays.

mod memory;
mod redis;

pub use memory::MemoryQueue;
pub use redis::RedisQueue;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tileforge_core::{Tile, TileCoord, META_LAYER};

/// The serialized body of a queued metatile job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileJob {
	pub layer: String,
	pub coord: TileCoord,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub metadata: BTreeMap<String, String>,
}

impl TileJob {
	#[must_use]
	pub fn from_tile(tile: &Tile) -> TileJob {
		TileJob {
			layer: tile.layer().unwrap_or_default().to_string(),
			coord: tile.coord,
			metadata: tile.metadata.clone(),
		}
	}

	/// Rebuild the tile of a pulled job, attaching the queue receipt.
	#[must_use]
	pub fn into_tile(self, queue_id: String) -> Tile {
		let mut tile = Tile::new(self.coord);
		tile.metadata = self.metadata;
		tile.metadata.insert(META_LAYER.to_string(), self.layer);
		tile.queue_id = Some(queue_id);
		tile
	}
}

/// Counts reported by [`TileQueue::status`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStatus {
	/// Jobs waiting to be pulled.
	pub queued: u64,
	/// Jobs pulled but not yet deleted.
	pub in_flight: u64,
}

/// A work queue distributing metatile jobs to slave processes.
#[async_trait]
pub trait TileQueue: Send + Sync {
	/// Enqueue one tile as a job.
	async fn push(&self, tile: &Tile) -> Result<()>;

	/// Pull up to `max` jobs, blocking briefly when the queue is empty.
	/// An empty result means the queue had nothing to deliver.
	async fn pull(&self, max: usize) -> Result<Vec<Tile>>;

	/// Acknowledge and delete a finished job by its receipt.
	async fn delete(&self, tile: &Tile) -> Result<()>;

	async fn status(&self) -> Result<QueueStatus>;
}

/// The queue receipt of a tile, looked up on the tile itself or on the
/// metatile it was split from.
#[must_use]
pub fn receipt(tile: &Tile) -> Option<&str> {
	tile.queue_id
		.as_deref()
		.or_else(|| tile.parent.as_ref().and_then(|parent| parent.queue_id.as_deref()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use tileforge_core::Metatile;

	#[test]
	fn job_round_trip() {
		let tile = Tile::new(TileCoord::new_meta(5, 8, 8, 2))
			.with_metadata(META_LAYER, "plan")
			.with_metadata("dimension_date", "2026");
		let job = TileJob::from_tile(&tile);
		assert_eq!(job.layer, "plan");

		let text = serde_json::to_string(&job).unwrap();
		let parsed: TileJob = serde_json::from_str(&text).unwrap();
		let rebuilt = parsed.into_tile("1-0".to_string());
		assert_eq!(rebuilt.coord, tile.coord);
		assert_eq!(rebuilt.layer(), Some("plan"));
		assert_eq!(rebuilt.metadata.get("dimension_date").map(String::as_str), Some("2026"));
		assert_eq!(rebuilt.queue_id.as_deref(), Some("1-0"));
	}

	#[test]
	fn receipt_falls_back_to_parent() {
		let mut tile = Tile::new(TileCoord::new(5, 8, 8));
		assert_eq!(receipt(&tile), None);

		tile.parent = Some(Metatile::new(
			TileCoord::new_meta(5, 8, 8, 2),
			Some("7-1".to_string()),
		));
		assert_eq!(receipt(&tile), Some("7-1"));

		tile.queue_id = Some("9-0".to_string());
		assert_eq!(receipt(&tile), Some("9-0"));
	}
}
