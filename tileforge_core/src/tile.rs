//! The unit of work flowing through a generation pipeline.

use crate::error::TileError;
use crate::types::{Blob, TileCoord};
use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Metadata key naming the layer a tile belongs to.
pub const META_LAYER: &str = "layer";

/// Shared completion state of a metatile whose sub-tiles travel separately
/// after splitting.
///
/// Each sub-tile holds an `Arc<Metatile>`; the queue job behind the metatile
/// may only be acknowledged once every sub-tile has finished.
pub struct Metatile {
	pub coord: TileCoord,
	/// The queue receipt to acknowledge when all sub-tiles are done.
	pub queue_id: Option<String>,
	pending: AtomicU32,
}

impl Metatile {
	#[must_use]
	pub fn new(coord: TileCoord, queue_id: Option<String>) -> Arc<Metatile> {
		Arc::new(Metatile {
			pending: AtomicU32::new(coord.n * coord.n),
			coord,
			queue_id,
		})
	}

	/// Record one finished sub-tile. Returns `true` exactly once, for the
	/// last sub-tile to complete.
	pub fn complete_one(&self) -> bool {
		self.pending.fetch_sub(1, Ordering::AcqRel) == 1
	}

	#[must_use]
	pub fn pending(&self) -> u32 {
		self.pending.load(Ordering::Acquire)
	}
}

impl Debug for Metatile {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Metatile")
			.field("coord", &self.coord)
			.field("pending", &self.pending())
			.finish()
	}
}

/// A tile (or unsplit metatile) with its payload and bookkeeping.
///
/// A tile whose `error` is set still travels down the stream so the final
/// consumer can count and log it, but every stage skips it.
#[derive(Clone, Debug, Default)]
pub struct Tile {
	pub coord: TileCoord,
	pub data: Option<Blob>,
	pub content_type: Option<String>,
	pub metadata: BTreeMap<String, String>,
	pub error: Option<TileError>,
	/// Completion state of the metatile this tile was split from.
	pub parent: Option<Arc<Metatile>>,
	/// Queue receipt, set while the tile itself is an unsplit queue job.
	pub queue_id: Option<String>,
}

impl Tile {
	#[must_use]
	pub fn new(coord: TileCoord) -> Tile {
		Tile {
			coord,
			..Default::default()
		}
	}

	#[must_use]
	pub fn with_data(mut self, data: Blob) -> Tile {
		self.data = Some(data);
		self
	}

	#[must_use]
	pub fn with_metadata(mut self, key: &str, value: &str) -> Tile {
		self.metadata.insert(key.to_string(), value.to_string());
		self
	}

	#[must_use]
	pub fn layer(&self) -> Option<&str> {
		self.metadata.get(META_LAYER).map(String::as_str)
	}

	#[must_use]
	pub fn is_errored(&self) -> bool {
		self.error.is_some()
	}

	pub fn set_error(&mut self, error: TileError) {
		self.error = Some(error);
	}
}
