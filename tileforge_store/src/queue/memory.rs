use super::{QueueStatus, TileJob, TileQueue};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use tileforge_core::Tile;

#[derive(Default)]
struct Inner {
	next_id: u64,
	queued: VecDeque<(String, TileJob)>,
	in_flight: BTreeMap<String, TileJob>,
}

/// An in-process queue for `local` runs and tests. Jobs pulled but never
/// deleted stay in flight, mirroring the pending list of the Redis queue.
#[derive(Default)]
pub struct MemoryQueue {
	inner: Mutex<Inner>,
}

impl MemoryQueue {
	#[must_use]
	pub fn new() -> MemoryQueue {
		MemoryQueue::default()
	}
}

#[async_trait]
impl TileQueue for MemoryQueue {
	async fn push(&self, tile: &Tile) -> Result<()> {
		let mut inner = self.inner.lock().unwrap();
		let id = inner.next_id.to_string();
		inner.next_id += 1;
		let job = TileJob::from_tile(tile);
		inner.queued.push_back((id, job));
		Ok(())
	}

	async fn pull(&self, max: usize) -> Result<Vec<Tile>> {
		let mut inner = self.inner.lock().unwrap();
		let mut tiles = Vec::new();
		while tiles.len() < max {
			let Some((id, job)) = inner.queued.pop_front() else {
				break;
			};
			inner.in_flight.insert(id.clone(), job.clone());
			tiles.push(job.into_tile(id));
		}
		Ok(tiles)
	}

	async fn delete(&self, tile: &Tile) -> Result<()> {
		let Some(id) = super::receipt(tile) else {
			bail!("tile {} carries no queue receipt", tile.coord);
		};
		self.inner.lock().unwrap().in_flight.remove(id);
		Ok(())
	}

	async fn status(&self) -> Result<QueueStatus> {
		let inner = self.inner.lock().unwrap();
		Ok(QueueStatus {
			queued: inner.queued.len() as u64,
			in_flight: inner.in_flight.len() as u64,
		})
	}
}
