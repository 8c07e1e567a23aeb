//! A lazy, asynchronous stream of tiles with per-item error isolation.
//!
//! Pipelines are chains of stages over a [`TileStream`]. Every stage obeys
//! two rules:
//!
//! * a tile already carrying an error passes through untouched, and
//! * a stage failure attaches a [`TileError`] to the tile and forwards it
//!   instead of ending the stream.
//!
//! The stream stays fully lazy: nothing runs until [`TileStream::consume`]
//! (or a test helper like [`TileStream::collect`]) drives it.

use crate::count::{Count, CountSize};
use crate::error::{TileError, TooManyErrors};
use crate::tile::Tile;
use crate::types::TileCoord;
use log::error;
use futures::future::ready;
use futures::stream::{self, BoxStream, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Trips when too many errored tiles arrive back to back.
///
/// A successful tile resets the run. Once tripped, the stream ends and
/// [`TileStream::consume`] reports [`TooManyErrors`].
pub struct ErrorBreaker {
	limit: u32,
	consecutive: AtomicU32,
	tripped: AtomicBool,
}

impl ErrorBreaker {
	#[must_use]
	pub fn new(limit: u32) -> Arc<ErrorBreaker> {
		Arc::new(ErrorBreaker {
			limit,
			consecutive: AtomicU32::new(0),
			tripped: AtomicBool::new(false),
		})
	}

	/// Record one item. Returns `false` when the limit is reached and the
	/// stream must stop.
	fn observe(&self, errored: bool) -> bool {
		if !errored {
			self.consecutive.store(0, Ordering::Release);
			return true;
		}
		let seen = self.consecutive.fetch_add(1, Ordering::AcqRel) + 1;
		if seen >= self.limit {
			self.tripped.store(true, Ordering::Release);
			return false;
		}
		true
	}

	#[must_use]
	pub fn is_tripped(&self) -> bool {
		self.tripped.load(Ordering::Acquire)
	}
}

/// Totals reported by [`TileStream::consume`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamSummary {
	/// Items that reached the end of the pipeline.
	pub count: u64,
	/// Items that arrived with an error attached.
	pub errors: u64,
	/// Bytes of payload carried by the successful items.
	pub size: u64,
}

/// A boxed asynchronous stream of [`Tile`]s.
pub struct TileStream<'a> {
	stream: BoxStream<'a, Tile>,
	breaker: Option<Arc<ErrorBreaker>>,
}

#[allow(clippy::should_implement_trait)]
impl<'a> TileStream<'a> {
	pub fn from_stream(stream: BoxStream<'a, Tile>) -> TileStream<'a> {
		TileStream { stream, breaker: None }
	}

	pub fn from_vec(tiles: Vec<Tile>) -> TileStream<'a> {
		Self::from_stream(stream::iter(tiles).boxed())
	}

	/// Build a stream lazily from an iterator: tiles are created one by one
	/// as the pipeline pulls them.
	pub fn from_iter<I>(iter: I) -> TileStream<'a>
	where
		I: Iterator<Item = Tile> + Send + 'a,
	{
		Self::from_stream(stream::iter(iter).boxed())
	}

	/// Build a stream of empty tiles from coordinates.
	pub fn from_coords<I>(coords: I) -> TileStream<'a>
	where
		I: Iterator<Item = TileCoord> + Send + 'a,
	{
		Self::from_iter(coords.map(Tile::new))
	}

	/// A synchronous stage mutating each tile in place.
	///
	/// An `Err` attaches the error to the tile and forwards it.
	pub fn map<F>(self, mut f: F) -> TileStream<'a>
	where
		F: FnMut(&mut Tile) -> Result<(), TileError> + Send + 'a,
	{
		let stream = self
			.stream
			.map(move |mut tile| {
				if !tile.is_errored() {
					if let Err(error) = f(&mut tile) {
						tile.set_error(error);
					}
				}
				tile
			})
			.boxed();
		TileStream {
			stream,
			breaker: self.breaker,
		}
	}

	/// A synchronous filter stage. `Ok(false)` drops the tile; errored tiles
	/// are always forwarded without calling `f`.
	pub fn retain<F>(self, mut f: F) -> TileStream<'a>
	where
		F: FnMut(&mut Tile) -> Result<bool, TileError> + Send + 'a,
	{
		let stream = self
			.stream
			.filter_map(move |mut tile| {
				let keep = if tile.is_errored() {
					true
				} else {
					match f(&mut tile) {
						Ok(keep) => keep,
						Err(error) => {
							tile.set_error(error);
							true
						}
					}
				};
				ready(keep.then_some(tile))
			})
			.boxed();
		TileStream {
			stream,
			breaker: self.breaker,
		}
	}

	/// An asynchronous stage. The future resolves to the processed tile, or
	/// to the tile plus the error to attach.
	pub fn map_async<F, Fut>(self, f: F) -> TileStream<'a>
	where
		F: Fn(Tile) -> Fut + Send + Sync + 'a,
		Fut: Future<Output = Result<Tile, (Tile, TileError)>> + Send,
	{
		self.filter_map_async(move |tile| {
			let fut = f(tile);
			async move { fut.await.map(Some) }
		})
	}

	/// An asynchronous filter stage. `Ok(None)` drops the tile; errored
	/// tiles are always forwarded without calling `f`.
	pub fn filter_map_async<F, Fut>(self, f: F) -> TileStream<'a>
	where
		F: Fn(Tile) -> Fut + Send + Sync + 'a,
		Fut: Future<Output = Result<Option<Tile>, (Tile, TileError)>> + Send,
	{
		let f = Arc::new(f);
		let stream = self
			.stream
			.filter_map(move |tile| {
				let f = Arc::clone(&f);
				async move {
					if tile.is_errored() {
						return Some(tile);
					}
					match f(tile).await {
						Ok(tile) => tile,
						Err((mut tile, error)) => {
							tile.set_error(error);
							Some(tile)
						}
					}
				}
			})
			.boxed();
		TileStream {
			stream,
			breaker: self.breaker,
		}
	}

	/// An asynchronous stage producing any number of tiles from each input
	/// tile, e.g. splitting a metatile. Errored tiles pass through alone.
	pub fn flat_map_async<F, Fut>(self, f: F) -> TileStream<'a>
	where
		F: Fn(Tile) -> Fut + Send + Sync + 'a,
		Fut: Future<Output = Vec<Tile>> + Send,
	{
		let f = Arc::new(f);
		let stream = self
			.stream
			.then(move |tile| {
				let f = Arc::clone(&f);
				async move {
					if tile.is_errored() {
						return vec![tile];
					}
					f(tile).await
				}
			})
			.flat_map(stream::iter)
			.boxed();
		TileStream {
			stream,
			breaker: self.breaker,
		}
	}

	/// An observer stage: `f` sees every non-errored tile, unchanged.
	pub fn inspect<F>(self, mut f: F) -> TileStream<'a>
	where
		F: FnMut(&Tile) + Send + 'a,
	{
		let stream = self
			.stream
			.map(move |tile| {
				if !tile.is_errored() {
					f(&tile);
				}
				tile
			})
			.boxed();
		TileStream {
			stream,
			breaker: self.breaker,
		}
	}

	/// An observer stage: `f` sees every errored tile, unchanged.
	pub fn inspect_errors<F>(self, mut f: F) -> TileStream<'a>
	where
		F: FnMut(&Tile) + Send + 'a,
	{
		let stream = self
			.stream
			.map(move |tile| {
				if tile.is_errored() {
					f(&tile);
				}
				tile
			})
			.boxed();
		TileStream {
			stream,
			breaker: self.breaker,
		}
	}

	/// Count every non-errored tile passing this point.
	pub fn count(self, counter: &Count) -> TileStream<'a> {
		let counter = counter.clone();
		self.inspect(move |_| counter.inc())
	}

	/// Count every non-errored tile and its payload bytes.
	pub fn count_size(self, counter: &CountSize) -> TileStream<'a> {
		let counter = counter.clone();
		self.inspect(move |tile| {
			counter.observe(tile.data.as_ref().map_or(0, |data| data.len() as u64));
		})
	}

	/// Log every errored tile at ERROR level.
	pub fn log_errors(self) -> TileStream<'a> {
		self.inspect_errors(|tile| {
			if let Some(err) = &tile.error {
				error!("{}: {err}", tile.coord);
			}
		})
	}

	/// A terminal stage removing errored tiles from the stream, counting
	/// each removal.
	pub fn drop_errors(self, counter: &Count) -> TileStream<'a> {
		let counter = counter.clone();
		let stream = self
			.stream
			.filter_map(move |tile| {
				if tile.is_errored() {
					counter.inc();
					ready(None)
				} else {
					ready(Some(tile))
				}
			})
			.boxed();
		TileStream {
			stream,
			breaker: self.breaker,
		}
	}

	/// End the stream as soon as `limit` errored tiles arrive back to back.
	/// [`TileStream::consume`] then fails with [`TooManyErrors`].
	pub fn break_on_consecutive_errors(self, limit: u32) -> TileStream<'a> {
		self.break_with(ErrorBreaker::new(limit))
	}

	/// Like [`TileStream::break_on_consecutive_errors`], but with a caller
	/// owned breaker, so the consecutive count survives across several
	/// streams (one per pulled queue batch).
	pub fn break_with(self, breaker: Arc<ErrorBreaker>) -> TileStream<'a> {
		let guard = Arc::clone(&breaker);
		let stream = self
			.stream
			.take_while(move |tile| ready(guard.observe(tile.is_errored())))
			.boxed();
		TileStream {
			stream,
			breaker: Some(breaker),
		}
	}

	/// Drive the stream, counting items, errors and payload bytes. With a
	/// `limit`, stop after pulling that many items (used by `--test`).
	///
	/// # Errors
	/// Fails with [`TooManyErrors`] if the consecutive-error breaker
	/// installed by [`TileStream::break_on_consecutive_errors`] tripped.
	pub async fn consume(mut self, limit: Option<usize>) -> Result<StreamSummary, TooManyErrors> {
		let mut summary = StreamSummary::default();
		while limit.map_or(true, |limit| summary.count < limit as u64) {
			let Some(tile) = self.stream.next().await else {
				break;
			};
			summary.count += 1;
			if tile.is_errored() {
				summary.errors += 1;
			} else if let Some(data) = &tile.data {
				summary.size += data.len() as u64;
			}
		}
		match &self.breaker {
			Some(breaker) if breaker.is_tripped() => Err(TooManyErrors { count: breaker.limit }),
			_ => Ok(summary),
		}
	}

	pub async fn next(&mut self) -> Option<Tile> {
		self.stream.next().await
	}

	pub async fn collect(mut self) -> Vec<Tile> {
		let mut tiles = Vec::new();
		while let Some(tile) = self.stream.next().await {
			tiles.push(tile);
		}
		tiles
	}
}
