//! Error taxonomy of the tile generation pipeline.
//!
//! Per-item failures ([`TileError`]) are attached to the tile and travel down
//! the stream instead of aborting it. Only [`TooManyErrors`] is fatal: it is
//! raised by [`TileStream::consume`](crate::stream::TileStream::consume) when
//! too many consecutive items carry an error, and propagates out of the run.

use thiserror::Error;

/// A malformed textual tile coordinate, e.g. `"5/12"` or `"a/b/c"`.
///
/// Fatal to the single parse call, never to a running stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid tile coordinate '{text}': {reason}")]
pub struct FormatError {
	/// The rejected input.
	pub text: String,
	/// Why it was rejected.
	pub reason: String,
}

impl FormatError {
	pub fn new(text: &str, reason: impl Into<String>) -> FormatError {
		FormatError {
			text: text.to_string(),
			reason: reason.into(),
		}
	}
}

/// A failure of a single tile or metatile inside a stream stage.
///
/// Stages attach this to [`Tile::error`](crate::tile::Tile) and forward the
/// item; downstream stages pass errored items through untouched until the
/// terminal error stages log, count and drop them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileError {
	/// The renderer failed to produce image data.
	#[error("render failed: {0}")]
	Render(String),

	/// A cache backend failed to get, put or delete.
	#[error("store failed: {0}")]
	Store(String),

	/// The metatile image could not be decoded or re-encoded.
	#[error("decode failed: {0}")]
	Decode(String),

	/// The work queue failed to push, pull or delete a job.
	#[error("queue failed: {0}")]
	Queue(String),
}

/// Raised when the consecutive-error breaker trips.
///
/// This is the only stream error that terminates a run: sporadic per-tile
/// failures are tolerated, but a long unbroken run of them indicates a
/// systemic outage (renderer down, store unreachable) that unattended
/// generation must not ride out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("too many consecutive errors ({count})")]
pub struct TooManyErrors {
	/// Number of consecutive errored items observed when the breaker tripped.
	pub count: u32,
}
