//! Tile cache backends and the distributed work queue.
//!
//! Every backend implements the async [`TileStore`] trait and is addressed
//! through the tile's coordinate plus the per-layer [`WmtsLayout`]. Writes
//! are idempotent overwrites by coordinate, so a redelivered queue job can
//! always be replayed safely.

mod file;
mod layout;
mod memory;
mod object;
pub mod queue;
mod sqlite;
mod timed;
mod traits;

pub use file::FileStore;
pub use layout::WmtsLayout;
pub use memory::MemoryStore;
pub use object::ObjectTileStore;
pub use sqlite::SqliteStore;
pub use timed::TimedStore;
pub use traits::TileStore;
