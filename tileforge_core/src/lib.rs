//! Core types of the tile generation pipeline: coordinates, grids, tiles and
//! the lazy error-isolating tile stream.

pub mod count;
pub mod error;
pub mod stream;
pub mod tile;
pub mod types;

pub use count::{Count, CountSize};
pub use error::{FormatError, TileError, TooManyErrors};
pub use stream::{ErrorBreaker, StreamSummary, TileStream};
pub use tile::{Metatile, Tile, META_LAYER};
pub use types::{Blob, BoundingPyramid, Grid, MatrixIdentifier, TileBBox, TileCoord};
