//! Value types shared across the workspace.

mod blob;
mod bounding_pyramid;
mod grid;
mod tile_bbox;
mod tile_coord;

pub use blob::Blob;
pub use bounding_pyramid::BoundingPyramid;
pub use grid::{Grid, MatrixIdentifier};
pub use tile_bbox::TileBBox;
pub use tile_coord::TileCoord;
