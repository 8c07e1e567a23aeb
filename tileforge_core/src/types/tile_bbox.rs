//! An axis-aligned rectangle of tile columns and rows at one zoom level.

use crate::types::TileCoord;
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

/// A rectangle of tiles at a single zoom level, inclusive on all sides.
///
/// The empty rectangle is represented by `x_min > x_max`; use
/// [`TileBBox::new_empty`] to build one and [`TileBBox::is_empty`] to test
/// for it.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileBBox {
	pub z: u8,
	pub x_min: u32,
	pub y_min: u32,
	pub x_max: u32,
	pub y_max: u32,
}

impl TileBBox {
	/// Create a bounding box from inclusive extremes.
	///
	/// # Errors
	/// Fails if a minimum exceeds its maximum.
	pub fn new(z: u8, x_min: u32, y_min: u32, x_max: u32, y_max: u32) -> Result<TileBBox> {
		ensure!(x_min <= x_max, "x_min ({x_min}) exceeds x_max ({x_max})");
		ensure!(y_min <= y_max, "y_min ({y_min}) exceeds y_max ({y_max})");
		Ok(TileBBox {
			z,
			x_min,
			y_min,
			x_max,
			y_max,
		})
	}

	/// Create an empty bounding box at zoom `z`.
	#[must_use]
	pub fn new_empty(z: u8) -> TileBBox {
		TileBBox {
			z,
			x_min: 1,
			y_min: 1,
			x_max: 0,
			y_max: 0,
		}
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.x_min > self.x_max || self.y_min > self.y_max
	}

	/// Number of tiles covered.
	#[must_use]
	pub fn count_tiles(&self) -> u64 {
		if self.is_empty() {
			return 0;
		}
		u64::from(self.x_max - self.x_min + 1) * u64::from(self.y_max - self.y_min + 1)
	}

	/// Whether a single-tile coordinate at this zoom lies inside.
	#[must_use]
	pub fn contains(&self, coord: &TileCoord) -> bool {
		coord.z == self.z
			&& !self.is_empty()
			&& (self.x_min..=self.x_max).contains(&coord.x)
			&& (self.y_min..=self.y_max).contains(&coord.y)
	}

	/// Grow to include the tile at `(x, y)`.
	pub fn include_coord(&mut self, x: u32, y: u32) {
		if self.is_empty() {
			self.x_min = x;
			self.y_min = y;
			self.x_max = x;
			self.y_max = y;
		} else {
			self.x_min = self.x_min.min(x);
			self.y_min = self.y_min.min(y);
			self.x_max = self.x_max.max(x);
			self.y_max = self.y_max.max(y);
		}
	}

	/// Shrink to the intersection with `other`, which must share the zoom.
	pub fn intersect(&mut self, other: &TileBBox) {
		assert_eq!(self.z, other.z, "intersecting bboxes of different zooms");
		if self.is_empty() || other.is_empty() {
			*self = TileBBox::new_empty(self.z);
			return;
		}
		self.x_min = self.x_min.max(other.x_min);
		self.y_min = self.y_min.max(other.y_min);
		self.x_max = self.x_max.min(other.x_max);
		self.y_max = self.y_max.min(other.y_max);
		if self.is_empty() {
			*self = TileBBox::new_empty(self.z);
		}
	}

	/// Iterate over every single-tile coordinate, row by row. The iterator
	/// copies the bounds, so it outlives the rectangle.
	pub fn iter_coords(&self) -> impl Iterator<Item = TileCoord> + Send + 'static {
		let TileBBox {
			z,
			x_min,
			y_min,
			x_max,
			y_max,
		} = *self;
		let empty = self.is_empty();
		(y_min..=y_max)
			.flat_map(move |y| (x_min..=x_max).map(move |x| TileCoord::new(z, x, y)))
			.filter(move |_| !empty)
	}

	/// Iterate over the metatile coordinates of size `n` covering this
	/// rectangle. Origins are aligned down to multiples of `n`, so the first
	/// metatile may start left of or above the rectangle.
	pub fn iter_meta_coords(&self, n: u32) -> impl Iterator<Item = TileCoord> + Send + 'static {
		let TileBBox {
			z,
			x_min,
			y_min,
			x_max,
			y_max,
		} = *self;
		let empty = self.is_empty();
		let x_start = (x_min / n) * n;
		let y_start = (y_min / n) * n;
		(y_start..=y_max)
			.step_by(n as usize)
			.flat_map(move |y| {
				(x_start..=x_max)
					.step_by(n as usize)
					.map(move |x| TileCoord::new_meta(z, x, y, n))
			})
			.filter(move |_| !empty)
	}
}

impl Debug for TileBBox {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.is_empty() {
			f.write_fmt(format_args!("TileBBox({}: empty)", self.z))
		} else {
			f.write_fmt(format_args!(
				"TileBBox({}: [{},{},{},{}])",
				self.z, self.x_min, self.y_min, self.x_max, self.y_max
			))
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn new_checks_order() {
		assert!(TileBBox::new(3, 2, 2, 1, 5).is_err());
		assert!(TileBBox::new(3, 1, 5, 2, 2).is_err());
		assert!(TileBBox::new(3, 1, 2, 1, 2).is_ok());
	}

	#[test]
	fn empty_bbox() {
		let bbox = TileBBox::new_empty(4);
		assert!(bbox.is_empty());
		assert_eq!(bbox.count_tiles(), 0);
		assert_eq!(bbox.iter_coords().count(), 0);
		assert_eq!(bbox.iter_meta_coords(2).count(), 0);
		assert!(!bbox.contains(&TileCoord::new(4, 0, 0)));
	}

	#[test]
	fn include_coord_grows() {
		let mut bbox = TileBBox::new_empty(2);
		bbox.include_coord(3, 1);
		assert_eq!(bbox, TileBBox::new(2, 3, 1, 3, 1).unwrap());
		bbox.include_coord(1, 2);
		assert_eq!(bbox, TileBBox::new(2, 1, 1, 3, 2).unwrap());
	}

	#[test]
	fn contains_checks_zoom() {
		let bbox = TileBBox::new(5, 2, 2, 4, 4).unwrap();
		assert!(bbox.contains(&TileCoord::new(5, 3, 3)));
		assert!(!bbox.contains(&TileCoord::new(4, 3, 3)));
		assert!(!bbox.contains(&TileCoord::new(5, 5, 3)));
	}

	#[test]
	fn iter_coords_row_major() {
		let bbox = TileBBox::new(1, 0, 0, 1, 1).unwrap();
		let coords = bbox.iter_coords().collect::<Vec<_>>();
		assert_eq!(
			coords,
			vec![
				TileCoord::new(1, 0, 0),
				TileCoord::new(1, 1, 0),
				TileCoord::new(1, 0, 1),
				TileCoord::new(1, 1, 1),
			]
		);
	}

	#[test]
	fn meta_coords_align_down() {
		let bbox = TileBBox::new(5, 3, 3, 4, 4).unwrap();
		let coords = bbox.iter_meta_coords(2).collect::<Vec<_>>();
		assert_eq!(
			coords,
			vec![
				TileCoord::new_meta(5, 2, 2, 2),
				TileCoord::new_meta(5, 4, 2, 2),
				TileCoord::new_meta(5, 2, 4, 2),
				TileCoord::new_meta(5, 4, 4, 2),
			]
		);
	}

	#[test]
	fn intersect_shrinks() {
		let mut bbox = TileBBox::new(3, 0, 0, 5, 5).unwrap();
		bbox.intersect(&TileBBox::new(3, 2, 3, 8, 8).unwrap());
		assert_eq!(bbox, TileBBox::new(3, 2, 3, 5, 5).unwrap());

		bbox.intersect(&TileBBox::new(3, 6, 6, 8, 8).unwrap());
		assert!(bbox.is_empty());
	}

	#[test]
	fn count_tiles() {
		assert_eq!(TileBBox::new(2, 1, 1, 3, 2).unwrap().count_tiles(), 6);
	}
}
