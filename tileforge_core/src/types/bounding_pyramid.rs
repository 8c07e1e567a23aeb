//! A stack of per-zoom tile rectangles describing a generation job.

use crate::types::{TileBBox, TileCoord};
use std::fmt::{self, Debug};

const MAX_ZOOM_LEVEL: usize = 32;

/// One [`TileBBox`] per zoom level, empty levels included.
///
/// Levels are iterated from the lowest zoom upwards, so a job always renders
/// coarse tiles before fine ones.
#[derive(Clone, PartialEq, Eq)]
pub struct BoundingPyramid {
	levels: [TileBBox; MAX_ZOOM_LEVEL],
}

impl BoundingPyramid {
	/// Create a pyramid with every level empty.
	#[must_use]
	pub fn new_empty() -> BoundingPyramid {
		BoundingPyramid {
			levels: std::array::from_fn(|z| TileBBox::new_empty(z as u8)),
		}
	}

	pub fn set_level(&mut self, bbox: TileBBox) {
		self.levels[bbox.z as usize] = bbox;
	}

	#[must_use]
	pub fn get_level(&self, z: u8) -> &TileBBox {
		&self.levels[z as usize]
	}

	/// Grow the level of `coord.z` to include `coord`.
	pub fn include_coord(&mut self, coord: &TileCoord) {
		self.levels[coord.z as usize].include_coord(coord.x, coord.y);
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.levels.iter().all(TileBBox::is_empty)
	}

	#[must_use]
	pub fn count_tiles(&self) -> u64 {
		self.levels.iter().map(TileBBox::count_tiles).sum()
	}

	#[must_use]
	pub fn contains(&self, coord: &TileCoord) -> bool {
		self.levels[coord.z as usize].contains(coord)
	}

	/// Drop all levels below `z_min`.
	pub fn set_zoom_min(&mut self, z_min: u8) {
		for z in 0..z_min.min(MAX_ZOOM_LEVEL as u8) {
			self.levels[z as usize] = TileBBox::new_empty(z);
		}
	}

	/// Drop all levels above `z_max`.
	pub fn set_zoom_max(&mut self, z_max: u8) {
		for z in (z_max as usize + 1)..MAX_ZOOM_LEVEL {
			self.levels[z] = TileBBox::new_empty(z as u8);
		}
	}

	/// The non-empty levels, lowest zoom first.
	pub fn iter_levels(&self) -> impl Iterator<Item = &TileBBox> {
		self.levels.iter().filter(|bbox| !bbox.is_empty())
	}

	/// Every single-tile coordinate in the pyramid, lowest zoom first.
	pub fn iter_coords(&self) -> impl Iterator<Item = TileCoord> + '_ {
		self.iter_levels().flat_map(TileBBox::iter_coords)
	}

	/// Every metatile coordinate of size `n` covering the pyramid, lowest
	/// zoom first. Metatile origins align down to multiples of `n`.
	pub fn iter_meta_coords(&self, n: u32) -> impl Iterator<Item = TileCoord> + '_ {
		self.iter_levels().flat_map(move |bbox| bbox.iter_meta_coords(n))
	}

	/// Like [`BoundingPyramid::iter_meta_coords`], but consuming the pyramid
	/// so the iterator can seed a `'static` stream. Coordinates are produced
	/// one by one, never collected.
	pub fn into_iter_meta_coords(self, n: u32) -> impl Iterator<Item = TileCoord> + Send + 'static {
		self.levels
			.into_iter()
			.filter(|bbox| !bbox.is_empty())
			.flat_map(move |bbox| bbox.iter_meta_coords(n))
	}
}

impl Default for BoundingPyramid {
	fn default() -> Self {
		Self::new_empty()
	}
}

impl Debug for BoundingPyramid {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_list().entries(self.iter_levels()).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn starts_empty() {
		let pyramid = BoundingPyramid::new_empty();
		assert!(pyramid.is_empty());
		assert_eq!(pyramid.count_tiles(), 0);
		assert_eq!(pyramid.iter_coords().count(), 0);
	}

	#[test]
	fn levels_in_zoom_order() {
		let mut pyramid = BoundingPyramid::new_empty();
		pyramid.set_level(TileBBox::new(4, 0, 0, 1, 0).unwrap());
		pyramid.set_level(TileBBox::new(2, 1, 1, 1, 1).unwrap());

		let coords = pyramid.iter_coords().collect::<Vec<_>>();
		assert_eq!(
			coords,
			vec![
				TileCoord::new(2, 1, 1),
				TileCoord::new(4, 0, 0),
				TileCoord::new(4, 1, 0),
			]
		);
		assert_eq!(pyramid.count_tiles(), 3);
	}

	#[test]
	fn zoom_limits() {
		let mut pyramid = BoundingPyramid::new_empty();
		for z in 0..6 {
			pyramid.set_level(TileBBox::new(z, 0, 0, 0, 0).unwrap());
		}
		pyramid.set_zoom_min(2);
		pyramid.set_zoom_max(4);
		let zooms = pyramid.iter_levels().map(|bbox| bbox.z).collect::<Vec<_>>();
		assert_eq!(zooms, vec![2, 3, 4]);
	}

	#[test]
	fn meta_coords_cover_all_levels() {
		let mut pyramid = BoundingPyramid::new_empty();
		pyramid.set_level(TileBBox::new(3, 1, 1, 2, 2).unwrap());
		let coords = pyramid.iter_meta_coords(2).collect::<Vec<_>>();
		assert_eq!(
			coords,
			vec![
				TileCoord::new_meta(3, 0, 0, 2),
				TileCoord::new_meta(3, 2, 0, 2),
				TileCoord::new_meta(3, 0, 2, 2),
				TileCoord::new_meta(3, 2, 2, 2),
			]
		);
	}

	#[test]
	fn owned_meta_coords_stay_lazy() {
		let mut pyramid = BoundingPyramid::new_empty();
		// ~10^9 metatiles; collecting them would exhaust memory
		pyramid.set_level(TileBBox::new(20, 0, 0, 65535, 65535).unwrap());
		let first = pyramid.into_iter_meta_coords(2).take(3).collect::<Vec<_>>();
		assert_eq!(
			first,
			vec![
				TileCoord::new_meta(20, 0, 0, 2),
				TileCoord::new_meta(20, 2, 0, 2),
				TileCoord::new_meta(20, 4, 0, 2),
			]
		);
	}

	#[test]
	fn include_coord() {
		let mut pyramid = BoundingPyramid::new_empty();
		pyramid.include_coord(&TileCoord::new(7, 10, 20));
		pyramid.include_coord(&TileCoord::new(7, 12, 18));
		assert_eq!(pyramid.get_level(7), &TileBBox::new(7, 10, 18, 12, 20).unwrap());
	}
}
