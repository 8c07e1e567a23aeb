//! Per-zoom coverage geometries and the intersect filter.
//!
//! A layer's coverage restricts the bounding pyramid to tiles whose map-unit
//! footprint intersects the configured geometry at that zoom level. Tiles at
//! zoom levels without a coverage entry are dropped.

use crate::config::LayerConfig;
use geo::{coord, BooleanOps, Intersects, MultiPolygon, Rect};
use std::collections::HashMap;
use std::sync::Arc;
use tileforge_core::{Grid, TileCoord};

/// One coverage geometry per zoom level.
#[derive(Clone, Debug, Default)]
pub struct Coverage {
	zooms: HashMap<u8, MultiPolygon<f64>>,
}

impl Coverage {
	#[must_use]
	pub fn new(zooms: HashMap<u8, MultiPolygon<f64>>) -> Coverage {
		Coverage { zooms }
	}

	#[must_use]
	pub fn at(&self, z: u8) -> Option<&MultiPolygon<f64>> {
		self.zooms.get(&z)
	}
}

fn extent_polygon(extent: &[f64; 4]) -> MultiPolygon<f64> {
	let rect = Rect::new(
		coord! { x: extent[0], y: extent[1] },
		coord! { x: extent[2], y: extent[3] },
	);
	MultiPolygon::new(vec![rect.to_polygon()])
}

/// Build a layer's per-zoom coverage.
///
/// Zoom levels take the union of the geometry sources active at their
/// resolution; a layer without sources covers its `bbox` (or the whole grid
/// extent). A `restrict` extent, e.g. from the command line, is intersected
/// into every level.
#[must_use]
pub fn build_coverage(layer: &LayerConfig, grid: &Grid, restrict: Option<[f64; 4]>) -> Coverage {
	let mut zooms = HashMap::new();
	for z in 0..grid.zoom_count() {
		let Ok(resolution) = grid.resolution(z) else {
			continue;
		};

		let mut coverage = if layer.geometries.is_empty() {
			match &layer.bbox {
				Some(bbox) => extent_polygon(bbox),
				None => extent_polygon(grid.max_extent()),
			}
		} else {
			let mut union = MultiPolygon::new(Vec::new());
			for source in &layer.geometries {
				let active = source.min_resolution.map_or(true, |min| resolution >= min)
					&& source.max_resolution.map_or(true, |max| resolution <= max);
				if active {
					union = union.union(&extent_polygon(&source.bbox));
				}
			}
			union
		};

		if let Some(restrict) = restrict {
			coverage = coverage.intersection(&extent_polygon(&restrict));
		}
		zooms.insert(z, coverage);
	}
	Coverage::new(zooms)
}

/// Keeps tiles whose footprint intersects the coverage at their zoom.
pub struct IntersectFilter {
	grid: Arc<Grid>,
	coverage: Coverage,
	px_buffer: u32,
}

impl IntersectFilter {
	#[must_use]
	pub fn new(grid: Arc<Grid>, coverage: Coverage, px_buffer: u32) -> IntersectFilter {
		IntersectFilter {
			grid,
			coverage,
			px_buffer,
		}
	}

	#[must_use]
	pub fn matches(&self, coord: &TileCoord) -> bool {
		let Some(coverage) = self.coverage.at(coord.z) else {
			return false;
		};
		let Ok(extent) = self.grid.tile_extent(coord, self.px_buffer) else {
			return false;
		};
		let footprint = Rect::new(
			coord! { x: extent[0], y: extent[1] },
			coord! { x: extent[2], y: extent[3] },
		);
		coverage.intersects(&footprint.to_polygon())
	}
}
