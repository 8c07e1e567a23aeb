//! A free tile grid: arbitrary descending resolutions over a fixed extent,
//! with the tile origin at the top-left corner.
//!
//! Resolutions are kept as integers scaled by the least common multiple of
//! their decimal denominators, so extent arithmetic stays exact for grids
//! with fractional resolutions like `2.5` or `0.25`.

use crate::types::TileCoord;
use anyhow::{ensure, Result};

/// How a zoom level is named in cache paths and capabilities documents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MatrixIdentifier {
	/// The zoom index itself, `"0"`, `"1"`, ...
	#[default]
	Zoom,
	/// The resolution of the level, `"100"`, `"2.5"`, ...
	Resolution,
}

/// A tile grid with explicit per-zoom resolutions.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid {
	tile_size: u32,
	/// `[min_x, min_y, max_x, max_y]` in map units.
	extent: [f64; 4],
	/// Resolutions multiplied by `scale`, highest (coarsest) first.
	resolutions: Vec<u64>,
	scale: u64,
	matrix_identifier: MatrixIdentifier,
}

impl Grid {
	/// Build a grid from map-unit resolutions, coarsest first.
	///
	/// # Errors
	/// Fails on an empty or non-descending resolution list, or a resolution
	/// that is not a positive decimal number.
	pub fn new(
		tile_size: u32,
		extent: [f64; 4],
		resolutions: &[f64],
		matrix_identifier: MatrixIdentifier,
	) -> Result<Grid> {
		ensure!(!resolutions.is_empty(), "a grid needs at least one resolution");
		ensure!(tile_size > 0, "tile size must be positive");
		ensure!(
			extent[0] < extent[2] && extent[1] < extent[3],
			"extent minimums must be below maximums"
		);
		for pair in resolutions.windows(2) {
			ensure!(
				pair[0] > pair[1],
				"resolutions must be strictly descending, got {} then {}",
				pair[0],
				pair[1]
			);
		}

		let fractions = resolutions
			.iter()
			.map(|resolution| decimal_fraction(*resolution))
			.collect::<Result<Vec<_>>>()?;
		let scale = resolution_scale(&fractions);
		let scaled = fractions
			.iter()
			.map(|(numerator, denominator)| numerator * (scale / denominator))
			.collect();

		Ok(Grid {
			tile_size,
			extent,
			resolutions: scaled,
			scale,
			matrix_identifier,
		})
	}

	#[must_use]
	pub fn tile_size(&self) -> u32 {
		self.tile_size
	}

	#[must_use]
	pub fn max_extent(&self) -> &[f64; 4] {
		&self.extent
	}

	/// The common denominator applied to the stored resolutions.
	#[must_use]
	pub fn resolution_scale(&self) -> u64 {
		self.scale
	}

	#[must_use]
	pub fn zoom_count(&self) -> u8 {
		self.resolutions.len() as u8
	}

	/// The map-unit resolution of a zoom level.
	///
	/// # Errors
	/// Fails when `z` is beyond the last configured resolution.
	pub fn resolution(&self, z: u8) -> Result<f64> {
		ensure!(
			(z as usize) < self.resolutions.len(),
			"zoom {z} is outside the grid ({} levels)",
			self.resolutions.len()
		);
		Ok(self.resolutions[z as usize] as f64 / self.scale as f64)
	}

	/// The map-unit extent `[min_x, min_y, max_x, max_y]` of a tile or
	/// metatile, grown by `border` pixels on every side.
	///
	/// # Errors
	/// Fails when the coordinate's zoom is outside the grid.
	pub fn tile_extent(&self, coord: &TileCoord, border: u32) -> Result<[f64; 4]> {
		let resolution = self.resolution(coord.z)?;
		let size = f64::from(self.tile_size);
		let border = f64::from(border);
		let min_x = self.extent[0] + (size * f64::from(coord.x) - border) * resolution;
		let max_x = self.extent[0] + (size * f64::from(coord.x + coord.n) + border) * resolution;
		let max_y = self.extent[3] - (size * f64::from(coord.y) - border) * resolution;
		let min_y = self.extent[3] - (size * f64::from(coord.y + coord.n) + border) * resolution;
		Ok([min_x, min_y, max_x, max_y])
	}

	/// The single-tile coordinate containing the map point `(x, y)` at zoom
	/// `z`. Points outside the extent clamp to the edge tiles.
	#[must_use]
	pub fn coord_at(&self, z: u8, x: f64, y: f64) -> TileCoord {
		let resolution = self.resolutions[z as usize] as f64 / self.scale as f64;
		let span = resolution * f64::from(self.tile_size);
		let tile_x = ((x - self.extent[0]) / span).floor().max(0.0) as u32;
		let tile_y = ((self.extent[3] - y) / span).floor().max(0.0) as u32;
		TileCoord::new(z, tile_x, tile_y)
	}

	/// The name of zoom level `z` in cache paths. Resolution identifiers use
	/// `_` in place of the decimal dot, e.g. `"0_05"`.
	#[must_use]
	pub fn matrix_identifier(&self, z: u8) -> String {
		match self.matrix_identifier {
			MatrixIdentifier::Zoom => z.to_string(),
			MatrixIdentifier::Resolution => {
				let resolution = self.resolutions[z as usize] as f64 / self.scale as f64;
				if resolution.fract() == 0.0 {
					format!("{}", resolution as u64)
				} else {
					format!("{resolution}").replace('.', "_")
				}
			}
		}
	}
}

/// Express a positive decimal number as a reduced fraction
/// `(numerator, denominator)`.
fn decimal_fraction(value: f64) -> Result<(u64, u64)> {
	ensure!(
		value > 0.0 && value.is_finite(),
		"resolution must be a positive number, got {value}"
	);
	let text = format!("{value}");
	ensure!(
		!text.contains(['e', 'E']),
		"resolution {value} has no short decimal form"
	);
	let (numerator, denominator) = match text.split_once('.') {
		None => (text.parse::<u64>()?, 1),
		Some((integer, fraction)) => {
			let numerator = format!("{integer}{fraction}").parse::<u64>()?;
			(numerator, 10u64.pow(fraction.len() as u32))
		}
	};
	let divisor = gcd(numerator, denominator);
	Ok((numerator / divisor, denominator / divisor))
}

/// The least common multiple of the fraction denominators, computed from
/// prime factors so repeated denominators do not inflate the scale.
fn resolution_scale(fractions: &[(u64, u64)]) -> u64 {
	let mut max_exponents: Vec<(u64, u32)> = Vec::new();
	for (_, denominator) in fractions {
		for (prime, exponent) in prime_factors(*denominator) {
			match max_exponents.iter_mut().find(|(p, _)| *p == prime) {
				Some((_, max)) => *max = (*max).max(exponent),
				None => max_exponents.push((prime, exponent)),
			}
		}
	}
	max_exponents
		.iter()
		.map(|(prime, exponent)| prime.pow(*exponent))
		.product()
}

fn prime_factors(mut value: u64) -> Vec<(u64, u32)> {
	let mut factors = Vec::new();
	let mut divisor = 2;
	while divisor * divisor <= value {
		let mut exponent = 0;
		while value % divisor == 0 {
			value /= divisor;
			exponent += 1;
		}
		if exponent > 0 {
			factors.push((divisor, exponent));
		}
		divisor += 1;
	}
	if value > 1 {
		factors.push((value, 1));
	}
	factors
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
	while b != 0 {
		(a, b) = (b, a % b);
	}
	a
}
