//! Tile and metatile coordinates.
//!
//! A [`TileCoord`] addresses either a single tile (`n == 1`) or a metatile
//! spanning `n × n` tiles whose top-left tile is at `(x, y)`. Iterating a
//! metatile coordinate yields its `n²` constituent single-tile coordinates in
//! row-major order.
//!
//! # Examples
//!
//! ```
//! use tileforge_core::TileCoord;
//!
//! let coord = TileCoord::parse("5/12/7:+2/+2").unwrap();
//! assert_eq!(coord.z, 5);
//! assert_eq!(coord.x, 12);
//! assert_eq!(coord.y, 7);
//! assert_eq!(coord.n, 2);
//! assert_eq!(coord.tiles().count(), 4);
//! ```

use crate::error::FormatError;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display};

/// A tile or metatile coordinate in a resolution pyramid.
///
/// Immutable once created. `n` is the metatile size: `1` for a plain tile,
/// larger values for a square batch of tiles rendered together.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
	/// The zoom level.
	pub z: u8,
	/// The column of the top-left tile.
	pub x: u32,
	/// The row of the top-left tile.
	pub y: u32,
	/// The metatile size (`>= 1`).
	pub n: u32,
}

impl TileCoord {
	/// Create a single-tile coordinate.
	#[must_use]
	pub fn new(z: u8, x: u32, y: u32) -> TileCoord {
		TileCoord { z, x, y, n: 1 }
	}

	/// Create a metatile coordinate spanning `n × n` tiles.
	///
	/// # Panics
	/// Panics if `n` is zero.
	#[must_use]
	pub fn new_meta(z: u8, x: u32, y: u32, n: u32) -> TileCoord {
		assert!(n >= 1, "metatile size must be >= 1");
		TileCoord { z, x, y, n }
	}

	/// Whether this coordinate addresses a metatile rather than a single tile.
	#[must_use]
	pub fn is_meta(&self) -> bool {
		self.n > 1
	}

	/// The metatile of size `n` containing this tile, aligned down to a
	/// multiple of `n`.
	#[must_use]
	pub fn metatile(&self, n: u32) -> TileCoord {
		TileCoord {
			z: self.z,
			x: (self.x / n) * n,
			y: (self.y / n) * n,
			n,
		}
	}

	/// Iterate over the `n²` constituent single-tile coordinates in row-major
	/// order (rows first, left to right within a row).
	pub fn tiles(&self) -> impl Iterator<Item = TileCoord> + '_ {
		let TileCoord { z, x, y, n } = *self;
		(0..n).flat_map(move |dy| (0..n).map(move |dx| TileCoord::new(z, x + dx, y + dy)))
	}

	/// Parse `"z/x/y"` or `"z/x/y:+n/+n"`.
	///
	/// # Errors
	/// Returns a [`FormatError`] on a wrong number of fields, a non-integer
	/// field, or mismatched metatile sizes.
	pub fn parse(text: &str) -> Result<TileCoord, FormatError> {
		let (coords, meta) = match text.split_once(':') {
			None => (text, None),
			Some((coords, meta)) => (coords, Some(meta)),
		};

		let fields = coords.split('/').collect::<Vec<_>>();
		if fields.len() != 3 {
			return Err(FormatError::new(text, "expected 3 fields 'z/x/y'"));
		}
		let parse_int = |field: &str| {
			field
				.parse::<u32>()
				.map_err(|_| FormatError::new(text, format!("'{field}' is not a non-negative integer")))
		};
		let z = parse_int(fields[0])?;
		if z > u8::MAX as u32 {
			return Err(FormatError::new(text, format!("zoom {z} is too large")));
		}
		let x = parse_int(fields[1])?;
		let y = parse_int(fields[2])?;

		let n = match meta {
			None => 1,
			Some(meta) => {
				let sizes = meta.split('/').collect::<Vec<_>>();
				if sizes.len() != 2 {
					return Err(FormatError::new(text, "expected metatile size '+n/+n'"));
				}
				let parse_size = |field: &str| {
					field
						.strip_prefix('+')
						.and_then(|v| v.parse::<u32>().ok())
						.filter(|n| *n >= 1)
						.ok_or_else(|| FormatError::new(text, format!("'{field}' is not a metatile size '+n'")))
				};
				let n0 = parse_size(sizes[0])?;
				let n1 = parse_size(sizes[1])?;
				if n0 != n1 {
					return Err(FormatError::new(text, "metatile width and height differ"));
				}
				n0
			}
		};

		Ok(TileCoord {
			z: z as u8,
			x,
			y,
			n,
		})
	}
}

impl Default for TileCoord {
	fn default() -> Self {
		TileCoord::new(0, 0, 0)
	}
}

/// Renders as `z/x/y` or `z/x/y:+n/+n`, the same form accepted by
/// [`TileCoord::parse`].
impl Display for TileCoord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.n == 1 {
			write!(f, "{}/{}/{}", self.z, self.x, self.y)
		} else {
			write!(f, "{}/{}/{}:+{}/+{}", self.z, self.x, self.y, self.n, self.n)
		}
	}
}

impl Debug for TileCoord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_fmt(format_args!("TileCoord({self})"))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[test]
	fn parse_single() {
		let coord = TileCoord::parse("5/12/7").unwrap();
		assert_eq!(coord, TileCoord::new(5, 12, 7));
		assert!(!coord.is_meta());
	}

	#[test]
	fn parse_meta() {
		let coord = TileCoord::parse("5/12/7:+2/+2").unwrap();
		assert_eq!(coord, TileCoord::new_meta(5, 12, 7, 2));
		assert!(coord.is_meta());
	}

	#[rstest]
	#[case::too_few_fields("5/12")]
	#[case::too_many_fields("5/12/7/3")]
	#[case::not_a_number("5/a/7")]
	#[case::negative("5/-1/7")]
	#[case::bad_meta_separator("5/12/7:+2")]
	#[case::meta_without_plus("5/12/7:2/2")]
	#[case::meta_mismatch("5/12/7:+2/+3")]
	#[case::meta_zero("5/12/7:+0/+0")]
	#[case::huge_zoom("512/0/0")]
	fn parse_rejects(#[case] text: &str) {
		assert!(TileCoord::parse(text).is_err());
	}

	#[test]
	fn display_round_trip() {
		for text in ["5/12/7", "5/12/7:+2/+2", "0/0/0"] {
			assert_eq!(TileCoord::parse(text).unwrap().to_string(), text);
		}
	}

	#[test]
	fn tiles_row_major() {
		let coord = TileCoord::new_meta(3, 4, 6, 2);
		let tiles = coord.tiles().collect::<Vec<_>>();
		assert_eq!(
			tiles,
			vec![
				TileCoord::new(3, 4, 6),
				TileCoord::new(3, 5, 6),
				TileCoord::new(3, 4, 7),
				TileCoord::new(3, 5, 7),
			]
		);
	}

	#[test]
	fn single_tile_iterates_once() {
		let coord = TileCoord::new(9, 1, 2);
		assert_eq!(coord.tiles().collect::<Vec<_>>(), vec![coord]);
	}

	#[test]
	fn metatile_alignment() {
		assert_eq!(TileCoord::new(5, 17, 23).metatile(8), TileCoord::new_meta(5, 16, 16, 8));
		assert_eq!(TileCoord::new(5, 16, 16).metatile(8), TileCoord::new_meta(5, 16, 16, 8));
	}

	#[test]
	fn debug_format() {
		assert_eq!(format!("{:?}", TileCoord::new(4, 7, 8)), "TileCoord(4/7/8)");
	}
}
