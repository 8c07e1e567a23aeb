//! Tiles-list files: one coordinate token per line.

use anyhow::{Context, Result};
use log::warn;
use std::fs;
use std::path::Path;
use tileforge_core::TileCoord;

pub fn read_coords(path: &Path) -> Result<Vec<TileCoord>> {
	let text = fs::read_to_string(path).with_context(|| format!("reading tiles file {path:?}"))?;
	Ok(parse_coords(&text))
}

/// Parse the coordinate tokens of a tiles-list file. Blank lines and `#`
/// comment suffixes are ignored; a malformed token is logged and skipped
/// rather than aborting the run.
pub fn parse_coords(text: &str) -> Vec<TileCoord> {
	text.lines()
		.enumerate()
		.filter_map(|(index, line)| {
			let token = line.split('#').next().unwrap_or_default().trim();
			if token.is_empty() {
				return None;
			}
			match TileCoord::parse(token) {
				Ok(coord) => Some(coord),
				Err(error) => {
					warn!("tiles file line {}: {error}", index + 1);
					None
				}
			}
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_tokens_and_skips_noise() {
		let coords = parse_coords("5/12/7\n\n# header\n3/0/0:+2/+2 # seeded 2026-08-12\nnot-a-coord\n 4/1/2 \n");
		assert_eq!(
			coords,
			vec![
				TileCoord::new(5, 12, 7),
				TileCoord::new_meta(3, 0, 0, 2),
				TileCoord::new(4, 1, 2),
			]
		);
	}

	#[test]
	fn reads_from_disk() {
		let file = assert_fs::NamedTempFile::new("tiles.txt").unwrap();
		std::fs::write(file.path(), "2/1/1\n2/1/2\n").unwrap();
		assert_eq!(read_coords(file.path()).unwrap().len(), 2);
	}
}
