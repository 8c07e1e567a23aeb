//! Append-only log of errored tile coordinates.
//!
//! The file doubles as a tiles-list file: a later run with `--tiles` can
//! replay exactly the coordinates that failed, comments and all.

use anyhow::{Context, Result};
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tileforge_core::Tile;

pub struct ErrorFile {
	file: Mutex<File>,
}

impl ErrorFile {
	pub fn open(path: &Path, layer: &str) -> Result<ErrorFile> {
		let mut file = OpenOptions::new()
			.create(true)
			.append(true)
			.open(path)
			.with_context(|| format!("opening error file {path:?}"))?;
		writeln!(
			file,
			"# [{}] Start the layer '{layer}' generation",
			Local::now().format("%Y-%m-%d %H:%M:%S")
		)
		.context("writing to the error file")?;
		Ok(ErrorFile {
			file: Mutex::new(file),
		})
	}

	pub fn record(&self, tile: &Tile) {
		let Some(error) = &tile.error else {
			return;
		};
		let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
		// failing to log a failure is only worth a warning
		if let Err(io_error) = writeln!(
			file,
			"{} # [{}] {error}",
			tile.coord,
			Local::now().format("%Y-%m-%d %H:%M:%S")
		) {
			log::warn!("cannot write to the error file: {io_error}");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tileforge_core::{TileCoord, TileError};

	#[test]
	fn records_errored_coordinates_as_a_tiles_file() {
		let file = assert_fs::NamedTempFile::new("errors.txt").unwrap();
		let log = ErrorFile::open(file.path(), "plan").unwrap();

		let mut tile = Tile::new(TileCoord::new_meta(5, 4, 6, 2));
		tile.set_error(TileError::Render("status 502".to_string()));
		log.record(&tile);
		log.record(&Tile::new(TileCoord::new(5, 0, 0)));

		let text = std::fs::read_to_string(file.path()).unwrap();
		assert!(text.starts_with("# ["));
		assert!(text.contains("Start the layer 'plan' generation"));
		assert!(text.contains("5/4/6:+2/+2 # ["));
		assert!(text.contains("status 502"));
		// errorless tiles are not recorded
		assert_eq!(text.lines().count(), 2);

		let replay = super::super::tiles_file::parse_coords(&text);
		assert_eq!(replay, vec![TileCoord::new_meta(5, 4, 6, 2)]);
	}
}
