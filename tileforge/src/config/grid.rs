use anyhow::Result;
use serde::Deserialize;
use tileforge_core::{Grid, MatrixIdentifier};

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GridConfig {
	/// Map-unit resolutions, coarsest first.
	pub resolutions: Vec<f64>,

	/// Grid extent `[min_x, min_y, max_x, max_y]` in map units.
	pub bbox: [f64; 4],

	/// Spatial reference system, e.g. `"EPSG:2056"`.
	pub srs: String,

	#[serde(default = "default_tile_size")]
	pub tile_size: u32,

	/// How zoom levels are named in cache paths: by index or by resolution.
	#[serde(default)]
	pub matrix_identifier: MatrixIdentifierConfig,
}

fn default_tile_size() -> u32 {
	256
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MatrixIdentifierConfig {
	#[default]
	Zoom,
	Resolution,
}

impl GridConfig {
	pub fn to_grid(&self) -> Result<Grid> {
		let matrix_identifier = match self.matrix_identifier {
			MatrixIdentifierConfig::Zoom => MatrixIdentifier::Zoom,
			MatrixIdentifierConfig::Resolution => MatrixIdentifier::Resolution,
		};
		Grid::new(self.tile_size, self.bbox, &self.resolutions, matrix_identifier)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults() {
		let config: GridConfig = serde_yaml_ng::from_str(
			"resolutions: [10, 5]\nbbox: [0, 0, 1000, 1000]\nsrs: 'EPSG:2056'",
		)
		.unwrap();
		assert_eq!(config.tile_size, 256);
		assert_eq!(config.matrix_identifier, MatrixIdentifierConfig::Zoom);
		assert!(config.to_grid().is_ok());
	}
}
