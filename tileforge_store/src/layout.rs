use tileforge_core::TileCoord;

/// WMTS-style cache key templating shared by the file and object stores.
///
/// Keys take the shape
/// `{layer}/{style}/{dim values…}/{matrix_set}/{matrix}/{row}/{col}.{ext}`
/// where `matrix` is the per-zoom identifier of the grid (zoom index or
/// underscore-escaped resolution like `0_05`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WmtsLayout {
	layer: String,
	style: String,
	dimensions: Vec<String>,
	matrix_set: String,
	/// Identifier per zoom level, indexed by zoom.
	matrix_identifiers: Vec<String>,
	extension: String,
}

impl WmtsLayout {
	pub fn new(
		layer: impl Into<String>,
		style: impl Into<String>,
		dimensions: Vec<String>,
		matrix_set: impl Into<String>,
		matrix_identifiers: Vec<String>,
		extension: impl Into<String>,
	) -> WmtsLayout {
		WmtsLayout {
			layer: layer.into(),
			style: style.into(),
			dimensions,
			matrix_set: matrix_set.into(),
			matrix_identifiers,
			extension: extension.into(),
		}
	}

	/// The relative cache key of a coordinate.
	#[must_use]
	pub fn filename(&self, coord: &TileCoord) -> String {
		let mut parts = Vec::with_capacity(self.dimensions.len() + 5);
		parts.push(self.layer.clone());
		parts.push(self.style.clone());
		parts.extend(self.dimensions.iter().cloned());
		parts.push(self.matrix_set.clone());
		parts.push(self.matrix_identifier(coord.z));
		parts.push(coord.y.to_string());
		parts.push(format!("{}.{}", coord.x, self.extension));
		parts.join("/")
	}

	fn matrix_identifier(&self, z: u8) -> String {
		self.matrix_identifiers
			.get(z as usize)
			.cloned()
			.unwrap_or_else(|| z.to_string())
	}

	/// Parse a relative cache key back into its coordinate. Returns `None`
	/// for keys that do not belong to this layout.
	#[must_use]
	pub fn parse(&self, key: &str) -> Option<TileCoord> {
		let parts = key.split('/').collect::<Vec<_>>();
		let expected = self.dimensions.len() + 6;
		if parts.len() != expected {
			return None;
		}
		let mut fixed = vec![self.layer.as_str(), self.style.as_str()];
		fixed.extend(self.dimensions.iter().map(String::as_str));
		fixed.push(self.matrix_set.as_str());
		if parts[..fixed.len()] != fixed[..] {
			return None;
		}

		let matrix = parts[fixed.len()];
		let z = match self.matrix_identifiers.iter().position(|id| id == matrix) {
			Some(z) => z as u8,
			None => matrix.parse::<u8>().ok()?,
		};
		let y = parts[fixed.len() + 1].parse::<u32>().ok()?;
		let (col, extension) = parts[fixed.len() + 2].rsplit_once('.')?;
		if extension != self.extension {
			return None;
		}
		let x = col.parse::<u32>().ok()?;
		Some(TileCoord::new(z, x, y))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn layout() -> WmtsLayout {
		WmtsLayout::new(
			"plan",
			"default",
			vec!["2026".to_string()],
			"swissgrid",
			vec!["100".to_string(), "50".to_string(), "2_5".to_string()],
			"png",
		)
	}

	#[test]
	fn filename_shape() {
		assert_eq!(
			layout().filename(&TileCoord::new(2, 6, 8)),
			"plan/default/2026/swissgrid/2_5/8/6.png"
		);
	}

	#[test]
	fn parse_inverts_filename() {
		let layout = layout();
		for coord in [TileCoord::new(0, 0, 0), TileCoord::new(2, 6, 8)] {
			assert_eq!(layout.parse(&layout.filename(&coord)), Some(coord));
		}
	}

	#[test]
	fn parse_rejects_foreign_keys() {
		let layout = layout();
		assert_eq!(layout.parse("other/default/2026/swissgrid/100/0/0.png"), None);
		assert_eq!(layout.parse("plan/default/2026/swissgrid/100/0/0.jpeg"), None);
		assert_eq!(layout.parse("plan/default/2026/swissgrid/100/0.png"), None);
		assert_eq!(layout.parse("plan/default/2026/swissgrid/unknown/0/0.png"), None);
	}

	#[test]
	fn numeric_matrix_fallback() {
		let layout = WmtsLayout::new("plan", "default", vec![], "grid", vec![], "png");
		assert_eq!(
			layout.parse("plan/default/grid/7/3/5.png"),
			Some(TileCoord::new(7, 5, 3))
		);
	}
}
