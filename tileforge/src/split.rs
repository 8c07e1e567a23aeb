//! Splits a rendered metatile image into its constituent tiles.

use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::sync::Arc;
use tileforge_core::{Blob, Metatile, Tile, TileError};

/// Crops the `n × n` tile images out of a composite metatile, re-encoding
/// each in the layer's format.
pub struct MetatileSplitter {
	tile_size: u32,
	meta_buffer: u32,
	format: ImageFormat,
	content_type: String,
}

impl MetatileSplitter {
	#[must_use]
	pub fn new(tile_size: u32, meta_buffer: u32, extension: &str) -> MetatileSplitter {
		let format = match extension {
			"jpeg" => ImageFormat::Jpeg,
			_ => ImageFormat::Png,
		};
		MetatileSplitter {
			tile_size,
			meta_buffer,
			format,
			content_type: format!("image/{extension}"),
		}
	}

	/// Split one metatile into its sub-tiles, row-major. Children inherit
	/// the parent's metadata and share its completion counter.
	///
	/// A decode failure never drops the job: the single surviving item is
	/// the original metatile carrying a `TileError::Decode`, so it is still
	/// counted, logged and retriable.
	#[must_use]
	pub fn split(&self, mut tile: Tile) -> Vec<Tile> {
		let n = tile.coord.n;
		let image = match self.decode(&tile, n) {
			Ok(image) => image,
			Err(error) => {
				tile.set_error(error);
				return vec![tile];
			}
		};

		let parent = Metatile::new(tile.coord, tile.queue_id.clone());
		let mut children = Vec::with_capacity((n * n) as usize);
		for (index, coord) in tile.coord.tiles().enumerate() {
			let dx = index as u32 % n;
			let dy = index as u32 / n;
			let mut child = Tile::new(coord);
			child.metadata = tile.metadata.clone();
			child.parent = Some(Arc::clone(&parent));
			match self.encode_region(&image, dx, dy) {
				Ok(data) => {
					child.data = Some(data);
					child.content_type = Some(self.content_type.clone());
				}
				Err(error) => child.set_error(error),
			}
			children.push(child);
		}
		children
	}

	fn decode(&self, tile: &Tile, n: u32) -> Result<DynamicImage, TileError> {
		let Some(data) = &tile.data else {
			return Err(TileError::Decode(format!("metatile {} has no data", tile.coord)));
		};
		let image = image::load_from_memory(data.as_slice())
			.map_err(|error| TileError::Decode(error.to_string()))?;
		let expected = n * self.tile_size + 2 * self.meta_buffer;
		if image.width() != expected || image.height() != expected {
			return Err(TileError::Decode(format!(
				"metatile {} is {}x{} instead of {expected}x{expected}",
				tile.coord,
				image.width(),
				image.height()
			)));
		}
		Ok(image)
	}

	fn encode_region(&self, image: &DynamicImage, dx: u32, dy: u32) -> Result<Blob, TileError> {
		let cropped = image.crop_imm(
			self.meta_buffer + dx * self.tile_size,
			self.meta_buffer + dy * self.tile_size,
			self.tile_size,
			self.tile_size,
		);
		// the jpeg encoder rejects alpha channels
		let cropped = match self.format {
			ImageFormat::Jpeg => DynamicImage::ImageRgb8(cropped.to_rgb8()),
			_ => cropped,
		};
		let mut buffer = Cursor::new(Vec::new());
		cropped
			.write_to(&mut buffer, self.format)
			.map_err(|error| TileError::Decode(error.to_string()))?;
		Ok(Blob::from(buffer.into_inner()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use image::{Rgba, RgbaImage};
	use tileforge_core::TileCoord;

	fn checker_pixel(x: u32, y: u32) -> Rgba<u8> {
		Rgba([(x % 251) as u8, (y % 241) as u8, ((x + y) % 253) as u8, 255])
	}

	fn composite(size: u32) -> Vec<u8> {
		let image = RgbaImage::from_fn(size, size, checker_pixel);
		let mut buffer = Cursor::new(Vec::new());
		DynamicImage::ImageRgba8(image)
			.write_to(&mut buffer, ImageFormat::Png)
			.unwrap();
		buffer.into_inner()
	}

	#[test]
	fn split_reassembles_to_the_composite() {
		let splitter = MetatileSplitter::new(256, 0, "png");
		let tile = Tile::new(TileCoord::new_meta(5, 4, 6, 2)).with_data(Blob::from(composite(512)));
		let children = splitter.split(tile);
		assert_eq!(children.len(), 4);

		for (index, child) in children.iter().enumerate() {
			assert!(!child.is_errored());
			let dx = (index as u32 % 2) * 256;
			let dy = (index as u32 / 2) * 256;
			assert_eq!(child.coord, TileCoord::new(5, 4 + index as u32 % 2, 6 + index as u32 / 2));

			let decoded = image::load_from_memory(child.data.as_ref().unwrap().as_slice())
				.unwrap()
				.to_rgba8();
			assert_eq!(decoded.dimensions(), (256, 256));
			for (x, y, pixel) in decoded.enumerate_pixels() {
				assert_eq!(*pixel, checker_pixel(dx + x, dy + y), "pixel ({x},{y}) of child {index}");
			}
		}
	}

	#[test]
	fn children_share_one_completion_counter() {
		let splitter = MetatileSplitter::new(256, 0, "png");
		let mut tile = Tile::new(TileCoord::new_meta(5, 0, 0, 2)).with_data(Blob::from(composite(512)));
		tile.queue_id = Some("3-1".to_string());
		let children = splitter.split(tile);

		let parent = children[0].parent.as_ref().unwrap();
		assert_eq!(parent.pending(), 4);
		assert_eq!(parent.queue_id.as_deref(), Some("3-1"));
		for child in &children[1..] {
			assert!(Arc::ptr_eq(parent, child.parent.as_ref().unwrap()));
		}
	}

	#[test]
	fn meta_buffer_is_cropped_away() {
		let splitter = MetatileSplitter::new(16, 4, "png");
		let tile = Tile::new(TileCoord::new_meta(3, 0, 0, 2)).with_data(Blob::from(composite(40)));
		let children = splitter.split(tile);
		assert_eq!(children.len(), 4);

		let decoded = image::load_from_memory(children[0].data.as_ref().unwrap().as_slice())
			.unwrap()
			.to_rgba8();
		assert_eq!(decoded.get_pixel(0, 0), &checker_pixel(4, 4));
	}

	#[test]
	fn decode_failure_keeps_the_metatile() {
		let splitter = MetatileSplitter::new(256, 0, "png");
		let tile = Tile::new(TileCoord::new_meta(5, 0, 0, 2)).with_data(Blob::from("not an image"));
		let children = splitter.split(tile);
		assert_eq!(children.len(), 1);
		assert_eq!(children[0].coord, TileCoord::new_meta(5, 0, 0, 2));
		assert!(matches!(children[0].error, Some(TileError::Decode(_))));
	}

	#[test]
	fn wrong_dimensions_are_a_decode_error() {
		let splitter = MetatileSplitter::new(256, 0, "png");
		let tile = Tile::new(TileCoord::new_meta(5, 0, 0, 2)).with_data(Blob::from(composite(256)));
		let children = splitter.split(tile);
		assert_eq!(children.len(), 1);
		assert!(children[0].is_errored());
	}

	#[test]
	fn metadata_is_inherited() {
		let splitter = MetatileSplitter::new(256, 0, "png");
		let tile = Tile::new(TileCoord::new_meta(5, 0, 0, 2))
			.with_data(Blob::from(composite(512)))
			.with_metadata("layer", "plan");
		for child in splitter.split(tile) {
			assert_eq!(child.layer(), Some("plan"));
		}
	}
}
