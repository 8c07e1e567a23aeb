use crate::layout::WmtsLayout;
use crate::traits::TileStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tileforge_core::{Blob, Tile, TileCoord};

/// A filesystem tile cache using WMTS-shaped paths below a root directory.
///
/// Directories are created on demand by `put_one`.
pub struct FileStore {
	root: PathBuf,
	layout: WmtsLayout,
}

impl FileStore {
	pub fn new(root: impl Into<PathBuf>, layout: WmtsLayout) -> FileStore {
		FileStore {
			root: root.into(),
			layout,
		}
	}

	fn path(&self, coord: &TileCoord) -> PathBuf {
		self.root.join(self.layout.filename(coord))
	}

	fn walk(&self, dir: &Path, coords: &mut Vec<TileCoord>) -> Result<()> {
		for entry in fs::read_dir(dir).with_context(|| format!("reading directory {dir:?}"))? {
			let path = entry?.path();
			if path.is_dir() {
				self.walk(&path, coords)?;
			} else {
				let relative = path
					.strip_prefix(&self.root)?
					.components()
					.map(|component| component.as_os_str().to_string_lossy())
					.collect::<Vec<_>>()
					.join("/");
				if let Some(coord) = self.layout.parse(&relative) {
					coords.push(coord);
				}
			}
		}
		Ok(())
	}
}

#[async_trait]
impl TileStore for FileStore {
	fn name(&self) -> String {
		format!("file({})", self.root.display())
	}

	async fn get_one(&self, tile: &mut Tile) -> Result<bool> {
		let path = self.path(&tile.coord);
		match fs::read(&path) {
			Ok(data) => {
				tile.data = Some(Blob::from(data));
				Ok(true)
			}
			Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
			Err(error) => Err(error).with_context(|| format!("reading tile {path:?}")),
		}
	}

	async fn put_one(&self, tile: &Tile) -> Result<()> {
		let data = tile
			.data
			.as_ref()
			.with_context(|| format!("tile {} has no data to store", tile.coord))?;
		let path = self.path(&tile.coord);
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent).with_context(|| format!("creating directory {parent:?}"))?;
		}
		fs::write(&path, data.as_slice()).with_context(|| format!("writing tile {path:?}"))
	}

	async fn delete_one(&self, tile: &Tile) -> Result<()> {
		let path = self.path(&tile.coord);
		match fs::remove_file(&path) {
			Ok(()) => Ok(()),
			Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
			Err(error) => Err(error).with_context(|| format!("deleting tile {path:?}")),
		}
	}

	async fn list(&self) -> Result<Vec<TileCoord>> {
		let mut coords = Vec::new();
		if self.root.is_dir() {
			let root = self.root.clone();
			self.walk(&root, &mut coords)?;
		}
		coords.sort();
		Ok(coords)
	}
}
