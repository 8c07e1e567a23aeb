use crate::layout::WmtsLayout;
use crate::traits::TileStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::ObjectStore;
use std::sync::Arc;
use tileforge_core::{Blob, Tile, TileCoord};

/// A tile cache on any `object_store` backend (S3 and friends), using the
/// same WMTS key layout as the file store.
pub struct ObjectTileStore {
	store: Arc<dyn ObjectStore>,
	layout: WmtsLayout,
	prefix: String,
	label: String,
}

impl ObjectTileStore {
	pub fn new(store: Arc<dyn ObjectStore>, layout: WmtsLayout, label: impl Into<String>) -> ObjectTileStore {
		ObjectTileStore {
			store,
			layout,
			prefix: String::new(),
			label: label.into(),
		}
	}

	/// Store all keys below a folder of the bucket.
	#[must_use]
	pub fn with_prefix(mut self, prefix: impl Into<String>) -> ObjectTileStore {
		self.prefix = prefix.into().trim_matches('/').to_string();
		self
	}

	/// Open an S3 bucket, credentials and region from the environment.
	pub fn s3(bucket: &str, layout: WmtsLayout) -> Result<ObjectTileStore> {
		let store = AmazonS3Builder::from_env()
			.with_bucket_name(bucket)
			.build()
			.with_context(|| format!("opening S3 bucket '{bucket}'"))?;
		Ok(ObjectTileStore::new(Arc::new(store), layout, format!("s3://{bucket}")))
	}

	fn location(&self, coord: &TileCoord) -> Path {
		let key = self.layout.filename(coord);
		if self.prefix.is_empty() {
			Path::from(key)
		} else {
			Path::from(format!("{}/{key}", self.prefix))
		}
	}
}

#[async_trait]
impl TileStore for ObjectTileStore {
	fn name(&self) -> String {
		format!("object({})", self.label)
	}

	async fn get_one(&self, tile: &mut Tile) -> Result<bool> {
		let location = self.location(&tile.coord);
		match self.store.get(&location).await {
			Ok(result) => {
				let bytes = result
					.bytes()
					.await
					.with_context(|| format!("reading object {location}"))?;
				tile.data = Some(Blob::from(bytes.as_ref()));
				Ok(true)
			}
			Err(object_store::Error::NotFound { .. }) => Ok(false),
			Err(error) => Err(error).with_context(|| format!("reading object {location}")),
		}
	}

	async fn put_one(&self, tile: &Tile) -> Result<()> {
		let data = tile
			.data
			.as_ref()
			.with_context(|| format!("tile {} has no data to store", tile.coord))?;
		let location = self.location(&tile.coord);
		self.store
			.put(&location, Bytes::copy_from_slice(data.as_slice()).into())
			.await
			.with_context(|| format!("writing object {location}"))?;
		Ok(())
	}

	async fn delete_one(&self, tile: &Tile) -> Result<()> {
		let location = self.location(&tile.coord);
		match self.store.delete(&location).await {
			Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
			Err(error) => Err(error).with_context(|| format!("deleting object {location}")),
		}
	}

	async fn list(&self) -> Result<Vec<TileCoord>> {
		let below = if self.prefix.is_empty() {
			None
		} else {
			Some(Path::from(self.prefix.as_str()))
		};
		let locations: Vec<object_store::ObjectMeta> = self.store.list(below.as_ref()).try_collect().await?;
		let mut coords = locations
			.iter()
			.filter_map(|meta| {
				let key = meta.location.as_ref();
				let key = key.strip_prefix(self.prefix.as_str()).unwrap_or(key).trim_start_matches('/');
				self.layout.parse(key)
			})
			.collect::<Vec<_>>();
		coords.sort();
		Ok(coords)
	}
}
