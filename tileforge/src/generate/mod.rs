//! Role wiring: the master, slave and local generation runs.

mod error_file;
mod stores;
mod tiles_file;

pub use error_file::ErrorFile;
pub use stores::{layer_layout, open_store};
pub use tiles_file::{parse_coords, read_coords};

use crate::config::{Config, LayerConfig};
use crate::geometry::{build_coverage, IntersectFilter};
use crate::hash_drop::{EmptySignature, HashDropper};
use crate::render::{Renderer, WmsRenderer};
use crate::split::MetatileSplitter;
use anyhow::{bail, Context, Result};
use itertools::Itertools;
use log::{info, warn};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tileforge_core::{
	BoundingPyramid, Count, CountSize, ErrorBreaker, Grid, Tile, TileBBox, TileCoord, TileError, TileStream,
	META_LAYER,
};
use tileforge_store::queue::{receipt, RedisQueue, TileQueue};
use tileforge_store::TileStore;

/// Jobs pulled from the queue per round trip.
const PULL_BATCH: usize = 10;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Role {
	/// Seed and consume in one process, no queue round trip.
	#[default]
	Local,
	/// Enumerate the metatiles and fill the queue.
	Master,
	/// Pull jobs from the queue, render and store them.
	Slave,
}

#[derive(Clone, Debug, Default)]
pub struct GenerateOptions {
	pub role: Role,
	/// Layers to generate; empty means `generation.default_layers`.
	pub layers: Vec<String>,
	pub cache: Option<String>,
	/// Zoom levels to seed; empty means every level of the grid.
	pub zooms: Vec<u8>,
	/// Restrict seeding to this map-unit extent.
	pub bbox: Option<[f64; 4]>,
	/// Seed the coordinates of this tiles-list file instead of a pyramid.
	pub tiles_file: Option<PathBuf>,
	/// Keep a slave waiting on an empty queue.
	pub daemon: bool,
	/// Partition index of this process, `0..generation.number_process`.
	pub local_process_number: Option<usize>,
	/// Stop after this many tiles (`--test`).
	pub test_limit: Option<usize>,
}

/// Partitions metatiles across cooperating `local` processes.
#[derive(Clone, Copy, Debug)]
pub struct LocalProcessFilter {
	processes: usize,
	index: usize,
}

impl LocalProcessFilter {
	#[must_use]
	pub fn new(processes: usize, index: usize) -> LocalProcessFilter {
		LocalProcessFilter {
			processes: processes.max(1),
			index,
		}
	}

	#[must_use]
	pub fn matches(&self, coord: &TileCoord) -> bool {
		let value = u64::from(coord.z) + u64::from(coord.x / coord.n) + u64::from(coord.y / coord.n);
		value % self.processes as u64 == self.index as u64
	}
}

pub struct Generator {
	config: Config,
}

impl Generator {
	#[must_use]
	pub fn new(config: Config) -> Generator {
		Generator { config }
	}

	pub async fn run(&self, options: &GenerateOptions) -> Result<()> {
		match options.role {
			Role::Master => self.run_master(options).await,
			Role::Slave => self.run_slave(options).await,
			Role::Local => self.run_local(options).await,
		}
	}

	fn layer_names(&self, options: &GenerateOptions) -> Result<Vec<String>> {
		let names = if !options.layers.is_empty() {
			options.layers.clone()
		} else if !self.config.generation.default_layers.is_empty() {
			self.config.generation.default_layers.clone()
		} else {
			self.config.layers.keys().cloned().collect()
		};
		if names.is_empty() {
			bail!("no layer configured");
		}
		for name in &names {
			self.config.layer(name)?;
		}
		Ok(names)
	}

	fn cache_name(&self, options: &GenerateOptions) -> Result<String> {
		options
			.cache
			.clone()
			.or_else(|| self.config.generation.default_cache.clone())
			.context("no cache given and no generation.default_cache configured")
	}

	async fn open_queue(&self) -> Result<Arc<dyn TileQueue>> {
		let Some(redis) = &self.config.redis else {
			bail!("the master and slave roles need a configured redis queue");
		};
		let consumer = format!("tileforge-{}", std::process::id());
		let queue = RedisQueue::connect(&redis.url, &redis.stream, &redis.group, consumer, redis.block_ms).await?;
		Ok(Arc::new(queue))
	}

	/// The metatile jobs a layer should be seeded with, tagged with the layer
	/// name. Pyramid seeds are enumerated lazily as the pipeline pulls them;
	/// only a tiles file is read up front, to deduplicate its metatiles.
	fn seed_stream(&self, name: &str, options: &GenerateOptions) -> Result<TileStream<'static>> {
		let layer = self.config.layer(name)?;
		let grid_config = self.config.grids.get(&layer.grid).context("unknown grid")?;
		let grid = Arc::new(grid_config.to_grid()?);
		let n = layer.effective_meta_size();

		// the rendered border of a metatile can reach the coverage too
		let buffer = if n > 1 { layer.px_buffer + layer.meta_buffer } else { layer.px_buffer };
		let coverage = build_coverage(layer, &grid, options.bbox);
		let geometry = IntersectFilter::new(Arc::clone(&grid), coverage, buffer);
		let partition = options
			.local_process_number
			.map(|index| LocalProcessFilter::new(self.config.generation.number_process, index));

		let layer_name = name.to_string();
		let stream = match &options.tiles_file {
			Some(path) => {
				let coords: Vec<TileCoord> = read_coords(path)?
					.into_iter()
					.map(|coord| if n > 1 { coord.metatile(n) } else { coord })
					.unique()
					.collect();
				TileStream::from_iter(
					coords
						.into_iter()
						.map(move |coord| Tile::new(coord).with_metadata(META_LAYER, &layer_name)),
				)
			}
			None => TileStream::from_iter(
				build_pyramid(layer, &grid, options)?
					.into_iter_meta_coords(n)
					.map(move |coord| Tile::new(coord).with_metadata(META_LAYER, &layer_name)),
			),
		};

		Ok(stream
			.retain(move |tile| Ok(geometry.matches(&tile.coord)))
			.retain(move |tile| {
				Ok(partition.as_ref().map_or(true, |partition| partition.matches(&tile.coord)))
			}))
	}

	async fn run_master(&self, options: &GenerateOptions) -> Result<()> {
		let queue = self.open_queue().await?;
		let mut total = 0u64;
		for name in self.layer_names(options)? {
			let queued = Count::default();
			let push_errors = Count::default();
			let push_queue = Arc::clone(&queue);

			self.seed_stream(&name, options)?
				.map_async(move |tile| {
					let queue = Arc::clone(&push_queue);
					async move {
						match queue.push(&tile).await {
							Ok(()) => Ok(tile),
							Err(error) => Err((tile, TileError::Queue(format!("{error:#}")))),
						}
					}
				})
				.count(&queued)
				.log_errors()
				.drop_errors(&push_errors)
				.consume(None)
				.await?;

			info!("layer '{name}': {} metatile jobs queued", queued.get());
			total += queued.get();
			if push_errors.get() > 0 {
				bail!("layer '{name}': {} jobs could not be queued", push_errors.get());
			}
		}

		let status = queue.status().await?;
		info!(
			"{total} jobs queued in this run, queue holds {} queued and {} in flight",
			status.queued, status.in_flight
		);
		Ok(())
	}

	async fn run_slave(&self, options: &GenerateOptions) -> Result<()> {
		let queue = self.open_queue().await?;
		let cache = self.cache_name(options)?;
		let mut pipelines = BTreeMap::new();
		for name in self.layer_names(options)? {
			let pipeline = LayerPipeline::build(&self.config, &name, &cache, Some(Arc::clone(&queue)))?;
			pipelines.insert(name, pipeline);
		}

		let mut processed = 0u64;
		'pull: loop {
			let pulled = queue.pull(PULL_BATCH).await?;
			if pulled.is_empty() {
				if options.daemon {
					continue;
				}
				break;
			}

			let mut by_layer: BTreeMap<String, Vec<Tile>> = BTreeMap::new();
			for tile in pulled {
				match tile.layer() {
					Some(layer) if pipelines.contains_key(layer) => {
						by_layer.entry(layer.to_string()).or_default().push(tile);
					}
					layer => {
						// discard instead of poisoning the pending list
						warn!("dropping a job for unconfigured layer {layer:?} at {}", tile.coord);
						queue.delete(&tile).await?;
					}
				}
			}

			for (name, tiles) in by_layer {
				let remaining = options.test_limit.map(|limit| (limit as u64).saturating_sub(processed) as usize);
				let summary = pipelines[&name].process(TileStream::from_vec(tiles)).consume(remaining).await?;
				processed += summary.count;
			}
			if options.test_limit.is_some_and(|limit| processed >= limit as u64) {
				break 'pull;
			}
		}

		for (name, pipeline) in &pipelines {
			pipeline.report(name);
		}
		Ok(())
	}

	async fn run_local(&self, options: &GenerateOptions) -> Result<()> {
		let cache = self.cache_name(options)?;
		for name in self.layer_names(options)? {
			let pipeline = LayerPipeline::build(&self.config, &name, &cache, None)?;
			let stream = self.seed_stream(&name, options)?;
			pipeline.process(stream).consume(options.test_limit).await?;
			pipeline.report(&name);
		}
		Ok(())
	}
}

/// The per-zoom tile ranges a layer is seeded over.
fn build_pyramid(layer: &LayerConfig, grid: &Grid, options: &GenerateOptions) -> Result<BoundingPyramid> {
	let extent = options.bbox.or(layer.bbox).unwrap_or(*grid.max_extent());
	let mut pyramid = BoundingPyramid::new_empty();
	for z in 0..grid.zoom_count() {
		if !options.zooms.is_empty() && !options.zooms.contains(&z) {
			continue;
		}
		if let Some(min_resolution) = layer.min_resolution_seed {
			if grid.resolution(z)? < min_resolution {
				continue;
			}
		}
		if let Some(bbox) = tile_range(grid, z, &extent) {
			pyramid.set_level(bbox);
		}
	}
	Ok(pyramid)
}

/// The tiles of one zoom level covering a map-unit extent.
fn tile_range(grid: &Grid, z: u8, extent: &[f64; 4]) -> Option<TileBBox> {
	let span = grid.resolution(z).ok()? * f64::from(grid.tile_size());
	let origin = grid.max_extent();
	let x_min = ((extent[0] - origin[0]) / span).floor().max(0.0) as u32;
	let y_min = ((origin[3] - extent[3]) / span).floor().max(0.0) as u32;
	// the maximum edge belongs to the previous tile
	let x_max = (((extent[2] - origin[0]) / span).ceil() as i64 - 1).max(x_min as i64) as u32;
	let y_max = (((origin[3] - extent[1]) / span).ceil() as i64 - 1).max(y_min as i64) as u32;
	TileBBox::new(z, x_min, y_min, x_max, y_max).ok()
}

/// Run totals of one layer's pipeline.
#[derive(Clone, Default)]
struct Counters {
	rendered: Count,
	stored: CountSize,
	errors: Count,
}

/// The render-split-drop-store stage chain of one layer.
struct LayerPipeline {
	renderer: Arc<WmsRenderer>,
	content_type: String,
	splitter: Option<Arc<MetatileSplitter>>,
	meta_dropper: Option<Arc<HashDropper>>,
	tile_dropper: Option<Arc<HashDropper>>,
	store: Arc<dyn TileStore>,
	queue: Option<Arc<dyn TileQueue>>,
	breaker: Arc<ErrorBreaker>,
	error_file: Option<Arc<ErrorFile>>,
	counters: Counters,
}

impl LayerPipeline {
	fn build(config: &Config, name: &str, cache: &str, queue: Option<Arc<dyn TileQueue>>) -> Result<LayerPipeline> {
		let layer = config.layer(name)?;
		let grid_config = config
			.grids
			.get(&layer.grid)
			.with_context(|| format!("layer '{name}': unknown grid '{}'", layer.grid))?;
		let grid = Arc::new(grid_config.to_grid()?);
		let store = open_store(config.cache(cache)?, name, layer, &grid)?;

		let splitter = (layer.effective_meta_size() > 1).then(|| {
			Arc::new(MetatileSplitter::new(grid.tile_size(), layer.meta_buffer, &layer.extension))
		});
		let dropper = |signature: &crate::config::EmptySignatureConfig| {
			Arc::new(HashDropper::new(
				EmptySignature {
					size: signature.size as u64,
					hash: signature.hash.clone(),
				},
				Some(Arc::clone(&store)),
				queue.clone(),
			))
		};
		let meta_dropper = layer.empty_metatile_detection.as_ref().map(&dropper);
		let tile_dropper = layer.empty_tile_detection.as_ref().map(&dropper);

		let error_file = config
			.generation
			.error_file
			.as_deref()
			.map(|path| ErrorFile::open(path, name))
			.transpose()?
			.map(Arc::new);

		Ok(LayerPipeline {
			renderer: Arc::new(WmsRenderer::new(name, layer, &grid_config.srs, Arc::clone(&grid))?),
			content_type: layer.content_type(),
			splitter,
			meta_dropper,
			tile_dropper,
			store,
			queue,
			breaker: ErrorBreaker::new(config.generation.maxconsecutive_errors),
			error_file,
			counters: Counters::default(),
		})
	}

	/// Chain the layer's stages onto a stream of empty metatiles.
	fn process<'a>(&self, stream: TileStream<'a>) -> TileStream<'a> {
		let renderer = Arc::clone(&self.renderer);
		let content_type = self.content_type.clone();
		let mut stream = stream
			.map_async(move |mut tile| {
				let renderer = Arc::clone(&renderer);
				let content_type = content_type.clone();
				async move {
					match renderer.fetch(&tile).await {
						Ok(data) => {
							tile.data = Some(data);
							tile.content_type = Some(content_type);
							Ok(tile)
						}
						Err(error) => Err((tile, TileError::Render(format!("{error:#}")))),
					}
				}
			})
			.count(&self.counters.rendered);

		if let Some(dropper) = &self.meta_dropper {
			let dropper = Arc::clone(dropper);
			stream = stream.filter_map_async(move |tile| {
				let dropper = Arc::clone(&dropper);
				async move { dropper.apply(tile).await }
			});
		}
		if let Some(splitter) = &self.splitter {
			let splitter = Arc::clone(splitter);
			stream = stream.flat_map_async(move |tile| {
				let splitter = Arc::clone(&splitter);
				async move { splitter.split(tile) }
			});
		}
		if let Some(dropper) = &self.tile_dropper {
			let dropper = Arc::clone(dropper);
			stream = stream.filter_map_async(move |tile| {
				let dropper = Arc::clone(&dropper);
				async move { dropper.apply(tile).await }
			});
		}

		let store = Arc::clone(&self.store);
		let queue = self.queue.clone();
		let mut stream = stream
			.map_async(move |tile| {
				let store = Arc::clone(&store);
				let queue = queue.clone();
				async move { finalize(tile, &store, queue.as_deref()).await }
			})
			.count_size(&self.counters.stored)
			.log_errors();

		if let Some(error_file) = &self.error_file {
			let error_file = Arc::clone(error_file);
			stream = stream.inspect_errors(move |tile| error_file.record(tile));
		}
		stream
			.break_with(Arc::clone(&self.breaker))
			.drop_errors(&self.counters.errors)
	}

	fn report(&self, name: &str) {
		let dropped = self.meta_dropper.as_ref().map_or(0, |dropper| dropper.dropped.get())
			+ self.tile_dropper.as_ref().map_or(0, |dropper| dropper.dropped.get());
		info!(
			"layer '{name}': {} metatiles rendered, {} tiles stored ({} bytes), {} empty tiles dropped, {} errors",
			self.counters.rendered.get(),
			self.counters.stored.count(),
			self.counters.stored.size(),
			dropped,
			self.counters.errors.get(),
		);
	}
}

/// Store a finished tile and retire its queue job once the whole metatile
/// is done.
async fn finalize(
	tile: Tile,
	store: &Arc<dyn TileStore>,
	queue: Option<&dyn TileQueue>,
) -> Result<Tile, (Tile, TileError)> {
	if let Err(error) = store.put_one(&tile).await {
		return Err((tile, TileError::Store(format!("{error:#}"))));
	}
	if let Some(queue) = queue {
		let finished = match &tile.parent {
			Some(parent) => parent.complete_one(),
			None => true,
		};
		if finished && receipt(&tile).is_some() {
			if let Err(error) = queue.delete(&tile).await {
				return Err((tile, TileError::Queue(format!("{error:#}"))));
			}
		}
	}
	Ok(tile)
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use tileforge_core::{Blob, Metatile};
	use tileforge_store::queue::MemoryQueue;
	use tileforge_store::MemoryStore;

	#[rstest]
	#[case(1, 0, true)]
	#[case(3, 1, true)] // 2 + 4/2 + 6/2 = 7
	#[case(3, 0, false)]
	#[case(3, 2, false)]
	fn local_process_partition(#[case] processes: usize, #[case] index: usize, #[case] kept: bool) {
		let filter = LocalProcessFilter::new(processes, index);
		assert_eq!(filter.matches(&TileCoord::new_meta(2, 4, 6, 2)), kept);
	}

	#[test]
	fn partition_covers_every_metatile_once() {
		let filters: Vec<_> = (0..3).map(|index| LocalProcessFilter::new(3, index)).collect();
		for coord in TileBBox::new(4, 0, 0, 9, 9).unwrap().iter_meta_coords(2) {
			let owners = filters.iter().filter(|filter| filter.matches(&coord)).count();
			assert_eq!(owners, 1, "{coord}");
		}
	}

	#[test]
	fn tile_ranges_cover_the_extent() {
		let grid = Grid::new(
			256,
			[420000.0, 30000.0, 900000.0, 350000.0],
			&[100.0, 50.0],
			tileforge_core::MatrixIdentifier::Zoom,
		)
		.unwrap();
		// 480000 / (100 * 256) = 18.75 -> 19 columns
		let level = tile_range(&grid, 0, grid.max_extent()).unwrap();
		assert_eq!((level.x_min, level.y_min, level.x_max, level.y_max), (0, 0, 18, 12));

		// a sub-extent straddling tile boundaries
		let level = tile_range(&grid, 1, &[430000.0, 330000.0, 445000.0, 345000.0]).unwrap();
		assert!(level.contains(&TileCoord::new(1, 0, 0)));
		assert!(level.contains(&TileCoord::new(1, 1, 1)));
	}

	#[test]
	fn pyramid_respects_zoom_and_resolution_limits() {
		let config: LayerConfig = serde_yaml_ng::from_str(
			"type: wms\nurl: http://wms.example.com/\ngrid: g\nmin_resolution_seed: 50",
		)
		.unwrap();
		let grid = Grid::new(
			256,
			[0.0, 0.0, 100000.0, 100000.0],
			&[100.0, 50.0, 25.0],
			tileforge_core::MatrixIdentifier::Zoom,
		)
		.unwrap();

		let options = GenerateOptions::default();
		let pyramid = build_pyramid(&config, &grid, &options).unwrap();
		assert!(!pyramid.get_level(0).is_empty());
		assert!(!pyramid.get_level(1).is_empty());
		// finer than min_resolution_seed
		assert!(pyramid.get_level(2).is_empty());

		let options = GenerateOptions {
			zooms: vec![1],
			..GenerateOptions::default()
		};
		let pyramid = build_pyramid(&config, &grid, &options).unwrap();
		assert!(pyramid.get_level(0).is_empty());
		assert!(!pyramid.get_level(1).is_empty());
	}

	fn seed_config(layer_tail: &str) -> Config {
		Config::from_string(&format!(
			"grids:
  swissgrid:
    resolutions: [100, 50, 25]
    bbox: [420000, 30000, 900000, 350000]
    srs: 'EPSG:2056'
layers:
  plan:
    type: wms
    url: http://wms.example.com/
    grid: swissgrid
{layer_tail}"
		))
		.unwrap()
	}

	async fn seed(config: Config, options: &GenerateOptions) -> Vec<TileCoord> {
		Generator::new(config)
			.seed_stream("plan", options)
			.unwrap()
			.collect()
			.await
			.into_iter()
			.map(|tile| tile.coord)
			.collect()
	}

	#[tokio::test]
	async fn metatile_border_reaches_the_coverage() {
		// a box just past the first metatile's footprint at z2, within the
		// 20 px rendered border (500 map units at resolution 25)
		let geometries = "    geometries:
      - bbox: [432900, 337000, 433000, 337100]
";
		let options = GenerateOptions {
			zooms: vec![2],
			..GenerateOptions::default()
		};

		let meta = format!("    meta: true\n    meta_size: 2\n    meta_buffer: 20\n{geometries}");
		let coords = seed(seed_config(&meta), &options).await;
		assert!(coords.contains(&TileCoord::new_meta(2, 0, 0, 2)));

		// without metatiling only px_buffer applies and the tile stays out
		let coords = seed(seed_config(geometries), &options).await;
		assert!(!coords.contains(&TileCoord::new(2, 1, 1)));
	}

	#[tokio::test]
	async fn tiles_file_seeds_are_deduplicated() {
		use assert_fs::prelude::*;

		let file = assert_fs::NamedTempFile::new("tiles.txt").unwrap();
		file.write_str("2/0/0\n2/1/1\n2/1/0\n").unwrap();
		let options = GenerateOptions {
			tiles_file: Some(file.path().to_path_buf()),
			..GenerateOptions::default()
		};
		let coords = seed(seed_config("    meta: true\n    meta_size: 2\n"), &options).await;
		assert_eq!(coords, vec![TileCoord::new_meta(2, 0, 0, 2)]);
	}

	#[tokio::test]
	async fn pyramid_seeding_stays_lazy() {
		let config = Config::from_string(
			"grids:
  deep:
    resolutions: [1]
    bbox: [0, 0, 10000000, 10000000]
    srs: 'EPSG:2056'
layers:
  plan:
    type: wms
    url: http://wms.example.com/
    grid: deep
",
		)
		.unwrap();
		// ~1.5e9 tiles at resolution 1; enumerating them up front would
		// exhaust memory long before the limit
		let summary = Generator::new(config)
			.seed_stream("plan", &GenerateOptions::default())
			.unwrap()
			.consume(Some(5))
			.await
			.unwrap();
		assert_eq!(summary.count, 5);
	}

	#[tokio::test]
	async fn finalize_acknowledges_once_per_metatile() {
		let store: Arc<dyn TileStore> = Arc::new(MemoryStore::new());
		let queue = MemoryQueue::new();
		queue
			.push(&Tile::new(TileCoord::new_meta(5, 0, 0, 2)).with_metadata(META_LAYER, "plan"))
			.await
			.unwrap();
		let job = queue.pull(1).await.unwrap().remove(0);
		let parent = Metatile::new(job.coord, job.queue_id.clone());

		for coord in job.coord.tiles() {
			let mut child = Tile::new(coord)
				.with_data(Blob::from("img"))
				.with_metadata(META_LAYER, "plan");
			child.parent = Some(Arc::clone(&parent));
			finalize(child, &store, Some(&queue as &dyn TileQueue)).await.unwrap();
		}
		let status = queue.status().await.unwrap();
		assert_eq!(status.queued + status.in_flight, 0);
	}
}
