use crate::config::Config;
use crate::generate::{GenerateOptions, Generator, Role};
use crate::hash_drop::HashReporter;
use crate::render::{Renderer, WmsRenderer};
use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tileforge_core::{Tile, TileCoord, TooManyErrors};

#[derive(clap::Args, Debug)]
#[command(arg_required_else_help = true, disable_version_flag = true)]
pub struct Subcommand {
	/// configuration file
	#[arg(long, short, value_name = "FILE", default_value = "tileforge.yaml")]
	config: PathBuf,

	/// process role
	#[arg(long, value_enum, default_value = "local")]
	role: Role,

	/// layer to generate, may be repeated; defaults to generation.default_layers
	#[arg(long, short, value_name = "NAME")]
	layer: Vec<String>,

	/// zoom levels: a single level `5`, a range `2-7` or a list `2,4,6`
	#[arg(long, short, value_name = "LEVELS")]
	zoom: Option<String>,

	/// restrict generation to a map-unit extent
	#[arg(
		long,
		value_name = "MINX MINY MAXX MAXY",
		num_args = 4,
		allow_hyphen_values = true
	)]
	bbox: Option<Vec<f64>>,

	/// seed the coordinates listed in this file instead of a pyramid
	#[arg(long, value_name = "FILE")]
	tiles: Option<PathBuf>,

	/// render one tile and print its emptiness signature
	#[arg(long, value_name = "Z/X/Y")]
	get_hash: Option<String>,

	/// print the map-unit extent of a tile
	#[arg(long, value_name = "Z/X/Y[:+n/+n]")]
	get_bbox: Option<String>,

	/// keep a slave waiting on an empty queue
	#[arg(long)]
	daemon: bool,

	/// partition index of this process, 0..generation.number_process
	#[arg(long, value_name = "INDEX")]
	local_process_number: Option<usize>,

	/// stop after generating this many tiles
	#[arg(long, value_name = "COUNT")]
	test: Option<usize>,

	/// cache to write to, defaults to generation.default_cache
	#[arg(long, value_name = "NAME")]
	cache: Option<String>,
}

#[tokio::main]
pub async fn run(arguments: &Subcommand) -> Result<()> {
	let config = Config::from_path(&arguments.config)?;
	check_authorised_user(&config)?;

	if let Some(token) = &arguments.get_bbox {
		return print_bbox(&config, arguments, token);
	}
	if let Some(token) = &arguments.get_hash {
		return print_hash(&config, arguments, token).await;
	}

	let options = GenerateOptions {
		role: arguments.role,
		layers: arguments.layer.clone(),
		cache: arguments.cache.clone(),
		zooms: parse_zooms(arguments.zoom.as_deref())?,
		bbox: parse_bbox(arguments.bbox.as_deref())?,
		tiles_file: arguments.tiles.clone(),
		daemon: arguments.daemon,
		local_process_number: arguments.local_process_number,
		test_limit: arguments.test,
	};
	let result = Generator::new(config).run(&options).await;
	if let Err(error) = &result {
		if let Some(fatal) = error.downcast_ref::<TooManyErrors>() {
			log::error!("aborting the run: {fatal}");
		}
	}
	result
}

fn check_authorised_user(config: &Config) -> Result<()> {
	let Some(authorised) = &config.generation.authorised_user else {
		return Ok(());
	};
	let user = std::env::var("USER").unwrap_or_default();
	if &user != authorised {
		bail!("generation is restricted to the user '{authorised}' (running as '{user}')");
	}
	Ok(())
}

/// The layer a single-tile query (`--get-bbox`, `--get-hash`) refers to.
fn single_layer<'a>(config: &'a Config, arguments: &'a Subcommand) -> Result<&'a str> {
	match arguments.layer.as_slice() {
		[name] => Ok(name),
		[] => match config.generation.default_layers.as_slice() {
			[name] => Ok(name),
			_ => bail!("specify exactly one --layer"),
		},
		_ => bail!("specify exactly one --layer"),
	}
}

fn print_bbox(config: &Config, arguments: &Subcommand, token: &str) -> Result<()> {
	let name = single_layer(config, arguments)?;
	let layer = config.layer(name)?;
	let grid = config
		.grids
		.get(&layer.grid)
		.context("unknown grid")?
		.to_grid()?;
	let coord = TileCoord::parse(token)?;
	let extent = grid.tile_extent(&coord, 0)?;
	println!("Tile bounds: [{},{},{},{}]", extent[0], extent[1], extent[2], extent[3]);
	Ok(())
}

async fn print_hash(config: &Config, arguments: &Subcommand, token: &str) -> Result<()> {
	let name = single_layer(config, arguments)?;
	let layer = config.layer(name)?;
	let grid_config = config.grids.get(&layer.grid).context("unknown grid")?;
	let grid = Arc::new(grid_config.to_grid()?);
	let renderer = WmsRenderer::new(name, layer, &grid_config.srs, grid)?;

	let coord = TileCoord::parse(token)?;
	let n = layer.effective_meta_size();
	if n > 1 {
		let data = renderer.fetch(&Tile::new(coord.metatile(n))).await?;
		println!("empty_metatile_detection:\n{}", HashReporter::report(&data)?);
	}
	let data = renderer.fetch(&Tile::new(coord)).await?;
	println!("empty_tile_detection:\n{}", HashReporter::report(&data)?);
	Ok(())
}

/// Parse the `--zoom` argument: `5`, `2-7` or `2,4,6`.
fn parse_zooms(zoom: Option<&str>) -> Result<Vec<u8>> {
	let Some(zoom) = zoom else {
		return Ok(Vec::new());
	};
	let parse = |text: &str| {
		text.trim()
			.parse::<u8>()
			.with_context(|| format!("invalid zoom level '{}'", text.trim()))
	};
	if let Some((from, to)) = zoom.split_once('-') {
		let (from, to) = (parse(from)?, parse(to)?);
		if from > to {
			bail!("empty zoom range '{zoom}'");
		}
		return Ok((from..=to).collect());
	}
	zoom.split(',').map(parse).collect()
}

fn parse_bbox(bbox: Option<&[f64]>) -> Result<Option<[f64; 4]>> {
	match bbox {
		None => Ok(None),
		Some(&[min_x, min_y, max_x, max_y]) => {
			if min_x >= max_x || min_y >= max_y {
				bail!("degenerate bbox");
			}
			Ok(Some([min_x, min_y, max_x, max_y]))
		}
		Some(values) => bail!("--bbox needs 4 values, got {}", values.len()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn zoom_argument_forms() {
		assert_eq!(parse_zooms(None).unwrap(), Vec::<u8>::new());
		assert_eq!(parse_zooms(Some("5")).unwrap(), vec![5]);
		assert_eq!(parse_zooms(Some("2-5")).unwrap(), vec![2, 3, 4, 5]);
		assert_eq!(parse_zooms(Some("2,4,6")).unwrap(), vec![2, 4, 6]);
		assert!(parse_zooms(Some("7-2")).is_err());
		assert!(parse_zooms(Some("a")).is_err());
	}

	#[test]
	fn bbox_argument() {
		assert_eq!(parse_bbox(None).unwrap(), None);
		assert_eq!(
			parse_bbox(Some(&[1.0, 2.0, 3.0, 4.0])).unwrap(),
			Some([1.0, 2.0, 3.0, 4.0])
		);
		assert!(parse_bbox(Some(&[3.0, 2.0, 1.0, 4.0])).is_err());
		assert!(parse_bbox(Some(&[1.0, 2.0])).is_err());
	}

	fn arguments(layers: &[&str]) -> Subcommand {
		Subcommand {
			config: PathBuf::from("tileforge.yaml"),
			role: Role::Local,
			layer: layers.iter().map(|name| (*name).to_string()).collect(),
			zoom: None,
			bbox: None,
			tiles: None,
			get_hash: None,
			get_bbox: None,
			daemon: false,
			local_process_number: None,
			test: None,
			cache: None,
		}
	}

	fn config(generation_tail: &str) -> Config {
		Config::from_string(&format!(
			"grids:
  g:
    resolutions: [100, 50]
    bbox: [420000, 30000, 900000, 350000]
    srs: 'EPSG:2056'
layers:
  plan:
    type: wms
    url: http://wms.example.com/
    grid: g
{generation_tail}"
		))
		.unwrap()
	}

	#[test]
	fn single_layer_resolution() {
		let config = config("");
		assert_eq!(single_layer(&config, &arguments(&["plan"])).unwrap(), "plan");
		assert!(single_layer(&config, &arguments(&[])).is_err());
		assert!(single_layer(&config, &arguments(&["a", "b"])).is_err());

		let config = self::config("generation:\n  default_layers: [plan]\n");
		assert_eq!(single_layer(&config, &arguments(&[])).unwrap(), "plan");
	}

	#[test]
	fn bbox_of_a_zoom_beyond_the_grid_fails() {
		let config = config("");
		assert!(print_bbox(&config, &arguments(&["plan"]), "1/0/0").is_ok());
		assert!(print_bbox(&config, &arguments(&["plan"]), "8/0/0").is_err());
	}

	#[test]
	fn unknown_user_is_rejected() {
		let config = Config::from_string(
			"generation:\n  authorised_user: 'no such user'\n",
		)
		.unwrap();
		assert!(check_authorised_user(&config).is_err());
		assert!(check_authorised_user(&Config::default()).is_ok());
	}
}
