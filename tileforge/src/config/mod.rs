//! YAML configuration model.
//!
//! A configuration declares grids (resolution pyramids), caches (storage
//! backends), layers (rendering sources) and the generation settings. The
//! `layer_default` section is merged under every layer before typed parsing,
//! with the layer's own fields winning. Validation is all-or-nothing: every
//! problem is collected and reported at startup, before any stream runs.

mod cache;
mod generation;
mod grid;
mod layer;

pub use cache::CacheConfig;
pub use generation::{GenerationConfig, RedisConfig};
pub use grid::GridConfig;
pub use layer::{DimensionConfig, EmptySignatureConfig, GeometrySourceConfig, LayerConfig};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_yaml_ng::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Default, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
	#[serde(default)]
	pub grids: BTreeMap<String, GridConfig>,

	#[serde(default)]
	pub caches: BTreeMap<String, CacheConfig>,

	#[serde(default)]
	pub layers: BTreeMap<String, LayerConfig>,

	#[serde(default)]
	pub generation: GenerationConfig,

	#[serde(default)]
	pub redis: Option<RedisConfig>,
}

impl Config {
	pub fn from_string(text: &str) -> Result<Config> {
		let mut value: Value = serde_yaml_ng::from_str(text).context("parsing configuration")?;
		merge_layer_default(&mut value);
		let config: Config = serde_yaml_ng::from_value(value).context("parsing configuration")?;
		config.validate()?;
		Ok(config)
	}

	pub fn from_path(path: &Path) -> Result<Config> {
		let text = fs::read_to_string(path).with_context(|| format!("reading configuration {path:?}"))?;
		Config::from_string(&text)
	}

	/// Check every cross-reference and value constraint, reporting all
	/// problems at once.
	fn validate(&self) -> Result<()> {
		let mut problems = Vec::new();

		for (name, grid) in &self.grids {
			if let Err(error) = grid.to_grid() {
				problems.push(format!("grid '{name}': {error}"));
			}
		}

		for (name, layer) in &self.layers {
			if !self.grids.contains_key(&layer.grid) {
				problems.push(format!("layer '{name}': unknown grid '{}'", layer.grid));
			}
			if layer.meta_size == 0 {
				problems.push(format!("layer '{name}': meta_size must be at least 1"));
			}
			if !matches!(layer.extension.as_str(), "png" | "jpeg") {
				problems.push(format!(
					"layer '{name}': unsupported extension '{}' (png or jpeg)",
					layer.extension
				));
			}
			for signature in [&layer.empty_tile_detection, &layer.empty_metatile_detection]
				.into_iter()
				.flatten()
			{
				if signature.hash.len() != 40 || !signature.hash.bytes().all(|b| b.is_ascii_hexdigit()) {
					problems.push(format!("layer '{name}': hash must be 40 hex characters"));
				}
			}
			for source in &layer.geometries {
				if let (Some(min), Some(max)) = (source.min_resolution, source.max_resolution) {
					if min > max {
						problems.push(format!(
							"layer '{name}': geometry min_resolution {min} exceeds max_resolution {max}"
						));
					}
				}
			}
		}

		if let Some(cache) = &self.generation.default_cache {
			if !self.caches.contains_key(cache) {
				problems.push(format!("generation: unknown default_cache '{cache}'"));
			}
		}
		for layer in &self.generation.default_layers {
			if !self.layers.contains_key(layer) {
				problems.push(format!("generation: unknown default layer '{layer}'"));
			}
		}
		if self.generation.maxconsecutive_errors == 0 {
			problems.push("generation: maxconsecutive_errors must be at least 1".to_string());
		}

		if problems.is_empty() {
			Ok(())
		} else {
			bail!("invalid configuration:\n  {}", problems.join("\n  "));
		}
	}

	pub fn layer(&self, name: &str) -> Result<&LayerConfig> {
		match self.layers.get(name) {
			Some(layer) => Ok(layer),
			None => bail!("unknown layer '{name}'"),
		}
	}

	pub fn cache(&self, name: &str) -> Result<&CacheConfig> {
		match self.caches.get(name) {
			Some(cache) => Ok(cache),
			None => bail!("unknown cache '{name}'"),
		}
	}
}

/// Merge the `layer_default` mapping under every layer; explicit layer
/// fields win. The key is removed afterwards so `deny_unknown_fields`
/// stays strict.
fn merge_layer_default(value: &mut Value) {
	let Some(root) = value.as_mapping_mut() else {
		return;
	};
	let Some(default) = root.remove("layer_default") else {
		return;
	};
	let Some(layers) = root.get_mut("layers").and_then(Value::as_mapping_mut) else {
		return;
	};
	for (_, layer) in layers.iter_mut() {
		merge_value(layer, &default);
	}
}

/// Recursively fill `target` with entries from `default` that it lacks.
fn merge_value(target: &mut Value, default: &Value) {
	if let (Value::Mapping(target), Value::Mapping(default)) = (target, default) {
		for (key, default_entry) in default {
			match target.get_mut(key) {
				Some(entry) => merge_value(entry, default_entry),
				None => {
					target.insert(key.clone(), default_entry.clone());
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	const CONFIG: &str = r#"
grids:
  swissgrid:
    resolutions: [100, 50, 25, 10, 5, 2.5, 1]
    bbox: [420000, 30000, 900000, 350000]
    srs: "EPSG:21781"

caches:
  local:
    type: filesystem
    folder: /tmp/tiles

layer_default:
  grid: swissgrid
  extension: png
  meta: true
  meta_size: 2
  meta_buffer: 128

layers:
  plan:
    type: wms
    url: http://wms.example.com/
  ortho:
    type: wms
    url: http://wms.example.com/
    extension: jpeg
    meta_buffer: 0

generation:
  default_cache: local
  maxconsecutive_errors: 10
"#;

	#[test]
	fn layer_default_merges_under_layers() {
		let config = Config::from_string(CONFIG).unwrap();
		let plan = config.layer("plan").unwrap();
		assert_eq!(plan.grid, "swissgrid");
		assert_eq!(plan.extension, "png");
		assert_eq!(plan.meta_size, 2);
		assert_eq!(plan.meta_buffer, 128);

		// explicit fields win over the default
		let ortho = config.layer("ortho").unwrap();
		assert_eq!(ortho.extension, "jpeg");
		assert_eq!(ortho.meta_buffer, 0);
		assert_eq!(ortho.meta_size, 2);
	}

	#[test]
	fn validation_collects_every_problem() {
		let text = r#"
layers:
  broken:
    type: wms
    url: http://wms.example.com/
    grid: missing
    extension: gif
    meta_size: 0
"#;
		let error = Config::from_string(text).unwrap_err().to_string();
		assert!(error.contains("unknown grid 'missing'"));
		assert!(error.contains("unsupported extension 'gif'"));
		assert!(error.contains("meta_size must be at least 1"));
	}

	#[test]
	fn unknown_fields_are_rejected() {
		assert!(Config::from_string("grdis: {}").is_err());
	}

	#[test]
	fn bad_hash_is_rejected() {
		let text = r#"
grids:
  g:
    resolutions: [10]
    bbox: [0, 0, 1000, 1000]
    srs: "EPSG:21781"
layers:
  l:
    type: wms
    url: http://wms.example.com/
    grid: g
    empty_tile_detection:
      size: 334
      hash: nothex
"#;
		let error = Config::from_string(text).unwrap_err().to_string();
		assert!(error.contains("40 hex characters"));
	}
}
