use serde::Deserialize;
use std::collections::BTreeMap;

/// A rendered layer. Only WMS sources are built in; `type` stays in the
/// model so configurations naming another renderer fail loudly instead of
/// silently rendering over WMS.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LayerConfig {
	#[serde(rename = "type")]
	pub source_type: SourceType,

	/// WMS endpoint.
	pub url: String,

	/// WMS `LAYERS` parameter; defaults to the layer's own name.
	#[serde(default)]
	pub layers: Option<String>,

	/// Name of the grid this layer renders on.
	#[serde(default)]
	pub grid: String,

	#[serde(default = "default_extension")]
	pub extension: String,

	#[serde(default)]
	pub mime_type: Option<String>,

	#[serde(default = "default_style")]
	pub wmts_style: String,

	/// Render metatiles instead of single tiles.
	#[serde(default)]
	pub meta: bool,

	#[serde(default = "default_meta_size")]
	pub meta_size: u32,

	/// Pixel border rendered around the metatile and cropped away.
	#[serde(default)]
	pub meta_buffer: u32,

	/// Pixel buffer applied to tile footprints in the geometry filter.
	#[serde(default)]
	pub px_buffer: u32,

	/// Do not seed zoom levels finer than this resolution.
	#[serde(default)]
	pub min_resolution_seed: Option<f64>,

	/// Restrict generation to this map-unit extent.
	#[serde(default)]
	pub bbox: Option<[f64; 4]>,

	#[serde(default)]
	pub geometries: Vec<GeometrySourceConfig>,

	#[serde(default)]
	pub empty_tile_detection: Option<EmptySignatureConfig>,

	#[serde(default)]
	pub empty_metatile_detection: Option<EmptySignatureConfig>,

	/// WMTS dimensions, carried in tile metadata and cache paths.
	#[serde(default)]
	pub dimensions: Vec<DimensionConfig>,

	/// Extra WMS query parameters.
	#[serde(default)]
	pub params: BTreeMap<String, String>,

	/// Extra HTTP headers on render requests.
	#[serde(default)]
	pub headers: BTreeMap<String, String>,
}

fn default_extension() -> String {
	"png".to_string()
}

fn default_style() -> String {
	"default".to_string()
}

fn default_meta_size() -> u32 {
	1
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
	Wms,
}

impl LayerConfig {
	/// The effective metatile size: 1 unless metatiling is enabled.
	#[must_use]
	pub fn effective_meta_size(&self) -> u32 {
		if self.meta {
			self.meta_size
		} else {
			1
		}
	}

	#[must_use]
	pub fn content_type(&self) -> String {
		match &self.mime_type {
			Some(mime) => mime.clone(),
			None => format!("image/{}", self.extension),
		}
	}
}

/// A coverage geometry source: an extent active over a resolution range.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GeometrySourceConfig {
	pub bbox: [f64; 4],

	#[serde(default)]
	pub min_resolution: Option<f64>,

	#[serde(default)]
	pub max_resolution: Option<f64>,
}

/// Size and sha1 of a uniform (empty) image, for the dropper.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EmptySignatureConfig {
	pub size: usize,
	pub hash: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DimensionConfig {
	pub name: String,
	pub value: String,
}
