use super::Renderer;
use crate::config::LayerConfig;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tileforge_core::{Blob, Grid, Tile};

/// Renders tiles with WMS `GetMap` requests over HTTP.
pub struct WmsRenderer {
	client: Client,
	url: String,
	layers: String,
	srs: String,
	format: String,
	meta_buffer: u32,
	params: BTreeMap<String, String>,
	headers: BTreeMap<String, String>,
	grid: Arc<Grid>,
}

impl WmsRenderer {
	pub fn new(layer_name: &str, layer: &LayerConfig, srs: &str, grid: Arc<Grid>) -> Result<WmsRenderer> {
		let client = Client::builder()
			.timeout(Duration::from_secs(300))
			.build()
			.context("building http client")?;
		Ok(WmsRenderer {
			client,
			url: layer.url.clone(),
			layers: layer.layers.clone().unwrap_or_else(|| layer_name.to_string()),
			srs: srs.to_string(),
			format: layer.content_type(),
			meta_buffer: if layer.meta { layer.meta_buffer } else { 0 },
			params: layer.params.clone(),
			headers: layer.headers.clone(),
			grid,
		})
	}
}

#[async_trait]
impl Renderer for WmsRenderer {
	async fn fetch(&self, tile: &Tile) -> Result<Blob> {
		let coord = &tile.coord;
		let extent = self.grid.tile_extent(coord, self.meta_buffer)?;
		let size = coord.n * self.grid.tile_size() + 2 * self.meta_buffer;

		let mut query = vec![
			("SERVICE".to_string(), "WMS".to_string()),
			("VERSION".to_string(), "1.1.1".to_string()),
			("REQUEST".to_string(), "GetMap".to_string()),
			("FORMAT".to_string(), self.format.clone()),
			("TRANSPARENT".to_string(), (self.format == "image/png").to_string().to_uppercase()),
			("LAYERS".to_string(), self.layers.clone()),
			("STYLES".to_string(), String::new()),
			("SRS".to_string(), self.srs.clone()),
			(
				"BBOX".to_string(),
				format!("{},{},{},{}", extent[0], extent[1], extent[2], extent[3]),
			),
			("WIDTH".to_string(), size.to_string()),
			("HEIGHT".to_string(), size.to_string()),
		];
		for (key, value) in &self.params {
			query.push((key.clone(), value.clone()));
		}

		let mut request = self.client.get(&self.url).query(&query);
		for (key, value) in &self.headers {
			request = request.header(key, value);
		}

		let response = request
			.send()
			.await
			.with_context(|| format!("requesting {}", coord))?;
		let status = response.status();
		let content_type = response
			.headers()
			.get(reqwest::header::CONTENT_TYPE)
			.and_then(|value| value.to_str().ok())
			.unwrap_or_default()
			.to_string();
		let body = response
			.bytes()
			.await
			.with_context(|| format!("reading response for {}", coord))?;

		if !status.is_success() {
			bail!("server answered {status} for {coord}");
		}
		// WMS errors often come back as status 200 with an XML body
		if !content_type.starts_with("image/") {
			let text = String::from_utf8_lossy(&body);
			bail!(
				"server answered '{content_type}' instead of an image for {coord}: {}",
				text.chars().take(200).collect::<String>()
			);
		}
		Ok(Blob::from(body.as_ref()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tileforge_core::MatrixIdentifier;

	#[test]
	fn request_geometry() {
		let layer: LayerConfig = serde_yaml_ng::from_str(
			"type: wms\nurl: http://wms.example.com/\ngrid: g\nmeta: true\nmeta_size: 2\nmeta_buffer: 64",
		)
		.unwrap();
		let grid = Arc::new(
			Grid::new(
				256,
				[420000.0, 30000.0, 900000.0, 350000.0],
				&[100.0, 50.0],
				MatrixIdentifier::Zoom,
			)
			.unwrap(),
		);
		let renderer = WmsRenderer::new("plan", &layer, "EPSG:21781", grid.clone()).unwrap();
		assert_eq!(renderer.layers, "plan");
		assert_eq!(renderer.meta_buffer, 64);
		assert_eq!(renderer.format, "image/png");
	}
}
