//! Builder for [`TileQuetMetadata`].
//!
//! The record is assembled in layers, later layers winning:
//!
//! 1. defaults (world bounds, `EPSG:4326`, zoom `0..=14`, `num_tiles = 0`, `quadbin` tiling)
//! 2. explicitly set optional fields
//! 3. `processing` provenance (source format, tool identity, UTC creation time)
//! 4. caller extensions, which may replace any field above
//! 5. the identity fields `file_format` and `version`, which nothing can replace

use super::{
	BOUNDS_CRS, DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM, FILE_FORMAT, FORMAT_VERSION, TileQuetMetadata, VectorLayer,
	WORLD_BOUNDS, created_by,
};
use crate::{Quadbin, TileFormat, TileQuetError, TileType};
use anyhow::{Context, Result, bail};
use serde_json::{Map, Value, json};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tilequet_derive::context;

#[derive(Clone, Debug)]
pub struct MetadataBuilder {
	tile_type: TileType,
	tile_format: TileFormat,
	bounds: Option<[f64; 4]>,
	center: Option<[f64; 3]>,
	min_zoom: Option<u8>,
	max_zoom: Option<u8>,
	num_tiles: Option<u64>,
	name: Option<String>,
	description: Option<String>,
	attribution: Option<String>,
	layers: Option<Vec<VectorLayer>>,
	source_format: Option<String>,
	extensions: Map<String, Value>,
}

impl MetadataBuilder {
	pub fn new(tile_type: TileType, tile_format: TileFormat) -> MetadataBuilder {
		MetadataBuilder {
			tile_type,
			tile_format,
			bounds: None,
			center: None,
			min_zoom: None,
			max_zoom: None,
			num_tiles: None,
			name: None,
			description: None,
			attribution: None,
			layers: None,
			source_format: None,
			extensions: Map::new(),
		}
	}

	/// `[west, south, east, north]` in EPSG:4326.
	pub fn bounds(mut self, bounds: [f64; 4]) -> Self {
		self.bounds = Some(bounds);
		self
	}

	/// `[longitude, latitude, zoom]`.
	pub fn center(mut self, center: [f64; 3]) -> Self {
		self.center = Some(center);
		self
	}

	pub fn min_zoom(mut self, min_zoom: u8) -> Self {
		self.min_zoom = Some(min_zoom);
		self
	}

	pub fn max_zoom(mut self, max_zoom: u8) -> Self {
		self.max_zoom = Some(max_zoom);
		self
	}

	pub fn num_tiles(mut self, num_tiles: u64) -> Self {
		self.num_tiles = Some(num_tiles);
		self
	}

	pub fn name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}

	pub fn description(mut self, description: impl Into<String>) -> Self {
		self.description = Some(description.into());
		self
	}

	pub fn attribution(mut self, attribution: impl Into<String>) -> Self {
		self.attribution = Some(attribution.into());
		self
	}

	pub fn layers(mut self, layers: Vec<VectorLayer>) -> Self {
		self.layers = Some(layers);
		self
	}

	/// Name of the format the tiles were converted from, e.g. `mbtiles`.
	pub fn source_format(mut self, source_format: impl Into<String>) -> Self {
		self.source_format = Some(source_format.into());
		self
	}

	/// Adds a free-form top-level field. Setting the same key twice keeps the last value.
	pub fn extension(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.extensions.insert(key.into(), value.into());
		self
	}

	#[context("building TileQuet metadata")]
	pub fn build(self) -> Result<TileQuetMetadata> {
		let mut record = Map::new();
		// identity first, so it leads the serialized document
		record.insert(String::from("file_format"), json!(FILE_FORMAT));
		record.insert(String::from("version"), json!(FORMAT_VERSION));

		record.insert(String::from("tile_type"), json!(self.tile_type));
		record.insert(String::from("tile_format"), json!(self.tile_format));
		record.insert(String::from("bounds"), json!(self.bounds.unwrap_or(WORLD_BOUNDS)));
		record.insert(String::from("bounds_crs"), json!(BOUNDS_CRS));
		if let Some(center) = self.center {
			record.insert(String::from("center"), json!(center));
		}
		record.insert(
			String::from("min_zoom"),
			json!(self.min_zoom.unwrap_or(DEFAULT_MIN_ZOOM)),
		);
		record.insert(
			String::from("max_zoom"),
			json!(self.max_zoom.unwrap_or(DEFAULT_MAX_ZOOM)),
		);
		record.insert(String::from("num_tiles"), json!(self.num_tiles.unwrap_or(0)));
		record.insert(String::from("tiling"), json!({ "scheme": Quadbin::SCHEME }));

		let optional = [
			("name", self.name),
			("description", self.description),
			("attribution", self.attribution),
		];
		for (key, value) in optional {
			if let Some(value) = value {
				record.insert(String::from(key), json!(value));
			}
		}
		if let Some(layers) = self.layers {
			record.insert(
				String::from("layers"),
				serde_json::to_value(layers).context("serializing vector layers")?,
			);
		}

		let mut processing = Map::new();
		if let Some(source_format) = self.source_format {
			processing.insert(String::from("source_format"), json!(source_format));
		}
		let created_at = OffsetDateTime::now_utc().format(&Rfc3339)?;
		processing.insert(String::from("created_by"), json!(created_by()));
		processing.insert(String::from("created_at"), json!(created_at));
		record.insert(String::from("processing"), Value::Object(processing));

		for (key, value) in self.extensions {
			if key == "file_format" || key == "version" {
				log::warn!("ignoring extension field '{key}': it cannot override the container identity");
				continue;
			}
			record.insert(key, value);
		}

		record.insert(String::from("file_format"), json!(FILE_FORMAT));
		record.insert(String::from("version"), json!(FORMAT_VERSION));

		let metadata = TileQuetMetadata::from_map(record);
		let checks = [
			("tile_type", metadata.tile_type().is_some()),
			("tile_format", metadata.tile_format().is_some()),
			("bounds", metadata.bounds().is_some()),
			("bounds_crs", metadata.bounds_crs().is_some()),
			("min_zoom", metadata.min_zoom().is_some()),
			("max_zoom", metadata.max_zoom().is_some()),
			("num_tiles", metadata.num_tiles().is_some()),
			("tiling.scheme", metadata.tiling_scheme().is_some()),
		];
		for (field, valid) in checks {
			if !valid {
				bail!(TileQuetError::Malformed(format!("field '{field}' is missing or has the wrong type")));
			}
		}

		if let (Some(min_zoom), Some(max_zoom)) = (metadata.min_zoom(), metadata.max_zoom()) {
			if min_zoom > max_zoom {
				bail!(TileQuetError::Malformed(format!(
					"min_zoom ({min_zoom}) must not exceed max_zoom ({max_zoom})"
				)));
			}
		}

		Ok(metadata)
	}
}
