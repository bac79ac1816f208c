//! Read tiles and metadata from an MBTiles (SQLite) database.
//!
//! The `metadata` table provides `format`, `bounds`, `center`, `name`, `description`,
//! `attribution` and the `vector_layers` inside `json`. The zoom range and tile count
//! are taken from the `tiles` table itself. Tile rows are stored in TMS order and are
//! flipped to XYZ before they are encoded as quadbin ids.

use super::TileSource;
use anyhow::{Context, Result, bail, ensure};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use serde_json::Value;
use std::{collections::BTreeMap, path::Path};
use tilequet_core::{
	Quadbin, TileCoord, TileFormat, TileIndexCodec, TileJson, TileQuetError, TileQuetMetadata, TileRow, VectorLayer,
};
use tilequet_derive::context;

pub struct MBTilesSource {
	name: String,
	pool: Pool<SqliteConnectionManager>,
	entries: BTreeMap<String, String>,
	tile_format: TileFormat,
	min_zoom: u8,
	max_zoom: u8,
	num_tiles: u64,
}

impl MBTilesSource {
	#[context("opening MBTiles '{}'", path.display())]
	pub fn open(path: &Path) -> Result<MBTilesSource> {
		log::debug!("open {path:?}");
		if !path.exists() {
			bail!(TileQuetError::NotFound(format!("file {path:?} does not exist")));
		}

		let manager = SqliteConnectionManager::file(path);
		let pool = Pool::builder().max_size(1).build(manager)?;

		let mut source = MBTilesSource {
			name: path.display().to_string(),
			pool,
			entries: BTreeMap::new(),
			tile_format: TileFormat::Unknown,
			min_zoom: 0,
			max_zoom: 0,
			num_tiles: 0,
		};
		source.load_entries()?;
		source.load_tile_stats()?;
		source.tile_format = source.detect_format()?;
		Ok(source)
	}

	#[context("reading the metadata table of '{}'", self.name)]
	fn load_entries(&mut self) -> Result<()> {
		let conn = self.pool.get()?;
		let mut stmt = conn.prepare("SELECT name, value FROM metadata")?;
		let entries = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
		for entry in entries {
			let (name, value) = entry?;
			self.entries.insert(name, value);
		}
		log::trace!("metadata keys: {:?}", self.entries.keys().collect::<Vec<_>>());
		Ok(())
	}

	#[context("scanning the tiles table of '{}'", self.name)]
	fn load_tile_stats(&mut self) -> Result<()> {
		let conn = self.pool.get()?;
		let (count, min_zoom, max_zoom) = conn.query_row(
			"SELECT COUNT(*), MIN(zoom_level), MAX(zoom_level) FROM tiles",
			[],
			|row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<u8>>(1)?, row.get::<_, Option<u8>>(2)?)),
		)?;
		let (Some(min_zoom), Some(max_zoom)) = (min_zoom, max_zoom) else {
			bail!(TileQuetError::NotFound(format!("no tiles in '{}'", self.name)));
		};
		self.num_tiles = count as u64;
		self.min_zoom = min_zoom;
		self.max_zoom = max_zoom;
		log::debug!("{count} tiles in zoom levels {min_zoom}..={max_zoom}");
		Ok(())
	}

	/// Uses the `format` entry, or sniffs the first tile if there is none or it is not
	/// a known format name.
	fn detect_format(&self) -> Result<TileFormat> {
		match self.entries.get("format").map(|format| TileFormat::try_from(format.as_str())) {
			Some(Ok(format)) => return Ok(format),
			Some(Err(err)) => log::warn!("'{}': {err}", self.name),
			None => log::warn!("'{}' does not declare a format", self.name),
		}
		let conn = self.pool.get()?;
		let data: Vec<u8> = conn.query_row("SELECT tile_data FROM tiles LIMIT 1", [], |row| row.get(0))?;
		let format = TileFormat::detect(&data);
		log::warn!("guessed format '{format}' from the first tile of '{}'", self.name);
		Ok(format)
	}

	fn entry(&self, key: &str) -> Option<String> {
		self.entries.get(key).cloned()
	}

	fn numbers<const N: usize>(&self, key: &str) -> Result<Option<[f64; N]>> {
		let Some(value) = self.entries.get(key) else {
			return Ok(None);
		};
		let numbers = value
			.split(',')
			.map(|part| part.trim().parse::<f64>())
			.collect::<Result<Vec<f64>, _>>()
			.with_context(|| format!("parsing '{key}' = '{value}'"))?;
		let numbers: [f64; N] = numbers
			.try_into()
			.map_err(|numbers: Vec<f64>| anyhow::anyhow!("'{key}' needs {N} numbers, found {}", numbers.len()))?;
		Ok(Some(numbers))
	}

	fn vector_layers(&self) -> Result<Option<Vec<VectorLayer>>> {
		let Some(json) = self.entries.get("json") else {
			return Ok(None);
		};
		let object: Value = serde_json::from_str(json).map_err(TileQuetError::Parse)?;
		let Some(layers) = object.get("vector_layers") else {
			return Ok(None);
		};
		let layers = serde_json::from_value(layers.clone()).context("parsing 'vector_layers'")?;
		Ok(Some(layers))
	}
}

impl TileSource for MBTilesSource {
	fn source_format(&self) -> &str {
		"mbtiles"
	}

	#[context("deriving metadata from '{}'", self.name)]
	fn metadata(&self) -> Result<TileQuetMetadata> {
		let bounds = self.numbers::<4>("bounds")?;
		let center = self.numbers::<3>("center")?;
		let layers = self.vector_layers()?;

		let mut tilejson = TileJson::new(self.min_zoom, self.max_zoom)
			.center(center)
			.name(self.entry("name"))
			.description(self.entry("description"))
			.attribution(self.entry("attribution"))
			.vector_layers(layers.clone());
		if let Some(bounds) = bounds {
			tilejson = tilejson.bounds(bounds);
		}

		let mut builder = TileQuetMetadata::builder(self.tile_format.tile_type(), self.tile_format)
			.min_zoom(self.min_zoom)
			.max_zoom(self.max_zoom)
			.num_tiles(self.num_tiles)
			.source_format(self.source_format())
			.extension("tilejson", tilejson.to_value()?);
		if let Some(bounds) = bounds {
			builder = builder.bounds(bounds);
		}
		if let Some(center) = center {
			builder = builder.center(center);
		}
		if let Some(name) = self.entry("name") {
			builder = builder.name(name);
		}
		if let Some(description) = self.entry("description") {
			builder = builder.description(description);
		}
		if let Some(attribution) = self.entry("attribution") {
			builder = builder.attribution(attribution);
		}
		if let Some(layers) = layers {
			builder = builder.layers(layers);
		}
		builder.build()
	}

	#[context("reading tiles from '{}'", self.name)]
	fn for_each_tile(&mut self, callback: &mut dyn FnMut(TileRow) -> Result<()>) -> Result<()> {
		let conn = self.pool.get()?;
		let mut stmt = conn.prepare("SELECT zoom_level, tile_column, tile_row, tile_data FROM tiles")?;
		let mut rows = stmt.query([])?;
		let mut count = 0u64;
		while let Some(row) = rows.next()? {
			let level: u8 = row.get(0)?;
			let x: u32 = row.get(1)?;
			let tms_y: u32 = row.get(2)?;
			let data: Vec<u8> = row.get(3)?;

			let coord = TileCoord::from_tms(level, x, tms_y)?;
			let id = Quadbin.encode(&coord)?;
			ensure!(id != 0, "tile {coord} encodes to the reserved id 0");
			callback(TileRow::new(id, data))?;

			count += 1;
			if count % 100_000 == 0 {
				log::debug!("read {count} of {} tiles", self.num_tiles);
			}
		}
		log::debug!("read {count} tiles");
		Ok(())
	}
}

impl std::fmt::Debug for MBTilesSource {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MBTilesSource")
			.field("name", &self.name)
			.field("tile_format", &self.tile_format)
			.field("num_tiles", &self.num_tiles)
			.finish()
	}
}
