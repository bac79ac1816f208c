//! Read one tile pyramid table of an OGC GeoPackage (SQLite).
//!
//! `gpkg_contents` lists the tile tables with their identifier, description and
//! extent; `gpkg_tile_matrix` lists the zoom levels of each table. Tile rows use
//! the same top-left origin as XYZ, so they are encoded without a flip. Extents in
//! EPSG:3857 are projected to longitude/latitude, other systems are kept as stored
//! with their `bounds_crs`.

use super::TileSource;
use anyhow::{Result, bail, ensure};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::{f64::consts::PI, path::Path};
use tilequet_core::{
	BOUNDS_CRS, Quadbin, TileCoord, TileFormat, TileIndexCodec, TileQuetError, TileQuetMetadata, TileRow,
};
use tilequet_derive::context;

const EARTH_RADIUS: f64 = 6_378_137.0;
const WEB_MERCATOR: i64 = 3857;
const WGS84: i64 = 4326;

pub struct GeoPackageSource {
	name: String,
	pool: Pool<SqliteConnectionManager>,
	table: String,
	identifier: Option<String>,
	description: Option<String>,
	extent: Option<[f64; 4]>,
	srs_id: Option<i64>,
	tile_format: TileFormat,
	min_zoom: u8,
	max_zoom: u8,
	num_tiles: u64,
}

impl GeoPackageSource {
	/// Opens `table`, or the first tile table listed in `gpkg_contents` if `None`.
	#[context("opening GeoPackage '{}'", path.display())]
	pub fn open(path: &Path, table: Option<&str>) -> Result<GeoPackageSource> {
		log::debug!("open {path:?}");
		if !path.exists() {
			bail!(TileQuetError::NotFound(format!("file {path:?} does not exist")));
		}

		let manager = SqliteConnectionManager::file(path);
		let pool = Pool::builder().max_size(1).build(manager)?;

		let tables = tile_tables(&pool)?;
		let table = match table {
			Some(table) if tables.iter().any(|known| known == table) => table.to_string(),
			Some(table) => bail!(TileQuetError::NotFound(format!(
				"tile table '{table}' not found, available: {}",
				tables.join(", ")
			))),
			None => match tables.first() {
				Some(table) => {
					log::info!("using tile table '{table}'");
					table.clone()
				}
				None => bail!(TileQuetError::NotFound(String::from("no tile tables in gpkg_contents"))),
			},
		};

		let mut source = GeoPackageSource {
			name: path.display().to_string(),
			pool,
			table,
			identifier: None,
			description: None,
			extent: None,
			srs_id: None,
			tile_format: TileFormat::Unknown,
			min_zoom: 0,
			max_zoom: 0,
			num_tiles: 0,
		};
		source.load_contents()?;
		source.load_tile_stats()?;
		source.tile_format = source.detect_format()?;
		Ok(source)
	}

	#[context("reading gpkg_contents of '{}'", self.name)]
	fn load_contents(&mut self) -> Result<()> {
		let conn = self.pool.get()?;
		let (identifier, description, min_x, min_y, max_x, max_y, srs_id) = conn.query_row(
			"SELECT identifier, description, min_x, min_y, max_x, max_y, srs_id FROM gpkg_contents WHERE table_name = ?1",
			[&self.table],
			|row| {
				Ok((
					row.get::<_, Option<String>>(0)?,
					row.get::<_, Option<String>>(1)?,
					row.get::<_, Option<f64>>(2)?,
					row.get::<_, Option<f64>>(3)?,
					row.get::<_, Option<f64>>(4)?,
					row.get::<_, Option<f64>>(5)?,
					row.get::<_, Option<i64>>(6)?,
				))
			},
		)?;
		self.identifier = identifier;
		self.description = description.filter(|description| !description.is_empty());
		if let (Some(min_x), Some(min_y), Some(max_x), Some(max_y)) = (min_x, min_y, max_x, max_y) {
			self.extent = Some([min_x, min_y, max_x, max_y]);
		}
		self.srs_id = srs_id;

		let levels: Vec<u8> = conn
			.prepare("SELECT zoom_level FROM gpkg_tile_matrix WHERE table_name = ?1 ORDER BY zoom_level")?
			.query_map([&self.table], |row| row.get(0))?
			.collect::<Result<_, _>>()?;
		log::debug!("tile matrix of '{}' has zoom levels {levels:?}", self.table);
		if srs_id.is_some_and(|srs_id| srs_id != WEB_MERCATOR && srs_id != WGS84) {
			log::warn!(
				"'{}' uses srs_id {}, tiles are read as a web mercator pyramid",
				self.table,
				srs_id.unwrap_or_default()
			);
		}
		Ok(())
	}

	#[context("scanning tile table '{}'", self.table)]
	fn load_tile_stats(&mut self) -> Result<()> {
		let conn = self.pool.get()?;
		let (count, min_zoom, max_zoom) = conn.query_row(
			&format!(
				"SELECT COUNT(*), MIN(zoom_level), MAX(zoom_level) FROM {}",
				quote_identifier(&self.table)
			),
			[],
			|row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<u8>>(1)?, row.get::<_, Option<u8>>(2)?)),
		)?;
		let (Some(min_zoom), Some(max_zoom)) = (min_zoom, max_zoom) else {
			bail!(TileQuetError::NotFound(format!("no tiles in table '{}'", self.table)));
		};
		self.num_tiles = count as u64;
		self.min_zoom = min_zoom;
		self.max_zoom = max_zoom;
		log::debug!("{count} tiles in zoom levels {min_zoom}..={max_zoom}");
		Ok(())
	}

	/// GeoPackage does not name the payload format; it is sniffed from the first tile.
	fn detect_format(&self) -> Result<TileFormat> {
		let conn = self.pool.get()?;
		let data: Vec<u8> = conn.query_row(
			&format!("SELECT tile_data FROM {} LIMIT 1", quote_identifier(&self.table)),
			[],
			|row| row.get(0),
		)?;
		Ok(TileFormat::detect(&data))
	}

	/// The extent as `[west, south, east, north]` and the CRS it is expressed in.
	fn bounds(&self) -> Option<([f64; 4], String)> {
		let extent = self.extent?;
		Some(match self.srs_id {
			Some(WEB_MERCATOR) => {
				let (west, south) = mercator_to_lon_lat(extent[0], extent[1]);
				let (east, north) = mercator_to_lon_lat(extent[2], extent[3]);
				([west, south, east, north], String::from(BOUNDS_CRS))
			}
			Some(WGS84) | None => (extent, String::from(BOUNDS_CRS)),
			Some(srs_id) => (extent, format!("EPSG:{srs_id}")),
		})
	}
}

impl TileSource for GeoPackageSource {
	fn source_format(&self) -> &str {
		"geopackage"
	}

	#[context("deriving metadata from '{}'", self.name)]
	fn metadata(&self) -> Result<TileQuetMetadata> {
		let mut builder = TileQuetMetadata::builder(self.tile_format.tile_type(), self.tile_format)
			.min_zoom(self.min_zoom)
			.max_zoom(self.max_zoom)
			.num_tiles(self.num_tiles)
			.name(self.identifier.clone().unwrap_or_else(|| self.table.clone()))
			.source_format(self.source_format());
		if let Some((bounds, crs)) = self.bounds() {
			let center = [(bounds[0] + bounds[2]) / 2.0, (bounds[1] + bounds[3]) / 2.0, f64::from(self.min_zoom)];
			builder = builder.bounds(bounds).center(center).extension("bounds_crs", crs);
		}
		if let Some(description) = &self.description {
			builder = builder.description(description.clone());
		}
		builder.build()
	}

	#[context("reading tiles from table '{}'", self.table)]
	fn for_each_tile(&mut self, callback: &mut dyn FnMut(TileRow) -> Result<()>) -> Result<()> {
		let conn = self.pool.get()?;
		let mut stmt = conn.prepare(&format!(
			"SELECT zoom_level, tile_column, tile_row, tile_data FROM {}",
			quote_identifier(&self.table)
		))?;
		let mut rows = stmt.query([])?;
		let mut count = 0u64;
		while let Some(row) = rows.next()? {
			let coord = TileCoord::new(row.get(0)?, row.get(1)?, row.get(2)?)?;
			let id = Quadbin.encode(&coord)?;
			ensure!(id != 0, "tile {coord} encodes to the reserved id 0");
			callback(TileRow::new(id, row.get::<_, Vec<u8>>(3)?))?;

			count += 1;
			if count % 100_000 == 0 {
				log::debug!("read {count} of {} tiles", self.num_tiles);
			}
		}
		log::debug!("read {count} tiles");
		Ok(())
	}
}

impl std::fmt::Debug for GeoPackageSource {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("GeoPackageSource")
			.field("name", &self.name)
			.field("table", &self.table)
			.field("tile_format", &self.tile_format)
			.field("num_tiles", &self.num_tiles)
			.finish()
	}
}

fn tile_tables(pool: &Pool<SqliteConnectionManager>) -> Result<Vec<String>> {
	let conn = pool.get()?;
	let tables = conn
		.prepare("SELECT table_name FROM gpkg_contents WHERE data_type = 'tiles' ORDER BY rowid")?
		.query_map([], |row| row.get(0))?
		.collect::<Result<_, _>>()?;
	Ok(tables)
}

fn quote_identifier(name: &str) -> String {
	format!("\"{}\"", name.replace('"', "\"\""))
}

fn mercator_to_lon_lat(x: f64, y: f64) -> (f64, f64) {
	let lon = (x / EARTH_RADIUS).to_degrees();
	let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
	(lon, lat)
}

#[cfg(test)]
mod tests {
	use super::*;
	use assert_fs::NamedTempFile;
	use pretty_assertions::assert_eq;
	use r2d2_sqlite::rusqlite::{Connection, params};
	use tilequet_core::TileType;

	const PNG: &[u8] = b"\x89PNG\r\n\x1a\n....";

	/// Creates a GeoPackage with one tile table per `(name, identifier, srs_id, extent)`;
	/// every table gets the tiles `(level, column, row)`.
	fn make_geopackage(path: &Path, tables: &[(&str, &str, i64, [f64; 4])], tiles: &[(u8, u32, u32)]) {
		let conn = Connection::open(path).unwrap();
		conn.execute_batch(
			"CREATE TABLE gpkg_contents (
				table_name TEXT NOT NULL PRIMARY KEY, data_type TEXT NOT NULL, identifier TEXT,
				description TEXT DEFAULT '', min_x DOUBLE, min_y DOUBLE, max_x DOUBLE, max_y DOUBLE, srs_id INTEGER);
			CREATE TABLE gpkg_tile_matrix (
				table_name TEXT NOT NULL, zoom_level INTEGER NOT NULL, matrix_width INTEGER NOT NULL,
				matrix_height INTEGER NOT NULL, tile_width INTEGER NOT NULL, tile_height INTEGER NOT NULL,
				pixel_x_size DOUBLE NOT NULL, pixel_y_size DOUBLE NOT NULL);
			INSERT INTO gpkg_contents (table_name, data_type, identifier) VALUES ('roads', 'features', 'Roads');",
		)
		.unwrap();
		for (name, identifier, srs_id, [min_x, min_y, max_x, max_y]) in tables {
			conn.execute(
				"INSERT INTO gpkg_contents (table_name, data_type, identifier, description, min_x, min_y, max_x, max_y, srs_id)
				VALUES (?1, 'tiles', ?2, 'test tiles', ?3, ?4, ?5, ?6, ?7)",
				params![name, identifier, min_x, min_y, max_x, max_y, srs_id],
			)
			.unwrap();
			conn.execute_batch(&format!(
				"CREATE TABLE {name} (id INTEGER PRIMARY KEY AUTOINCREMENT, zoom_level INTEGER NOT NULL,
				tile_column INTEGER NOT NULL, tile_row INTEGER NOT NULL, tile_data BLOB NOT NULL);"
			))
			.unwrap();
			for level in 0..=2u8 {
				let size = 1u32 << level;
				conn.execute(
					"INSERT INTO gpkg_tile_matrix VALUES (?1, ?2, ?3, ?3, 256, 256, 1.0, 1.0)",
					params![name, level, size],
				)
				.unwrap();
			}
			for (level, column, row) in tiles {
				conn.execute(
					&format!("INSERT INTO {name} (zoom_level, tile_column, tile_row, tile_data) VALUES (?1, ?2, ?3, ?4)"),
					params![level, column, row, PNG],
				)
				.unwrap();
			}
		}
	}

	fn collect(source: &mut GeoPackageSource) -> Vec<u64> {
		let mut ids = Vec::new();
		source
			.for_each_tile(&mut |row| {
				assert_eq!(row.payload.as_slice(), PNG);
				ids.push(row.id);
				Ok(())
			})
			.unwrap();
		ids.sort_unstable();
		ids
	}

	#[test]
	fn metadata_from_contents() {
		let file = NamedTempFile::new("sample.gpkg").unwrap();
		make_geopackage(
			file.path(),
			&[("test_tiles", "Test GPKG", 4326, [-180.0, -85.0, 180.0, 85.0])],
			&[(0, 0, 0), (1, 0, 0), (2, 3, 1)],
		);

		let source = GeoPackageSource::open(file.path(), None).unwrap();
		let metadata = source.metadata().unwrap();
		assert_eq!(metadata.tile_type(), Some(TileType::Raster));
		assert_eq!(metadata.tile_format(), Some(TileFormat::Png));
		assert_eq!((metadata.min_zoom(), metadata.max_zoom()), (Some(0), Some(2)));
		assert_eq!(metadata.num_tiles(), Some(3));
		assert_eq!(metadata.name(), Some("Test GPKG"));
		assert_eq!(metadata.description(), Some("test tiles"));
		assert_eq!(metadata.bounds(), Some([-180.0, -85.0, 180.0, 85.0]));
		assert_eq!(metadata.bounds_crs(), Some("EPSG:4326"));
		assert_eq!(metadata.center(), Some([0.0, 0.0, 0.0]));
		assert_eq!(metadata.processing().unwrap().source_format.as_deref(), Some("geopackage"));
	}

	#[test]
	fn rows_are_not_flipped() {
		let file = NamedTempFile::new("rows.gpkg").unwrap();
		make_geopackage(
			file.path(),
			&[("test_tiles", "Test GPKG", 4326, [-180.0, -85.0, 180.0, 85.0])],
			&[(0, 0, 0), (1, 0, 1), (2, 3, 1)],
		);

		let mut source = GeoPackageSource::open(file.path(), None).unwrap();
		let mut expected: Vec<u64> = [(0, 0, 0), (1, 0, 1), (2, 3, 1)]
			.into_iter()
			.map(|(level, x, y)| Quadbin.encode(&TileCoord::new(level, x, y).unwrap()).unwrap())
			.collect();
		expected.sort_unstable();
		assert_eq!(collect(&mut source), expected);
	}

	#[test]
	fn table_selection() {
		let file = NamedTempFile::new("tables.gpkg").unwrap();
		let extent = [-20037508.342789244, -20037508.342789244, 20037508.342789244, 20037508.342789244];
		make_geopackage(
			file.path(),
			&[("first", "First", 3857, extent), ("second", "Second", 3857, extent)],
			&[(1, 1, 1)],
		);

		let source = GeoPackageSource::open(file.path(), None).unwrap();
		assert_eq!(source.metadata().unwrap().name(), Some("First"));

		let source = GeoPackageSource::open(file.path(), Some("second")).unwrap();
		let metadata = source.metadata().unwrap();
		assert_eq!(metadata.name(), Some("Second"));
		let [west, south, east, north] = metadata.bounds().unwrap();
		assert!((west + 180.0).abs() < 1e-9 && (east - 180.0).abs() < 1e-9);
		assert!((south + 85.0511287798).abs() < 1e-6 && (north - 85.0511287798).abs() < 1e-6);
		assert_eq!(metadata.bounds_crs(), Some("EPSG:4326"));

		let err = GeoPackageSource::open(file.path(), Some("roads")).unwrap_err();
		assert!(matches!(
			TileQuetError::classify(&err),
			Some(TileQuetError::NotFound(_))
		));
		assert!(format!("{err:#}").contains("available: first, second"));
	}

	#[test]
	fn other_reference_systems_keep_their_extent() {
		let file = NamedTempFile::new("utm.gpkg").unwrap();
		make_geopackage(
			file.path(),
			&[("utm", "UTM", 25833, [368000.0, 5804000.0, 416000.0, 5834000.0])],
			&[(0, 0, 0)],
		);
		let metadata = GeoPackageSource::open(file.path(), None).unwrap().metadata().unwrap();
		assert_eq!(metadata.bounds(), Some([368000.0, 5804000.0, 416000.0, 5834000.0]));
		assert_eq!(metadata.bounds_crs(), Some("EPSG:25833"));
	}

	#[test]
	fn without_tile_tables() {
		let file = NamedTempFile::new("empty.gpkg").unwrap();
		make_geopackage(file.path(), &[], &[]);
		let err = GeoPackageSource::open(file.path(), None).unwrap_err();
		assert!(matches!(
			TileQuetError::classify(&err),
			Some(TileQuetError::NotFound(_))
		));

		let file = NamedTempFile::new("no_tiles.gpkg").unwrap();
		make_geopackage(file.path(), &[("test_tiles", "Empty", 4326, [0.0, 0.0, 1.0, 1.0])], &[]);
		let err = GeoPackageSource::open(file.path(), None).unwrap_err();
		assert!(format!("{err:#}").contains("no tiles in table 'test_tiles'"));
	}

	#[test]
	fn identifiers_are_quoted() {
		assert_eq!(quote_identifier("tiles"), "\"tiles\"");
		assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
	}
}
