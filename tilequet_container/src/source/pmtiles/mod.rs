//! Read tiles and metadata from a PMTiles v3 archive.
//!
//! The header supplies the tile type, zoom range, bounds and center. The JSON
//! metadata section supplies `name`, `description`, `attribution` and
//! `vector_layers`. Directories are walked depth first; tile ids are Hilbert
//! positions and are re-encoded as quadbin ids. Payloads are passed on as stored,
//! including any tile compression.

mod directory;
mod header;
mod tile_id;

use super::TileSource;
use anyhow::{Context, Result, bail, ensure};
use directory::{Entry, parse_entries};
use flate2::read::GzDecoder;
use header::{ByteRange, HEADER_LENGTH, Header, PMTilesCompression};
use serde_json::{Map, Value};
use std::{
	fs::File,
	io::{Read, Seek, SeekFrom},
	path::{Path, PathBuf},
};
use tilequet_core::{Quadbin, TileFormat, TileIndexCodec, TileJson, TileQuetError, TileQuetMetadata, TileRow, VectorLayer};
use tilequet_derive::context;
use tile_id::tile_id_to_coord;

/// Leaf directories nested deeper than this are treated as a corrupt archive.
const MAX_DIRECTORY_DEPTH: usize = 8;

pub struct PMTilesSource {
	name: String,
	path: PathBuf,
	header: Header,
	json: Map<String, Value>,
	root: Vec<u8>,
	tile_format: TileFormat,
}

impl PMTilesSource {
	#[context("opening PMTiles '{}'", path.display())]
	pub fn open(path: &Path) -> Result<PMTilesSource> {
		log::debug!("open {path:?}");
		if !path.exists() {
			bail!(TileQuetError::NotFound(format!("file {path:?} does not exist")));
		}
		let mut file = File::open(path).map_err(TileQuetError::Io)?;

		let header = Header::deserialize(&read_range(&mut file, &ByteRange::new(0, HEADER_LENGTH))?)?;
		log::trace!("header: {header:?}");

		let json = if header.metadata.length == 0 {
			Map::new()
		} else {
			let bytes = decompress(read_range(&mut file, &header.metadata)?, header.internal_compression)?;
			match serde_json::from_slice(&bytes).map_err(TileQuetError::Parse)? {
				Value::Object(json) => json,
				_ => bail!(TileQuetError::Malformed(String::from(
					"the metadata section is not a JSON object"
				))),
			}
		};
		let root = decompress(read_range(&mut file, &header.root_dir)?, header.internal_compression)?;

		let mut source = PMTilesSource {
			name: path.display().to_string(),
			path: path.to_path_buf(),
			header,
			json,
			root,
			tile_format: TileFormat::Unknown,
		};
		source.tile_format = match source.header.tile_format() {
			Some(format) => format,
			None => source.sniff_format(&mut file)?,
		};
		log::debug!(
			"{} addressed tiles in zoom levels {}..={}, format {}",
			source.header.addressed_tiles_count,
			source.header.min_zoom,
			source.header.max_zoom,
			source.tile_format
		);
		Ok(source)
	}

	/// Guesses the format from the first tile of the archive.
	fn sniff_format(&self, file: &mut File) -> Result<TileFormat> {
		let mut entries = parse_entries(&self.root)?;
		for _ in 0..=MAX_DIRECTORY_DEPTH {
			let Some(entry) = entries.first() else {
				bail!(TileQuetError::NotFound(format!("no tiles in '{}'", self.name)));
			};
			if !entry.is_leaf() {
				let data = read_range(file, &entry.range.within(&self.header.tile_data))?;
				let format = TileFormat::detect(&data);
				log::warn!(
					"'{}' has tile type {}, guessed '{format}' from the first tile",
					self.name,
					self.header.tile_type
				);
				return Ok(format);
			}
			entries = self.leaf_entries(file, entry)?;
		}
		bail!(TileQuetError::Malformed(String::from("leaf directories are nested too deeply")))
	}

	fn leaf_entries(&self, file: &mut File, entry: &Entry) -> Result<Vec<Entry>> {
		let bytes = read_range(file, &entry.range.within(&self.header.leaf_dirs))?;
		parse_entries(&decompress(bytes, self.header.internal_compression)?)
	}

	fn visit(
		&self,
		file: &mut File,
		entries: Vec<Entry>,
		depth: usize,
		count: &mut u64,
		callback: &mut dyn FnMut(TileRow) -> Result<()>,
	) -> Result<()> {
		if depth > MAX_DIRECTORY_DEPTH {
			bail!(TileQuetError::Malformed(String::from("leaf directories are nested too deeply")));
		}
		for entry in entries {
			if entry.range.length == 0 {
				continue;
			}
			if entry.is_leaf() {
				let leaf = self.leaf_entries(file, &entry)?;
				self.visit(file, leaf, depth + 1, count, callback)?;
				continue;
			}

			let data = read_range(file, &entry.range.within(&self.header.tile_data))?;
			for offset in 0..u64::from(entry.run_length) {
				let coord = tile_id_to_coord(entry.tile_id + offset)?;
				let id = Quadbin.encode(&coord)?;
				ensure!(id != 0, "tile {coord} encodes to the reserved id 0");
				callback(TileRow::new(id, data.clone()))?;

				*count += 1;
				if *count % 100_000 == 0 {
					log::debug!("read {count} of {} tiles", self.header.addressed_tiles_count);
				}
			}
		}
		Ok(())
	}

	fn text(&self, key: &str) -> Option<String> {
		self.json.get(key)?.as_str().map(String::from)
	}

	fn vector_layers(&self) -> Result<Option<Vec<VectorLayer>>> {
		let Some(layers) = self.json.get("vector_layers") else {
			return Ok(None);
		};
		let layers = serde_json::from_value(layers.clone()).context("parsing 'vector_layers'")?;
		Ok(Some(layers))
	}
}

impl TileSource for PMTilesSource {
	fn source_format(&self) -> &str {
		"pmtiles"
	}

	#[context("deriving metadata from '{}'", self.name)]
	fn metadata(&self) -> Result<TileQuetMetadata> {
		let (min_zoom, max_zoom) = (self.header.min_zoom, self.header.max_zoom);
		let bounds = self.header.bounds();
		let center = self.header.center();
		let layers = match self.tile_format {
			TileFormat::Pbf => self.vector_layers()?,
			_ => None,
		};

		let tilejson = TileJson::new(min_zoom, max_zoom)
			.bounds(bounds)
			.center(Some(center))
			.name(self.text("name"))
			.description(self.text("description"))
			.attribution(self.text("attribution"))
			.vector_layers(layers.clone());

		let mut builder = TileQuetMetadata::builder(self.tile_format.tile_type(), self.tile_format)
			.bounds(bounds)
			.center(center)
			.min_zoom(min_zoom)
			.max_zoom(max_zoom)
			.num_tiles(self.header.addressed_tiles_count)
			.source_format(self.source_format())
			.extension("tilejson", tilejson.to_value()?);
		if let Some(name) = self.text("name") {
			builder = builder.name(name);
		}
		if let Some(description) = self.text("description") {
			builder = builder.description(description);
		}
		if let Some(attribution) = self.text("attribution") {
			builder = builder.attribution(attribution);
		}
		if let Some(layers) = layers {
			builder = builder.layers(layers);
		}
		builder.build()
	}

	#[context("reading tiles from '{}'", self.name)]
	fn for_each_tile(&mut self, callback: &mut dyn FnMut(TileRow) -> Result<()>) -> Result<()> {
		let mut file = File::open(&self.path).map_err(TileQuetError::Io)?;
		let mut count = 0u64;
		self.visit(&mut file, parse_entries(&self.root)?, 0, &mut count, callback)?;
		log::debug!("read {count} tiles");
		Ok(())
	}
}

impl std::fmt::Debug for PMTilesSource {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PMTilesSource")
			.field("name", &self.name)
			.field("tile_format", &self.tile_format)
			.field("addressed_tiles", &self.header.addressed_tiles_count)
			.finish()
	}
}

fn read_range(file: &mut File, range: &ByteRange) -> Result<Vec<u8>> {
	let length = usize::try_from(range.length)
		.map_err(|_| TileQuetError::Malformed(format!("section of {} bytes is too large", range.length)))?;
	let mut buffer = vec![0; length];
	file.seek(SeekFrom::Start(range.offset)).map_err(TileQuetError::Io)?;
	if let Err(err) = file.read_exact(&mut buffer) {
		bail!(TileQuetError::Malformed(format!(
			"cannot read {} bytes at offset {}: {err}",
			range.length, range.offset
		)));
	}
	Ok(buffer)
}

fn decompress(data: Vec<u8>, compression: PMTilesCompression) -> Result<Vec<u8>> {
	match compression {
		PMTilesCompression::None => Ok(data),
		PMTilesCompression::Gzip => {
			let mut result = Vec::new();
			GzDecoder::new(data.as_slice())
				.read_to_end(&mut result)
				.map_err(|err| TileQuetError::Malformed(format!("cannot gunzip a directory: {err}")))?;
			Ok(result)
		}
		other => bail!(TileQuetError::Malformed(format!(
			"internal compression {other:?} is not supported"
		))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use assert_fs::NamedTempFile;
	use flate2::{Compression, write::GzEncoder};
	use pretty_assertions::assert_eq;
	use serde_json::json;
	use std::io::Write;
	use tilequet_core::{TileCoord, TileType};

	const PNG_A: &[u8] = b"\x89PNG\r\n\x1a\nA";
	const PNG_B: &[u8] = b"\x89PNG\r\n\x1a\nBB";

	fn gzip(data: &[u8]) -> Vec<u8> {
		let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
		encoder.write_all(data).unwrap();
		encoder.finish().unwrap()
	}

	fn entry(tile_id: u64, run_length: u32, offset: u64, length: u64) -> Entry {
		Entry {
			tile_id,
			run_length,
			range: ByteRange::new(offset, length),
		}
	}

	/// Lays out header, root directory, metadata, leaf directories and tile data.
	fn write_archive(
		path: &Path,
		mut header: Header,
		root: &[Entry],
		leaves: &[Entry],
		metadata: &Value,
		tile_data: &[u8],
	) {
		let compress = |data: Vec<u8>| match header.internal_compression {
			PMTilesCompression::Gzip => gzip(&data),
			_ => data,
		};
		let root = compress(directory::serialize_entries(root));
		let metadata = compress(serde_json::to_vec(metadata).unwrap());
		let leaves = if leaves.is_empty() {
			Vec::new()
		} else {
			compress(directory::serialize_entries(leaves))
		};

		header.root_dir = ByteRange::new(HEADER_LENGTH, root.len() as u64);
		header.metadata = ByteRange::new(header.root_dir.offset + header.root_dir.length, metadata.len() as u64);
		header.leaf_dirs = ByteRange::new(header.metadata.offset + header.metadata.length, leaves.len() as u64);
		header.tile_data = ByteRange::new(header.leaf_dirs.offset + header.leaf_dirs.length, tile_data.len() as u64);

		let mut bytes = header.serialize();
		bytes.extend(root);
		bytes.extend(metadata);
		bytes.extend(leaves);
		bytes.extend_from_slice(tile_data);
		std::fs::write(path, bytes).unwrap();
	}

	fn quadbin(level: u8, x: u32, y: u32) -> u64 {
		Quadbin.encode(&TileCoord::new(level, x, y).unwrap()).unwrap()
	}

	fn collect(source: &mut PMTilesSource) -> Vec<TileRow> {
		let mut rows = Vec::new();
		source
			.for_each_tile(&mut |row| {
				rows.push(row);
				Ok(())
			})
			.unwrap();
		rows.sort_by_key(|row| row.id);
		rows
	}

	fn pyramid(path: &Path) {
		// tile 0 is level 0, tiles 1..=4 are the level-1 quadrants sharing one payload
		let tiles = [PNG_A, PNG_B].concat();
		write_archive(
			path,
			header::example_header(),
			&[entry(0, 1, 0, PNG_A.len() as u64), entry(1, 4, PNG_A.len() as u64, PNG_B.len() as u64)],
			&[],
			&json!({ "name": "Pyramid", "attribution": "© test", "vector_layers": [{ "id": "ignored" }] }),
			&tiles,
		);
	}

	#[test]
	fn metadata_from_header_and_json() {
		let file = NamedTempFile::new("pyramid.pmtiles").unwrap();
		pyramid(file.path());

		let source = PMTilesSource::open(file.path()).unwrap();
		let metadata = source.metadata().unwrap();
		assert_eq!(metadata.tile_type(), Some(TileType::Raster));
		assert_eq!(metadata.tile_format(), Some(TileFormat::Png));
		assert_eq!((metadata.min_zoom(), metadata.max_zoom()), (Some(0), Some(1)));
		assert_eq!(metadata.bounds(), Some([-180.0, -85.0511287, 180.0, 85.0511287]));
		assert_eq!(metadata.center(), Some([13.4, 52.5, 1.0]));
		assert_eq!(metadata.name(), Some("Pyramid"));
		assert_eq!(metadata.attribution(), Some("© test"));
		assert_eq!(metadata.layers(), None);
		assert_eq!(metadata.num_tiles(), Some(5));
		assert_eq!(metadata.processing().unwrap().source_format.as_deref(), Some("pmtiles"));
		assert_eq!(metadata.get("tilejson").unwrap()["name"], json!("Pyramid"));
	}

	#[test]
	fn runs_expand_to_quadbin_rows() {
		let file = NamedTempFile::new("runs.pmtiles").unwrap();
		pyramid(file.path());

		let rows = collect(&mut PMTilesSource::open(file.path()).unwrap());
		let ids: Vec<u64> = rows.iter().map(|row| row.id).collect();
		let mut expected = vec![
			quadbin(0, 0, 0),
			quadbin(1, 0, 0),
			quadbin(1, 1, 0),
			quadbin(1, 0, 1),
			quadbin(1, 1, 1),
		];
		expected.sort_unstable();
		assert_eq!(ids, expected);
		assert_eq!(rows[0].payload.as_slice(), PNG_A);
		assert!(rows[1..].iter().all(|row| row.payload.as_slice() == PNG_B));
	}

	#[test]
	fn leaf_directories_without_internal_compression() {
		let file = NamedTempFile::new("leaves.pmtiles").unwrap();
		let header = Header {
			internal_compression: PMTilesCompression::None,
			tile_type: 1,
			..header::example_header()
		};
		let leaf_entries = [entry(1, 1, 0, 3), entry(2, 1, 3, 3)];
		let leaf_length = directory::serialize_entries(&leaf_entries).len() as u64;
		write_archive(
			file.path(),
			header,
			&[entry(0, 1, 6, 3), entry(1, 0, 0, leaf_length)],
			&leaf_entries,
			&json!({ "vector_layers": [{ "id": "roads" }] }),
			b"aaabbbccc",
		);

		let mut source = PMTilesSource::open(file.path()).unwrap();
		let metadata = source.metadata().unwrap();
		assert_eq!(metadata.tile_format(), Some(TileFormat::Pbf));
		assert_eq!(metadata.layers().unwrap()[0].id, "roads");

		let rows = collect(&mut source);
		let found: Vec<(u64, &[u8])> = rows.iter().map(|row| (row.id, row.payload.as_slice())).collect();
		let mut expected = vec![
			(quadbin(0, 0, 0), b"ccc".as_slice()),
			(quadbin(1, 0, 0), b"aaa".as_slice()),
			(quadbin(1, 0, 1), b"bbb".as_slice()),
		];
		expected.sort_unstable();
		assert_eq!(found, expected);
	}

	#[test]
	fn unknown_tile_type_is_sniffed() {
		let file = NamedTempFile::new("unknown.pmtiles").unwrap();
		let header = Header {
			tile_type: 0,
			..header::example_header()
		};
		write_archive(file.path(), header, &[entry(0, 1, 0, 3)], &[], &json!({}), b"\xff\xd8\xff");
		let source = PMTilesSource::open(file.path()).unwrap();
		assert_eq!(source.metadata().unwrap().tile_format(), Some(TileFormat::Jpeg));
	}

	#[test]
	fn missing_and_foreign_files() {
		let err = PMTilesSource::open(Path::new("/does/not/exist.pmtiles")).unwrap_err();
		assert!(matches!(
			TileQuetError::classify(&err),
			Some(TileQuetError::NotFound(_))
		));

		let file = NamedTempFile::new("short.pmtiles").unwrap();
		std::fs::write(file.path(), b"PMTiles\x03").unwrap();
		let err = PMTilesSource::open(file.path()).unwrap_err();
		assert!(matches!(
			TileQuetError::classify(&err),
			Some(TileQuetError::Malformed(_))
		));
	}
}
