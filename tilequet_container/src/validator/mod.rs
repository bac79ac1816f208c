//! Structural and statistical checks of a container.
//!
//! [`validate`] never fails: every problem becomes an entry in
//! [`ValidationResult::errors`] or [`ValidationResult::warnings`]. Only a file that
//! cannot be opened at all short-circuits the remaining stages.
//!
//! Stages:
//! 1. open the file and read its footer
//! 2. check the three columns and their types
//! 3. locate and parse the sentinel row, then check the metadata fields
//! 4. decode every tile id, tally tiles per zoom level and sample payloads

mod result;
pub use result::*;

use crate::{
	ContainerReader,
	schema::{FORMAT_KEY, ID_COLUMN, METADATA_COLUMN, PAYLOAD_COLUMN},
};
use arrow_schema::DataType;
use serde_json::{Map, Value, json};
use std::{collections::BTreeMap, path::Path};
use tilequet_core::{FILE_FORMAT, MAX_TILE_LEVEL, Quadbin, SENTINEL_TILE_ID, SUPPORTED_VERSIONS, TileIndexCodec, TileType};

const REQUIRED_FIELDS: [&str; 7] = [
	"tile_type",
	"tile_format",
	"bounds",
	"bounds_crs",
	"min_zoom",
	"max_zoom",
	"tiling",
];

/// What the metadata stage learned, for the tile stage.
#[derive(Default)]
struct Declared {
	sentinel_rows: Option<usize>,
	zoom_range: Option<(u64, u64)>,
}

/// Validates the container at `path`. Calling it twice on an unchanged file gives equal results.
pub fn validate(path: &Path) -> ValidationResult {
	log::debug!("validating '{}'", path.display());
	let mut result = ValidationResult::default();

	let reader = match ContainerReader::open(path) {
		Ok(reader) => reader,
		Err(err) => {
			result.error(format!("cannot open container: {err:#}"));
			return result.finish();
		}
	};

	result.stat("num_rows", reader.num_rows());
	result.stat("num_row_groups", reader.num_row_groups());
	match reader.file_format_version() {
		Some(version) => result.stat("file_key_version", version),
		None => {
			result.stat("file_key_version", Value::Null);
			result.warning(format!("file-level key '{FORMAT_KEY}' is missing"));
		}
	}

	let (id_ok, metadata_ok) = check_schema(&reader, &mut result);

	let declared = if id_ok && metadata_ok {
		check_metadata(&reader, &mut result)
	} else {
		Declared::default()
	};

	if id_ok {
		check_tiles(&reader, &declared, &mut result);
	}

	let result = result.finish();
	log::info!(
		"validated '{}': {} errors, {} warnings",
		path.display(),
		result.errors.len(),
		result.warnings.len()
	);
	result
}

/// Returns whether the `id` and `metadata` columns are usable.
fn check_schema(reader: &ContainerReader, result: &mut ValidationResult) -> (bool, bool) {
	let schema = reader.schema().clone();
	let columns: Vec<&str> = schema.fields().iter().map(|field| field.name().as_str()).collect();
	result.stat("columns", json!(columns));

	let mut check = |name: &str, accepted: &[DataType], expected: &str| -> bool {
		match schema.field_with_name(name) {
			Err(_) => {
				result.error(format!("missing required column '{name}'"));
				false
			}
			Ok(field) if !accepted.contains(field.data_type()) => {
				result.error(format!(
					"column '{name}' has type {}, expected {expected}",
					field.data_type()
				));
				false
			}
			Ok(_) => true,
		}
	};

	let id_ok = check(ID_COLUMN, &[DataType::UInt64], "an unsigned 64-bit integer");
	let metadata_ok = check(METADATA_COLUMN, &[DataType::Utf8, DataType::LargeUtf8], "a string");
	check(PAYLOAD_COLUMN, &[DataType::Binary, DataType::LargeBinary], "binary");
	(id_ok, metadata_ok)
}

fn check_metadata(reader: &ContainerReader, result: &mut ValidationResult) -> Declared {
	let mut declared = Declared::default();

	let values = match reader.sentinel_values() {
		Ok(values) => values,
		Err(err) => {
			result.error(format!("cannot read the sentinel row: {err:#}"));
			return declared;
		}
	};
	declared.sentinel_rows = Some(values.len());

	let text = match values.as_slice() {
		[] => {
			result.error(format!("missing sentinel row (id = {SENTINEL_TILE_ID})"));
			return declared;
		}
		[first, rest @ ..] => {
			if !rest.is_empty() {
				result.error(format!("found {} sentinel rows, expected exactly one", values.len()));
			}
			first
		}
	};
	let Some(text) = text else {
		result.error("the metadata of the sentinel row is null");
		return declared;
	};
	let value: Value = match serde_json::from_str(text) {
		Ok(value) => value,
		Err(err) => {
			result.error(format!("the sentinel metadata is not valid JSON: {err}"));
			return declared;
		}
	};
	let Some(object) = value.as_object() else {
		result.error("the sentinel metadata is not a JSON object");
		return declared;
	};

	check_identity(object, result);

	for field in REQUIRED_FIELDS {
		if !object.contains_key(field) {
			result.error(format!("missing required field '{field}'"));
		}
	}

	if let Some(tile_type) = object.get("tile_type") {
		let known = tile_type
			.as_str()
			.is_some_and(|name| TileType::ALL.iter().any(|known| known.as_str() == name));
		if !known {
			result.error(format!(
				"invalid tile_type {tile_type}, expected one of {}",
				TileType::ALL.map(|known| known.as_str()).join(", ")
			));
		}
	}

	if let Some(tiling) = object.get("tiling") {
		match tiling.get("scheme").and_then(Value::as_str) {
			Some(Quadbin::SCHEME) => {}
			Some(scheme) => result.error(format!(
				"tiling scheme '{scheme}' is not supported, expected '{}'",
				Quadbin::SCHEME
			)),
			None => result.error("missing required field 'tiling.scheme'"),
		}
	}

	if let Some(bounds) = object.get("bounds") {
		if bounds.as_array().is_none_or(|bounds| bounds.len() != 4) {
			result.error("bounds must have exactly 4 elements");
		}
	}

	let min_zoom = object.get("min_zoom").and_then(Value::as_u64);
	let max_zoom = object.get("max_zoom").and_then(Value::as_u64);
	match (min_zoom, max_zoom) {
		(Some(min), Some(max)) if min > max => {
			result.error(format!("min_zoom ({min}) is greater than max_zoom ({max})"));
		}
		(Some(_), Some(max)) if max > u64::from(MAX_TILE_LEVEL) => {
			result.error(format!("max_zoom ({max}) exceeds the deepest tile level {MAX_TILE_LEVEL}"));
		}
		(Some(min), Some(max)) => {
			result.stat("zoom_range", format!("{min}-{max}"));
			declared.zoom_range = Some((min, max));
		}
		_ => {
			for key in ["min_zoom", "max_zoom"] {
				if object.get(key).is_some_and(|zoom| zoom.as_u64().is_none()) {
					result.error(format!("{key} must be a non-negative integer"));
				}
			}
		}
	}

	for key in ["version", "tile_type", "tile_format", "num_tiles"] {
		if let Some(field) = object.get(key) {
			result.stat(key, field.clone());
		}
	}

	result.metadata = Some(value);
	declared
}

fn check_identity(object: &Map<String, Value>, result: &mut ValidationResult) {
	match object.get("file_format").and_then(Value::as_str) {
		Some(FILE_FORMAT) => {}
		Some(other) => result.error(format!("file_format is '{other}', expected '{FILE_FORMAT}'")),
		None => result.error("missing required field 'file_format'"),
	}
	match object.get("version").and_then(Value::as_str) {
		Some(version) if SUPPORTED_VERSIONS.contains(&version) => {}
		Some(version) => result.warning(format!("unknown version '{version}'")),
		None => result.error("missing required field 'version'"),
	}
}

fn check_tiles(reader: &ContainerReader, declared: &Declared, result: &mut ValidationResult) {
	let sentinel_rows = match declared.sentinel_rows {
		Some(count) => count as u64,
		None => count_sentinel_ids(reader),
	};
	let data_rows = reader.num_rows().saturating_sub(sentinel_rows);
	let samples = [0, data_rows / 2, data_rows.saturating_sub(1)];

	let mut tally: BTreeMap<u8, u64> = BTreeMap::new();
	let mut undecodable = 0u64;
	let mut null_payloads = 0u64;
	let mut empty_samples = Vec::new();
	let mut sorted = true;
	let mut previous = None;
	let mut index = 0u64;

	let scan = reader.for_each_row(|row| {
		if previous.is_some_and(|previous| row.id < previous) {
			sorted = false;
		}
		previous = Some(row.id);
		if row.is_sentinel() {
			return Ok(());
		}

		match Quadbin.decode(row.id) {
			Ok(coord) => *tally.entry(coord.level).or_default() += 1,
			Err(_) => undecodable += 1,
		}
		match &row.payload {
			None => null_payloads += 1,
			Some(payload) if payload.is_empty() && samples.contains(&index) => empty_samples.push(row.id),
			Some(_) => {}
		}
		index += 1;
		Ok(())
	});
	if let Err(err) = scan {
		result.error(format!("cannot read the tile rows: {err:#}"));
		return;
	}

	for id in empty_samples {
		result.warning(format!("tile {id} has an empty payload"));
	}
	if null_payloads > 0 {
		result.warning(format!("{null_payloads} tiles have a null payload"));
	}
	if undecodable > 0 {
		result.warning(format!("{undecodable} tile ids are not valid {} cells", Quadbin::SCHEME));
	}

	if let Some((min, max)) = declared.zoom_range {
		for zoom in min..=max {
			if !u8::try_from(zoom).is_ok_and(|zoom| tally.contains_key(&zoom)) {
				result.warning(format!("no tiles at zoom level {zoom}"));
			}
		}
	}

	let per_zoom: Map<String, Value> = tally
		.iter()
		.map(|(zoom, count)| (zoom.to_string(), json!(count)))
		.collect();
	result.stat("tiles_per_zoom", per_zoom);
	result.stat("data_rows", index);
	result.stat("undecodable_ids", undecodable);
	result.stat("null_payloads", null_payloads);
	result.stat("sorted", sorted);
}

/// Counts `id = 0` rows without the `metadata` column.
fn count_sentinel_ids(reader: &ContainerReader) -> u64 {
	(0..reader.num_row_groups())
		.filter_map(|index| reader.row_group_ids(index).ok())
		.flatten()
		.filter(|id| *id == SENTINEL_TILE_ID)
		.count() as u64
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{StreamingOptions, StreamingWriter, WriterOptions, testing::*, write_container};
	use assert_fs::TempDir;
	use pretty_assertions::assert_eq;
	use tilequet_core::{TileFormat, TileQuetMetadata, TileRow};

	fn has(messages: &[String], needle: &str) -> bool {
		messages.iter().any(|message| message.contains(needle))
	}

	fn full_level_container(path: &Path, metadata: &TileQuetMetadata) {
		let rows = level_ids(1).into_iter().map(|id| TileRow::new(id, b"tile")).collect();
		write_container(path, rows, metadata, &WriterOptions::default()).unwrap();
	}

	#[test]
	fn valid_container() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("valid.parquet");
		let metadata = TileQuetMetadata::builder(TileType::Raster, TileFormat::Png)
			.min_zoom(1)
			.max_zoom(1)
			.num_tiles(4)
			.build()
			.unwrap();
		full_level_container(&path, &metadata);

		let result = validate(&path);
		assert!(result.is_valid, "{result}");
		assert_eq!(result.errors, Vec::<String>::new());
		assert_eq!(result.warnings, Vec::<String>::new());
		assert_eq!(result.metadata, Some(metadata.to_value()));
		assert_eq!(result.stats["num_rows"], json!(5));
		assert_eq!(result.stats["columns"], json!(["id", "metadata", "payload"]));
		assert_eq!(result.stats["version"], json!("0.1.0"));
		assert_eq!(result.stats["tile_type"], json!("raster"));
		assert_eq!(result.stats["tile_format"], json!("png"));
		assert_eq!(result.stats["zoom_range"], json!("1-1"));
		assert_eq!(result.stats["num_tiles"], json!(4));
		assert_eq!(result.stats["tiles_per_zoom"], json!({ "1": 4 }));
		assert_eq!(result.stats["undecodable_ids"], json!(0));
		assert_eq!(result.stats["file_key_version"], json!("0.1.0"));
		assert_eq!(result.stats["sorted"], json!(true));
	}

	#[test]
	fn missing_file() {
		let dir = TempDir::new().unwrap();
		let result = validate(&dir.path().join("nothing.parquet"));
		assert!(!result.is_valid);
		assert_eq!(result.errors.len(), 1);
		assert!(result.errors[0].starts_with("cannot open container"));
		assert!(result.stats.is_empty());
		assert_eq!(result.metadata, None);
	}

	#[test]
	fn not_a_container() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("garbage.parquet");
		std::fs::write(&path, b"definitely not parquet").unwrap();
		let result = validate(&path);
		assert!(!result.is_valid);
		assert_eq!(result.errors.len(), 1);
	}

	#[test]
	fn missing_payload_column() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("no_payload.parquet");
		write_without_payload(&path, &raster_metadata(), &level_ids(0));
		let result = validate(&path);
		assert!(!result.is_valid);
		assert!(has(&result.errors, "payload"), "{result}");
		assert!(result.metadata.is_some());
	}

	#[test]
	fn sentinel_with_invalid_json() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("bad_json.parquet");
		write_raw(&path, vec![0], vec![Some("{ not json")], vec![None]);
		let result = validate(&path);
		assert!(!result.is_valid);
		assert!(has(&result.errors, "JSON"), "{result}");
		assert!(has(&result.warnings, "tilequet:version"));
	}

	#[test]
	fn missing_and_duplicate_sentinels() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("headless.parquet");
		write_raw(&path, level_ids(0), vec![None], vec![Some(b"t".to_vec())]);
		let result = validate(&path);
		assert!(has(&result.errors, "missing sentinel row"), "{result}");

		let path = dir.path().join("two_heads.parquet");
		let json = raster_metadata().to_json().unwrap();
		write_raw(
			&path,
			vec![0, 0],
			vec![Some(json.as_str()), Some(json.as_str())],
			vec![None, None],
		);
		let result = validate(&path);
		assert!(has(&result.errors, "found 2 sentinel rows"), "{result}");
	}

	#[test]
	fn null_sentinel_metadata() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("null.parquet");
		write_raw(&path, vec![0], vec![None], vec![None]);
		let result = validate(&path);
		assert!(has(&result.errors, "is null"), "{result}");
	}

	#[test]
	fn empty_zoom_level_is_a_warning() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("gap.parquet");
		let metadata = TileQuetMetadata::builder(TileType::Raster, TileFormat::Png)
			.min_zoom(1)
			.max_zoom(3)
			.build()
			.unwrap();
		full_level_container(&path, &metadata);

		let result = validate(&path);
		assert!(result.is_valid, "{result}");
		assert!(has(&result.warnings, "zoom level 2"));
		assert!(has(&result.warnings, "zoom level 3"));
		assert!(!has(&result.warnings, "zoom level 1"));
	}

	#[test]
	fn zoom_beyond_deepest_level_is_an_error() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("deep.parquet");
		let json = r#"{"file_format":"tilequet","version":"0.1.0","tile_type":"raster","tile_format":"png",
			"bounds":[-180,-85,180,85],"bounds_crs":"EPSG:4326","min_zoom":0,"max_zoom":3000000,
			"num_tiles":1,"tiling":{"scheme":"quadbin"}}"#;
		write_raw(
			&path,
			vec![0, 5192650370358181887],
			vec![Some(json), None],
			vec![None, Some(b"t".to_vec())],
		);

		let result = validate(&path);
		assert!(!result.is_valid);
		assert!(has(&result.errors, "max_zoom (3000000) exceeds the deepest tile level 26"), "{result}");
		assert!(!has(&result.warnings, "no tiles at zoom level"), "{result}");
		assert!(!result.stats.contains_key("zoom_range"));
		assert_eq!(result.stats["tiles_per_zoom"], json!({ "0": 1 }));
	}

	#[test]
	fn field_checks() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("fields.parquet");
		let json = r#"{"file_format":"other","version":"9.0.0","tile_type":"hologram","tile_format":"png",
			"bounds":[1,2,3],"min_zoom":0,"max_zoom":0,"tiling":{"scheme":"h3"}}"#;
		write_raw(&path, vec![0], vec![Some(json)], vec![None]);

		let result = validate(&path);
		assert!(!result.is_valid);
		assert!(has(&result.errors, "file_format is 'other'"));
		assert!(has(&result.errors, "missing required field 'bounds_crs'"));
		assert!(has(&result.errors, "invalid tile_type \"hologram\""));
		assert!(has(&result.errors, "tiling scheme 'h3'"));
		assert!(has(&result.errors, "bounds must have exactly 4 elements"));
		assert!(has(&result.warnings, "unknown version '9.0.0'"));
		assert!(!has(&result.errors, "version"));
		assert!(result.metadata.is_some());
	}

	#[test]
	fn tile_statistics() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("tiles.parquet");
		let json = raster_metadata().to_json().unwrap();
		let good = level_ids(0)[0];
		write_raw(
			&path,
			vec![0, 12345, good],
			vec![Some(json.as_str()), None, None],
			vec![None, None, Some(Vec::new())],
		);

		let result = validate(&path);
		assert!(result.is_valid, "{result}");
		assert_eq!(result.stats["undecodable_ids"], json!(1));
		assert_eq!(result.stats["null_payloads"], json!(1));
		assert_eq!(result.stats["data_rows"], json!(2));
		assert_eq!(result.stats["tiles_per_zoom"], json!({ "0": 1 }));
		assert!(has(&result.warnings, "1 tile ids are not valid quadbin cells"));
		assert!(has(&result.warnings, "1 tiles have a null payload"));
		assert!(has(&result.warnings, &format!("tile {good} has an empty payload")));
	}

	#[test]
	fn streaming_container_is_valid_but_not_sorted() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("stream.parquet");
		let options = StreamingOptions {
			memory_threshold: 1,
			..StreamingOptions::default()
		};
		let mut writer = StreamingWriter::create(&path, options).unwrap();
		for id in level_ids(1).into_iter().rev() {
			writer.add(id, b"tile").unwrap();
		}
		let metadata = TileQuetMetadata::builder(TileType::Raster, TileFormat::Png)
			.min_zoom(1)
			.max_zoom(1)
			.build()
			.unwrap();
		writer.close(&metadata).unwrap();

		let result = validate(&path);
		assert!(result.is_valid, "{result}");
		assert_eq!(result.stats["sorted"], json!(false));
		assert_eq!(result.stats["tiles_per_zoom"], json!({ "1": 4 }));
	}

	#[test]
	fn validation_is_idempotent() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("twice.parquet");
		let metadata = TileQuetMetadata::builder(TileType::Raster, TileFormat::Png)
			.max_zoom(2)
			.build()
			.unwrap();
		full_level_container(&path, &metadata);
		assert_eq!(validate(&path), validate(&path));
	}
}
