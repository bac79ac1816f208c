//! Fixtures shared by the unit tests of this crate.

use crate::schema::{ID_COLUMN, METADATA_COLUMN, container_schema};
use arrow_array::{ArrayRef, BinaryArray, RecordBatch, StringArray, UInt64Array};
use arrow_schema::{DataType, Field, Schema};
use parquet::arrow::ArrowWriter;
use std::{fs::File, path::Path, sync::Arc};
use tilequet_core::{Quadbin, TileCoord, TileFormat, TileIndexCodec, TileQuetMetadata, TileRow, TileType};

pub fn raster_metadata() -> TileQuetMetadata {
	TileQuetMetadata::builder(TileType::Raster, TileFormat::Png)
		.build()
		.unwrap()
}

/// Rows with the given ids and a one-byte payload each.
pub fn data_rows(ids: impl IntoIterator<Item = u64>) -> Vec<TileRow> {
	ids.into_iter().map(|id| TileRow::new(id, vec![id as u8])).collect()
}

/// Quadbin ids of every tile of one zoom level.
pub fn level_ids(level: u8) -> Vec<u64> {
	let size = 1u32 << level;
	let mut ids = Vec::new();
	for x in 0..size {
		for y in 0..size {
			ids.push(Quadbin.encode(&TileCoord::new(level, x, y).unwrap()).unwrap());
		}
	}
	ids
}

/// Writes the three container columns verbatim, bypassing every writer check.
pub fn write_raw(path: &Path, ids: Vec<u64>, metadata: Vec<Option<&str>>, payloads: Vec<Option<Vec<u8>>>) {
	let columns: Vec<ArrayRef> = vec![
		Arc::new(UInt64Array::from(ids)),
		Arc::new(StringArray::from(metadata)),
		Arc::new(BinaryArray::from_iter(payloads.iter().map(|payload| payload.as_deref()))),
	];
	write_batch(path, RecordBatch::try_new(container_schema(), columns).unwrap());
}

/// Writes a sentinel row plus `ids` with only the `id` and `metadata` columns.
pub fn write_without_payload(path: &Path, metadata: &TileQuetMetadata, ids: &[u64]) {
	let schema = Arc::new(Schema::new(vec![
		Field::new(ID_COLUMN, DataType::UInt64, false),
		Field::new(METADATA_COLUMN, DataType::Utf8, true),
	]));
	let json = metadata.to_json().unwrap();
	let mut all_ids = vec![0];
	all_ids.extend_from_slice(ids);
	let mut texts = vec![Some(json.as_str())];
	texts.extend(ids.iter().map(|_| None));
	let columns: Vec<ArrayRef> = vec![Arc::new(UInt64Array::from(all_ids)), Arc::new(StringArray::from(texts))];
	write_batch(path, RecordBatch::try_new(schema, columns).unwrap());
}

pub fn write_batch(path: &Path, batch: RecordBatch) {
	let mut writer = ArrowWriter::try_new(File::create(path).unwrap(), batch.schema(), None).unwrap();
	writer.write(&batch).unwrap();
	writer.close().unwrap();
}
