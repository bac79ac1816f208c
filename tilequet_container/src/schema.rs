//! The physical layout shared by every container.
//!
//! | column     | type   | sentinel row (`id = 0`) | data rows      |
//! |------------|--------|-------------------------|----------------|
//! | `id`       | uint64 | `0`                     | spatial id > 0 |
//! | `metadata` | utf8   | metadata JSON           | null           |
//! | `payload`  | binary | null                    | tile bytes     |
//!
//! Writers declare `id` as the sort column, request chunk and page statistics on
//! every column, and stamp [`FORMAT_KEY`] into the file-level key/value metadata.

use anyhow::{Result, bail};
use arrow_array::{ArrayRef, BinaryArray, RecordBatch, StringArray, UInt64Array};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use parquet::{
	arrow::ArrowWriter,
	basic::{Compression, ZstdLevel},
	file::{
		metadata::KeyValue,
		properties::{EnabledStatistics, WriterProperties},
	},
	format::SortingColumn,
};
use std::{
	fmt::{Display, Formatter},
	io::Write,
	sync::Arc,
};
use tilequet_core::{FORMAT_VERSION, SENTINEL_TILE_ID, TileQuetError, TileQuetMetadata, TileRow};

pub const ID_COLUMN: &str = "id";
pub const METADATA_COLUMN: &str = "metadata";
pub const PAYLOAD_COLUMN: &str = "payload";

/// File-level key announcing a container, readable from the footer without a row scan.
pub const FORMAT_KEY: &str = "tilequet:version";

/// File extension of containers.
pub const CONTAINER_EXTENSION: &str = "parquet";

const BATCH_ROWS: usize = 8192;
const BATCH_BYTES: usize = 1 << 30;

/// The arrow schema of a container.
pub fn container_schema() -> SchemaRef {
	Arc::new(Schema::new(vec![
		Field::new(ID_COLUMN, DataType::UInt64, false),
		Field::new(METADATA_COLUMN, DataType::Utf8, true),
		Field::new(PAYLOAD_COLUMN, DataType::Binary, true),
	]))
}

/// Page compression of the written columns.
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ContainerCompression {
	#[default]
	Uncompressed,
	Zstd,
	Snappy,
}

impl ContainerCompression {
	pub fn as_str(&self) -> &'static str {
		match self {
			ContainerCompression::Uncompressed => "uncompressed",
			ContainerCompression::Zstd => "zstd",
			ContainerCompression::Snappy => "snappy",
		}
	}

	fn codec(self) -> Compression {
		match self {
			ContainerCompression::Uncompressed => Compression::UNCOMPRESSED,
			ContainerCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
			ContainerCompression::Snappy => Compression::SNAPPY,
		}
	}
}

impl TryFrom<&str> for ContainerCompression {
	type Error = anyhow::Error;

	fn try_from(value: &str) -> Result<Self> {
		Ok(match value.to_lowercase().as_str() {
			"uncompressed" | "none" => ContainerCompression::Uncompressed,
			"zstd" => ContainerCompression::Zstd,
			"snappy" => ContainerCompression::Snappy,
			_ => bail!("unknown compression '{value}', expected 'uncompressed', 'zstd' or 'snappy'"),
		})
	}
}

impl Display for ContainerCompression {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Parameters of the bulk write path, also used by the zoom partitioner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriterOptions {
	/// Rows per row group; the sentinel row counts towards the first group.
	pub row_group_size: usize,
	pub compression: ContainerCompression,
}

impl Default for WriterOptions {
	fn default() -> Self {
		WriterOptions {
			row_group_size: 200,
			compression: ContainerCompression::Uncompressed,
		}
	}
}

pub(crate) fn writer_properties(max_row_group_size: usize, compression: ContainerCompression) -> WriterProperties {
	WriterProperties::builder()
		.set_compression(compression.codec())
		.set_max_row_group_size(max_row_group_size.max(1))
		.set_statistics_enabled(EnabledStatistics::Page)
		.set_sorting_columns(Some(vec![SortingColumn {
			column_idx: 0,
			descending: false,
			nulls_first: false,
		}]))
		.set_key_value_metadata(Some(vec![KeyValue::new(
			String::from(FORMAT_KEY),
			String::from(FORMAT_VERSION),
		)]))
		.build()
}

/// The one-row batch holding the serialized metadata.
pub(crate) fn sentinel_batch(metadata: &TileQuetMetadata) -> Result<RecordBatch> {
	let json = metadata.to_json()?;
	let columns: Vec<ArrayRef> = vec![
		Arc::new(UInt64Array::from(vec![SENTINEL_TILE_ID])),
		Arc::new(StringArray::from(vec![json.as_str()])),
		Arc::new(BinaryArray::new_null(1)),
	];
	Ok(RecordBatch::try_new(container_schema(), columns)?)
}

fn tile_batch(rows: &[TileRow]) -> Result<RecordBatch> {
	let columns: Vec<ArrayRef> = vec![
		Arc::new(UInt64Array::from_iter_values(rows.iter().map(|row| row.id))),
		Arc::new(StringArray::new_null(rows.len())),
		Arc::new(BinaryArray::from_iter_values(rows.iter().map(|row| row.payload.as_slice()))),
	];
	Ok(RecordBatch::try_new(container_schema(), columns)?)
}

/// Appends data rows in their given order, split into batches small enough for 32-bit offsets.
///
/// The rows end up in the writer's current row group; the writer starts new groups
/// on its own when `max_row_group_size` is reached.
pub(crate) fn write_tiles<W: Write + Send>(writer: &mut ArrowWriter<W>, rows: &[TileRow]) -> Result<()> {
	let mut start = 0;
	while start < rows.len() {
		let mut end = start;
		let mut bytes = 0;
		while end < rows.len() && end - start < BATCH_ROWS {
			let size = rows[end].payload.len();
			if size > i32::MAX as usize {
				bail!(TileQuetError::Malformed(format!(
					"payload of tile {} is too large ({size} bytes)",
					rows[end].id
				)));
			}
			if end > start && bytes + size > BATCH_BYTES {
				break;
			}
			bytes += size;
			end += 1;
		}
		writer.write(&tile_batch(&rows[start..end])?)?;
		start = end;
	}
	Ok(())
}

/// Fails when a data row carries the reserved sentinel id.
pub(crate) fn check_tile_id(id: u64) -> Result<()> {
	if id == SENTINEL_TILE_ID {
		bail!(TileQuetError::Malformed(format!(
			"tile id {SENTINEL_TILE_ID} is reserved for the metadata row"
		)));
	}
	Ok(())
}
