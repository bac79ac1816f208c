//! Read access to an existing container.
//!
//! Opening a [`ContainerReader`] only parses the file footer. The metadata read
//! prunes row groups with the `id` column statistics, so only groups that can hold
//! `id = 0` are decoded, and of those only the `id` and `metadata` columns.
//!
//! ```no_run
//! use tilequet_container::ContainerReader;
//! use std::path::Path;
//!
//! let reader = ContainerReader::open(Path::new("berlin.parquet"))?;
//! let metadata = reader.metadata()?;
//! println!("{} tiles, zoom {:?}..={:?}", reader.num_rows() - 1, metadata.min_zoom(), metadata.max_zoom());
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::schema::{FORMAT_KEY, ID_COLUMN, METADATA_COLUMN, PAYLOAD_COLUMN};
use anyhow::{Result, bail};
use arrow_array::{
	Array, ArrayRef,
	cast::AsArray,
	types::{Int64Type, UInt64Type},
};
use arrow_schema::{DataType, SchemaRef};
use itertools::izip;
use parquet::{
	arrow::{
		ProjectionMask,
		arrow_reader::{ArrowReaderMetadata, ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder},
	},
	file::{metadata::ParquetMetaData, statistics::Statistics},
};
use std::{
	fs::File,
	path::{Path, PathBuf},
	sync::Arc,
};
use tilequet_core::{SENTINEL_TILE_ID, TileQuetError, TileQuetMetadata};
use tilequet_derive::context;

/// One physical row, with the nullable columns as they are stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerRow {
	pub id: u64,
	pub metadata: Option<String>,
	pub payload: Option<Vec<u8>>,
}

impl ContainerRow {
	pub fn is_sentinel(&self) -> bool {
		self.id == SENTINEL_TILE_ID
	}
}

pub struct ContainerReader {
	path: PathBuf,
	footer: ArrowReaderMetadata,
}

impl ContainerReader {
	/// Opens a container and parses its footer. Missing or mistyped columns are
	/// only reported by the operations that need them.
	#[context("opening container '{}'", path.display())]
	pub fn open(path: &Path) -> Result<ContainerReader> {
		let file = File::open(path).map_err(TileQuetError::Io)?;
		let footer = ArrowReaderMetadata::load(&file, Default::default())?;
		log::debug!(
			"opened '{}': {} rows in {} row groups",
			path.display(),
			footer.metadata().file_metadata().num_rows(),
			footer.metadata().num_row_groups()
		);
		Ok(ContainerReader {
			path: path.to_path_buf(),
			footer,
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// The arrow schema stored in the file.
	pub fn schema(&self) -> &SchemaRef {
		self.footer.schema()
	}

	pub fn parquet_metadata(&self) -> &Arc<ParquetMetaData> {
		self.footer.metadata()
	}

	pub fn num_rows(&self) -> u64 {
		self.parquet_metadata().file_metadata().num_rows() as u64
	}

	pub fn num_row_groups(&self) -> usize {
		self.parquet_metadata().num_row_groups()
	}

	/// The value of the file-level `tilequet:version` key, if present.
	pub fn file_format_version(&self) -> Option<&str> {
		self.parquet_metadata()
			.file_metadata()
			.key_value_metadata()?
			.iter()
			.find(|entry| entry.key == FORMAT_KEY)?
			.value
			.as_deref()
	}

	/// Reads and parses the dataset metadata from the sentinel row.
	///
	/// Fails with [`TileQuetError::NotFound`] if there is no row with `id = 0`,
	/// [`TileQuetError::Parse`] if its text is not JSON and
	/// [`TileQuetError::Malformed`] if it is null or not a JSON object. The record
	/// itself is returned as stored; unknown values show up as `None` in its getters.
	#[context("reading metadata of '{}'", self.path.display())]
	pub fn metadata(&self) -> Result<TileQuetMetadata> {
		let Some(text) = self.sentinel_values()?.into_iter().next() else {
			bail!(TileQuetError::NotFound(String::from("no sentinel row with id 0")));
		};
		let Some(text) = text else {
			bail!(TileQuetError::Malformed(String::from("the metadata of the sentinel row is null")));
		};
		TileQuetMetadata::from_json(&text)
	}

	/// The `metadata` values of every row with `id = 0`, in file order.
	#[context("searching the sentinel rows of '{}'", self.path.display())]
	pub fn sentinel_values(&self) -> Result<Vec<Option<String>>> {
		let id_column = self.require_column(ID_COLUMN)?;
		let metadata_column = self.require_column(METADATA_COLUMN)?;

		let row_groups: Vec<usize> = (0..self.num_row_groups())
			.filter(|index| self.may_contain_sentinel(*index, id_column))
			.collect();
		log::trace!(
			"sentinel search reads {} of {} row groups",
			row_groups.len(),
			self.num_row_groups()
		);

		let mut values = Vec::new();
		for batch in self.batches(vec![id_column, metadata_column], Some(row_groups))? {
			let batch = batch?;
			let ids = id_values(column(&batch, ID_COLUMN)?)?;
			let texts = text_values(column(&batch, METADATA_COLUMN)?)?;
			for (id, text) in ids.into_iter().zip(texts) {
				if id == SENTINEL_TILE_ID {
					values.push(text);
				}
			}
		}
		Ok(values)
	}

	/// Ids stored in one row group, in stored order.
	#[context("reading ids of row group {index} in '{}'", self.path.display())]
	pub fn row_group_ids(&self, index: usize) -> Result<Vec<u64>> {
		if index >= self.num_row_groups() {
			bail!(TileQuetError::NotFound(format!("row group {index}")));
		}
		let id_column = self.require_column(ID_COLUMN)?;
		let mut ids = Vec::new();
		for batch in self.batches(vec![id_column], Some(vec![index]))? {
			ids.extend(id_values(column(&batch?, ID_COLUMN)?)?);
		}
		Ok(ids)
	}

	/// Visits every row in stored order. Absent `metadata` or `payload` columns read as null.
	#[context("scanning rows of '{}'", self.path.display())]
	pub fn for_each_row(&self, mut callback: impl FnMut(ContainerRow) -> Result<()>) -> Result<()> {
		let id_column = self.require_column(ID_COLUMN)?;
		let metadata_column = self.column_index(METADATA_COLUMN);
		let payload_column = self.column_index(PAYLOAD_COLUMN);
		let projection = [Some(id_column), metadata_column, payload_column]
			.into_iter()
			.flatten()
			.collect();

		for batch in self.batches(projection, None)? {
			let batch = batch?;
			let rows = batch.num_rows();
			let ids = id_values(column(&batch, ID_COLUMN)?)?;
			let texts = match batch.column_by_name(METADATA_COLUMN) {
				Some(array) => text_values(array)?,
				None => vec![None; rows],
			};
			let payloads = match batch.column_by_name(PAYLOAD_COLUMN) {
				Some(array) => binary_values(array)?,
				None => vec![None; rows],
			};
			for (id, metadata, payload) in izip!(ids, texts, payloads) {
				callback(ContainerRow { id, metadata, payload })?;
			}
		}
		Ok(())
	}

	/// All rows in stored order.
	pub fn read_rows(&self) -> Result<Vec<ContainerRow>> {
		let mut rows = Vec::new();
		self.for_each_row(|row| {
			rows.push(row);
			Ok(())
		})?;
		Ok(rows)
	}

	fn column_index(&self, name: &str) -> Option<usize> {
		self.schema().index_of(name).ok()
	}

	fn require_column(&self, name: &str) -> Result<usize> {
		match self.column_index(name) {
			Some(index) => Ok(index),
			None => bail!(TileQuetError::Malformed(format!("missing column '{name}'"))),
		}
	}

	/// Row groups without usable statistics are assumed to contain the sentinel.
	fn may_contain_sentinel(&self, index: usize, id_column: usize) -> bool {
		let unsigned = self.schema().field(id_column).data_type() == &DataType::UInt64;
		let statistics = self.parquet_metadata().row_group(index).column(id_column).statistics();
		match statistics {
			Some(Statistics::Int64(stats)) => match (stats.min_opt(), stats.max_opt()) {
				(Some(min), Some(_)) if unsigned => *min as u64 == SENTINEL_TILE_ID,
				(Some(min), Some(max)) => *min <= 0 && *max >= 0,
				_ => true,
			},
			_ => true,
		}
	}

	fn batches(&self, columns: Vec<usize>, row_groups: Option<Vec<usize>>) -> Result<ParquetRecordBatchReader> {
		let file = File::open(&self.path).map_err(TileQuetError::Io)?;
		let builder = ParquetRecordBatchReaderBuilder::new_with_metadata(file, self.footer.clone());
		let projection = ProjectionMask::roots(builder.parquet_schema(), columns);
		let mut builder = builder.with_projection(projection);
		if let Some(row_groups) = row_groups {
			builder = builder.with_row_groups(row_groups);
		}
		Ok(builder.build()?)
	}
}

impl std::fmt::Debug for ContainerReader {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ContainerReader")
			.field("path", &self.path)
			.field("num_rows", &self.num_rows())
			.field("num_row_groups", &self.num_row_groups())
			.finish()
	}
}

/// Opens `path` and reads its metadata.
pub fn read_metadata(path: &Path) -> Result<TileQuetMetadata> {
	ContainerReader::open(path)?.metadata()
}

fn column<'a>(batch: &'a arrow_array::RecordBatch, name: &str) -> Result<&'a ArrayRef> {
	match batch.column_by_name(name) {
		Some(array) => Ok(array),
		None => bail!(TileQuetError::Malformed(format!("missing column '{name}'"))),
	}
}

fn id_values(array: &ArrayRef) -> Result<Vec<u64>> {
	if array.null_count() > 0 {
		bail!(TileQuetError::Malformed(String::from("column 'id' contains nulls")));
	}
	if let Some(ids) = array.as_primitive_opt::<UInt64Type>() {
		return Ok(ids.values().to_vec());
	}
	if let Some(ids) = array.as_primitive_opt::<Int64Type>() {
		return Ok(ids.values().iter().map(|id| *id as u64).collect());
	}
	bail!(TileQuetError::Malformed(format!(
		"column 'id' has type {}, expected an unsigned 64-bit integer",
		array.data_type()
	)))
}

fn text_values(array: &ArrayRef) -> Result<Vec<Option<String>>> {
	if let Some(texts) = array.as_string_opt::<i32>() {
		return Ok(texts.iter().map(|text| text.map(String::from)).collect());
	}
	if let Some(texts) = array.as_string_opt::<i64>() {
		return Ok(texts.iter().map(|text| text.map(String::from)).collect());
	}
	bail!(TileQuetError::Malformed(format!(
		"column 'metadata' has type {}, expected a string",
		array.data_type()
	)))
}

fn binary_values(array: &ArrayRef) -> Result<Vec<Option<Vec<u8>>>> {
	if let Some(blobs) = array.as_binary_opt::<i32>() {
		return Ok(blobs.iter().map(|blob| blob.map(<[u8]>::to_vec)).collect());
	}
	if let Some(blobs) = array.as_binary_opt::<i64>() {
		return Ok(blobs.iter().map(|blob| blob.map(<[u8]>::to_vec)).collect());
	}
	bail!(TileQuetError::Malformed(format!(
		"column 'payload' has type {}, expected binary",
		array.data_type()
	)))
}
