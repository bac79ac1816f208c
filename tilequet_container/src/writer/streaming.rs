//! Incremental writing with a bounded memory budget.
//!
//! Rows are buffered until their estimated size (`payload length + row_overhead`)
//! reaches `memory_threshold`. The buffer is then sorted by id and written as exactly
//! one row group. [`StreamingWriter::close`] appends a final row group holding only
//! the sentinel row.
//!
//! Each row group is sorted on its own, but groups follow each other in flush order:
//! once a second flush has happened the file as a whole is generally **not** sorted,
//! and the sentinel row is the first row of the *last* group. Set
//! [`StreamingOptions::sort_on_close`] to rewrite the finished file into global order,
//! which needs the whole dataset in memory once more.

use crate::{
	ContainerCompression, ContainerReader, WriterOptions,
	schema::{check_tile_id, container_schema, sentinel_batch, write_tiles, writer_properties},
	storage::StagedFile,
	write_container,
};
use anyhow::{Result, bail};
use parquet::arrow::ArrowWriter;
use std::{
	mem,
	path::{Path, PathBuf},
};
use tilequet_core::{Blob, TileQuetError, TileQuetMetadata, TileRow};
use tilequet_derive::context;

/// A row group holds at most this many rows, so one flush never gets split.
const MAX_ROWS_PER_GROUP: usize = i32::MAX as usize;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamingOptions {
	/// Estimated buffered bytes that trigger a flush.
	pub memory_threshold: usize,
	/// Bytes added to the estimate for every row, on top of its payload.
	pub row_overhead: usize,
	pub compression: ContainerCompression,
	/// Rewrite the file into global id order on close.
	pub sort_on_close: bool,
}

impl Default for StreamingOptions {
	fn default() -> Self {
		StreamingOptions {
			memory_threshold: 64 * 1024 * 1024,
			row_overhead: 64,
			compression: ContainerCompression::Uncompressed,
			sort_on_close: false,
		}
	}
}

enum WriterState {
	Open(Session),
	Closed,
}

struct Session {
	writer: ArrowWriter<StagedFile>,
	buffer: Vec<TileRow>,
	buffered_bytes: usize,
	#[cfg(test)]
	fail_next_flush: bool,
}

/// A single-owner write session: `create → add* → close`.
///
/// After `close` every further `add` or `close` fails with
/// [`TileQuetError::InvalidState`]. Dropping a writer that was never closed discards
/// everything written so far; nothing appears at the target path.
pub struct StreamingWriter {
	path: PathBuf,
	options: StreamingOptions,
	state: WriterState,
	count: u64,
	row_groups_written: usize,
}

impl StreamingWriter {
	#[context("creating streaming writer for '{}'", path.display())]
	pub fn create(path: &Path, options: StreamingOptions) -> Result<StreamingWriter> {
		let properties = writer_properties(MAX_ROWS_PER_GROUP, options.compression);
		let writer = ArrowWriter::try_new(StagedFile::create(path)?, container_schema(), Some(properties))?;
		log::debug!(
			"streaming into '{}' with a threshold of {} bytes",
			path.display(),
			options.memory_threshold
		);
		Ok(StreamingWriter {
			path: path.to_path_buf(),
			options,
			state: WriterState::Open(Session {
				writer,
				buffer: Vec::new(),
				buffered_bytes: 0,
				#[cfg(test)]
				fail_next_flush: false,
			}),
			count: 0,
			row_groups_written: 0,
		})
	}

	/// Buffers one tile, flushing a row group when the memory threshold is reached.
	///
	/// A failed flush closes the writer: the staged file is discarded and every later
	/// call fails with [`TileQuetError::InvalidState`].
	#[context("adding tile {id} to '{}'", self.path.display())]
	pub fn add(&mut self, id: u64, payload: impl Into<Blob>) -> Result<()> {
		let WriterState::Open(session) = &mut self.state else {
			bail!(TileQuetError::InvalidState("add called on a closed writer"));
		};
		check_tile_id(id)?;

		let row = TileRow::new(id, payload);
		session.buffered_bytes += row.payload.len() + self.options.row_overhead;
		session.buffer.push(row);
		self.count += 1;

		if session.buffered_bytes >= self.options.memory_threshold {
			if let Err(err) = session.flush() {
				log::warn!("flush failed, discarding '{}'", self.path.display());
				self.state = WriterState::Closed;
				return Err(err);
			}
			self.row_groups_written += 1;
		}
		Ok(())
	}

	/// Number of tiles added so far.
	pub fn count(&self) -> u64 {
		self.count
	}

	/// Current size estimate of the buffered rows.
	pub fn buffered_bytes(&self) -> usize {
		match &self.state {
			WriterState::Open(session) => session.buffered_bytes,
			WriterState::Closed => 0,
		}
	}

	/// Row groups emitted so far, including the sentinel group once closed.
	pub fn row_groups_written(&self) -> usize {
		self.row_groups_written
	}

	pub fn is_closed(&self) -> bool {
		matches!(self.state, WriterState::Closed)
	}

	/// Flushes the remaining rows, appends the sentinel row group and moves the file into place.
	///
	/// The writer is closed afterwards, also when finishing the file failed.
	#[context("closing streaming writer for '{}'", self.path.display())]
	pub fn close(&mut self, metadata: &TileQuetMetadata) -> Result<()> {
		let WriterState::Open(mut session) = mem::replace(&mut self.state, WriterState::Closed) else {
			bail!(TileQuetError::InvalidState("close called on a closed writer"));
		};

		if !session.buffer.is_empty() {
			session.flush()?;
			self.row_groups_written += 1;
		}

		session.writer.write(&sentinel_batch(metadata)?)?;
		session.writer.flush()?;
		self.row_groups_written += 1;
		session.writer.into_inner()?.commit()?;

		log::info!(
			"wrote {} tiles in {} row groups to '{}'",
			self.count,
			self.row_groups_written,
			self.path.display()
		);

		if self.options.sort_on_close {
			self.rewrite_sorted(metadata)?;
		}
		Ok(())
	}

	/// Reads the finished file back and rewrites it through [`write_container`].
	fn rewrite_sorted(&mut self, metadata: &TileQuetMetadata) -> Result<()> {
		log::debug!("re-sorting '{}'", self.path.display());
		let rows = ContainerReader::open(&self.path)?
			.read_rows()?
			.into_iter()
			.filter(|row| !row.is_sentinel())
			.map(|row| TileRow::new(row.id, row.payload.unwrap_or_default()))
			.collect::<Vec<_>>();
		let options = WriterOptions {
			compression: self.options.compression,
			..WriterOptions::default()
		};
		write_container(&self.path, rows, metadata, &options)?;
		self.row_groups_written = ContainerReader::open(&self.path)?.num_row_groups();
		Ok(())
	}
}

impl Session {
	fn flush(&mut self) -> Result<()> {
		#[cfg(test)]
		if mem::take(&mut self.fail_next_flush) {
			bail!("injected flush failure");
		}
		self.buffer.sort_unstable_by_key(|row| row.id);
		write_tiles(&mut self.writer, &self.buffer)?;
		self.writer.flush()?;
		log::debug!(
			"flushed a row group of {} tiles (~{} bytes)",
			self.buffer.len(),
			self.buffered_bytes
		);
		self.buffer.clear();
		self.buffered_bytes = 0;
		Ok(())
	}
}

impl Drop for StreamingWriter {
	fn drop(&mut self) {
		if let WriterState::Open(_) = self.state {
			log::warn!(
				"streaming writer for '{}' dropped before close; discarding {} tiles",
				self.path.display(),
				self.count
			);
		}
	}
}

impl std::fmt::Debug for StreamingWriter {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("StreamingWriter")
			.field("path", &self.path)
			.field("count", &self.count)
			.field("row_groups_written", &self.row_groups_written)
			.field("closed", &self.is_closed())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::*;
	use assert_fs::TempDir;
	use pretty_assertions::assert_eq;

	fn flush_every_add() -> StreamingOptions {
		StreamingOptions {
			memory_threshold: 1,
			..StreamingOptions::default()
		}
	}

	#[test]
	fn flush_per_add() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("stream.parquet");
		let mut writer = StreamingWriter::create(&path, flush_every_add()).unwrap();
		for id in 10..20u64 {
			writer.add(id, b"tile").unwrap();
		}
		assert_eq!(writer.count(), 10);
		assert_eq!(writer.row_groups_written(), 10);
		writer.close(&raster_metadata()).unwrap();
		assert_eq!(writer.row_groups_written(), 11);

		let reader = ContainerReader::open(&path).unwrap();
		assert!(reader.num_row_groups() >= 2);
		assert_eq!(reader.num_rows(), 11);
		let ids: Vec<u64> = reader.read_rows().unwrap().iter().map(|row| row.id).collect();
		assert_eq!(ids.iter().filter(|id| **id == 0).count(), 1);
	}

	#[test]
	fn groups_are_sorted_but_the_file_is_not() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("pieces.parquet");
		let options = StreamingOptions {
			memory_threshold: 3 * (4 + 64),
			..StreamingOptions::default()
		};
		let mut writer = StreamingWriter::create(&path, options).unwrap();
		for id in [30u64, 10, 20, 3, 1, 2, 25] {
			writer.add(id, b"tile").unwrap();
		}
		let metadata = raster_metadata();
		writer.close(&metadata).unwrap();

		let reader = ContainerReader::open(&path).unwrap();
		let groups: Vec<Vec<u64>> = (0..reader.num_row_groups())
			.map(|index| reader.row_group_ids(index).unwrap())
			.collect();
		assert_eq!(groups, [vec![10, 20, 30], vec![1, 2, 3], vec![25], vec![0]]);
		for group in &groups {
			assert!(group.windows(2).all(|pair| pair[0] <= pair[1]));
		}

		let ids: Vec<u64> = groups.concat();
		assert!(!ids.windows(2).all(|pair| pair[0] <= pair[1]));

		assert_eq!(reader.metadata().unwrap(), metadata);
	}

	#[test]
	fn single_flush_is_globally_sorted_apart_from_the_sentinel() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("single.parquet");
		let mut writer = StreamingWriter::create(&path, StreamingOptions::default()).unwrap();
		for id in [9u64, 4, 7] {
			writer.add(id, b"tile").unwrap();
		}
		assert_eq!(writer.row_groups_written(), 0);
		writer.close(&raster_metadata()).unwrap();

		let reader = ContainerReader::open(&path).unwrap();
		assert_eq!(reader.num_row_groups(), 2);
		assert_eq!(reader.row_group_ids(0).unwrap(), [4, 7, 9]);
		assert_eq!(reader.row_group_ids(1).unwrap(), [0]);
	}

	#[test]
	fn buffered_bytes_stay_below_the_threshold() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("bounded.parquet");
		let options = StreamingOptions {
			memory_threshold: 1000,
			row_overhead: 10,
			..StreamingOptions::default()
		};
		let mut writer = StreamingWriter::create(&path, options.clone()).unwrap();
		let mut largest_payload = 0;
		for i in 0..200u64 {
			let payload = vec![0u8; (i as usize * 37) % 300];
			largest_payload = largest_payload.max(payload.len() + options.row_overhead);
			writer.add(i + 1, payload).unwrap();
			assert!(writer.buffered_bytes() < options.memory_threshold);
			assert!(writer.buffered_bytes() <= options.memory_threshold + largest_payload);
		}
		assert_eq!(writer.count(), 200);
		assert!(writer.row_groups_written() > 1);
		writer.close(&raster_metadata()).unwrap();
		assert_eq!(writer.buffered_bytes(), 0);
	}

	#[test]
	fn operations_after_close_fail() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("closed.parquet");
		let mut writer = StreamingWriter::create(&path, StreamingOptions::default()).unwrap();
		writer.add(1, b"tile").unwrap();
		writer.close(&raster_metadata()).unwrap();
		assert!(writer.is_closed());

		let err = writer.add(2, b"tile").unwrap_err();
		assert!(matches!(
			TileQuetError::classify(&err),
			Some(TileQuetError::InvalidState(_))
		));
		let err = writer.close(&raster_metadata()).unwrap_err();
		assert!(matches!(
			TileQuetError::classify(&err),
			Some(TileQuetError::InvalidState(_))
		));
		assert_eq!(writer.count(), 1);
	}

	#[test]
	fn failed_flush_closes_the_writer() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("failed.parquet");
		let mut writer = StreamingWriter::create(&path, flush_every_add()).unwrap();
		writer.add(1, b"tile").unwrap();
		if let WriterState::Open(session) = &mut writer.state {
			session.fail_next_flush = true;
		}

		let err = writer.add(2, b"tile").unwrap_err();
		assert!(format!("{err:#}").contains("injected flush failure"));
		assert!(writer.is_closed());
		assert_eq!(writer.buffered_bytes(), 0);

		let err = writer.add(3, b"tile").unwrap_err();
		assert!(matches!(
			TileQuetError::classify(&err),
			Some(TileQuetError::InvalidState(_))
		));
		let err = writer.close(&raster_metadata()).unwrap_err();
		assert!(matches!(
			TileQuetError::classify(&err),
			Some(TileQuetError::InvalidState(_))
		));
		assert!(!path.exists());
		assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
	}

	#[test]
	fn reserved_id_is_rejected() {
		let dir = TempDir::new().unwrap();
		let mut writer = StreamingWriter::create(&dir.path().join("x.parquet"), StreamingOptions::default()).unwrap();
		let err = writer.add(0, b"tile").unwrap_err();
		assert!(matches!(
			TileQuetError::classify(&err),
			Some(TileQuetError::Malformed(_))
		));
		assert_eq!(writer.count(), 0);
	}

	#[test]
	fn dropping_an_open_writer_leaves_nothing_behind() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("dropped.parquet");
		let mut writer = StreamingWriter::create(&path, flush_every_add()).unwrap();
		writer.add(1, b"tile").unwrap();
		writer.add(2, b"tile").unwrap();
		drop(writer);

		assert!(!path.exists());
		assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
	}

	#[test]
	fn sort_on_close_restores_global_order() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("sorted.parquet");
		let options = StreamingOptions {
			sort_on_close: true,
			..flush_every_add()
		};
		let mut writer = StreamingWriter::create(&path, options).unwrap();
		for id in [5u64, 3, 9, 1] {
			writer.add(id, vec![id as u8]).unwrap();
		}
		let metadata = raster_metadata();
		writer.close(&metadata).unwrap();
		assert_eq!(writer.row_groups_written(), 1);

		let reader = ContainerReader::open(&path).unwrap();
		let rows = reader.read_rows().unwrap();
		let ids: Vec<u64> = rows.iter().map(|row| row.id).collect();
		assert_eq!(ids, [0, 1, 3, 5, 9]);
		assert_eq!(rows[4].payload.as_deref(), Some(&[9u8][..]));
		assert_eq!(reader.metadata().unwrap(), metadata);
	}
}
