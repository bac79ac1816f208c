use crate::{
	schema::{WriterOptions, check_tile_id, container_schema, sentinel_batch, write_tiles, writer_properties},
	storage::StagedFile,
};
use anyhow::Result;
use parquet::arrow::ArrowWriter;
use std::path::Path;
use tilequet_core::{TileQuetMetadata, TileRow};
use tilequet_derive::context;

/// Writes a complete container in one go.
///
/// The rows are sorted ascending by id and preceded by the sentinel row, so the
/// file is globally sorted and the metadata row comes first. Rows are packed into
/// row groups of `options.row_group_size`. Ids are expected to be unique; duplicates
/// are written as they are.
///
/// The file is staged next to `path` and only renamed into place once complete.
#[context("writing container '{}'", path.display())]
pub fn write_container(
	path: &Path,
	mut rows: Vec<TileRow>,
	metadata: &TileQuetMetadata,
	options: &WriterOptions,
) -> Result<()> {
	for row in &rows {
		check_tile_id(row.id)?;
	}

	log::debug!("sorting {} tiles", rows.len());
	rows.sort_unstable_by_key(|row| row.id);

	let properties = writer_properties(options.row_group_size, options.compression);
	let mut writer = ArrowWriter::try_new(StagedFile::create(path)?, container_schema(), Some(properties))?;
	writer.write(&sentinel_batch(metadata)?)?;
	write_tiles(&mut writer, &rows)?;
	writer.into_inner()?.commit()?;

	log::info!(
		"wrote {} tiles to '{}' ({} rows per group, {})",
		rows.len(),
		path.display(),
		options.row_group_size,
		options.compression
	);
	Ok(())
}
