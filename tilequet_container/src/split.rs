use crate::{ContainerReader, WriterOptions, schema::CONTAINER_EXTENSION, write_container};
use anyhow::{Result, bail};
use std::{
	collections::BTreeMap,
	fs,
	path::{Path, PathBuf},
};
use tilequet_core::{Quadbin, TileIndexCodec, TileQuetError, TileRow};
use tilequet_derive::context;

/// Splits a container into one container per zoom level.
///
/// Every level present in `path` becomes `output_dir/zoom_<N>.parquet`, holding the
/// sorted tiles of that level and a copy of the source metadata with
/// `min_zoom = max_zoom = N` and `num_tiles` set to the level's tile count.
/// The source is only read. Returns the written paths in ascending zoom order.
#[context("splitting '{}' by zoom level into '{}'", path.display(), output_dir.display())]
pub fn split_by_zoom(path: &Path, output_dir: &Path, options: &WriterOptions) -> Result<Vec<PathBuf>> {
	let reader = ContainerReader::open(path)?;
	let metadata = reader.metadata()?;

	let mut levels: BTreeMap<u8, Vec<TileRow>> = BTreeMap::new();
	reader.for_each_row(|row| {
		if row.is_sentinel() {
			return Ok(());
		}
		let coord = match Quadbin.decode(row.id) {
			Ok(coord) => coord,
			Err(err) => bail!(TileQuetError::Malformed(format!("cannot decode tile id {}: {err}", row.id))),
		};
		let payload = row.payload.unwrap_or_default();
		levels.entry(coord.level).or_default().push(TileRow::new(row.id, payload));
		Ok(())
	})?;

	fs::create_dir_all(output_dir).map_err(TileQuetError::Io)?;

	let mut written = Vec::with_capacity(levels.len());
	for (level, rows) in levels {
		let count = rows.len();
		let output = output_dir.join(format!("zoom_{level}.{CONTAINER_EXTENSION}"));
		let level_metadata = metadata.with_zoom_range(level, level).with_num_tiles(count as u64);
		write_container(&output, rows, &level_metadata, options)?;
		log::info!("zoom level {level}: {count} tiles written to '{}'", output.display());
		written.push(output);
	}
	Ok(written)
}
