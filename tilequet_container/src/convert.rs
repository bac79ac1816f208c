use crate::{StreamingOptions, StreamingWriter, TileSource, WriterOptions, write_container};
use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use tilequet_core::{TileFormat, TileQuetMetadata, TileType};
use tilequet_derive::context;

/// Which writer a conversion uses.
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConversionMode {
	/// Collect all tiles, sort them globally, write once.
	#[default]
	Bulk,
	/// Write row groups while reading, with bounded memory.
	Streaming,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConvertOptions {
	pub mode: ConversionMode,
	/// Used in [`ConversionMode::Bulk`].
	pub writer: WriterOptions,
	/// Used in [`ConversionMode::Streaming`].
	pub streaming: StreamingOptions,
}

/// What ended up in the container.
///
/// `num_tiles` counts the rows written; the other fields are read back from the
/// source's record and are `None` where the source declares something unknown.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConversionSummary {
	pub num_tiles: u64,
	pub tile_type: Option<TileType>,
	pub tile_format: Option<TileFormat>,
	pub min_zoom: Option<u8>,
	pub max_zoom: Option<u8>,
}

impl ConversionSummary {
	fn new(num_tiles: u64, metadata: &TileQuetMetadata) -> ConversionSummary {
		ConversionSummary {
			num_tiles,
			tile_type: metadata.tile_type(),
			tile_format: metadata.tile_format(),
			min_zoom: metadata.min_zoom(),
			max_zoom: metadata.max_zoom(),
		}
	}
}

/// Drives all tiles of `source` into a new container at `path`.
///
/// The declared `num_tiles` is set to the number of rows actually written.
#[context("converting {} into '{}'", source.source_format(), path.display())]
pub fn convert(source: &mut dyn TileSource, path: &Path, options: &ConvertOptions) -> Result<ConversionSummary> {
	let metadata = source.metadata()?;
	log::info!(
		"converting {} tiles (format {}) in {:?} mode",
		source.source_format(),
		metadata.get("tile_format").unwrap_or(&serde_json::Value::Null),
		options.mode
	);

	let num_tiles = match options.mode {
		ConversionMode::Bulk => {
			let mut rows = Vec::new();
			source.for_each_tile(&mut |row| {
				rows.push(row);
				Ok(())
			})?;
			let num_tiles = rows.len() as u64;
			write_container(path, rows, &metadata.with_num_tiles(num_tiles), &options.writer)?;
			num_tiles
		}
		ConversionMode::Streaming => {
			let mut writer = StreamingWriter::create(path, options.streaming.clone())?;
			source.for_each_tile(&mut |row| writer.add(row.id, row.payload))?;
			let num_tiles = writer.count();
			writer.close(&metadata.with_num_tiles(num_tiles))?;
			num_tiles
		}
	};

	Ok(ConversionSummary::new(num_tiles, &metadata))
}
