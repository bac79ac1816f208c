//! Reading, writing, validating and splitting TileQuet containers.
//!
//! A container is a Parquet file with the columns `id`, `metadata` and `payload`
//! (see [`schema`]). One sentinel row with `id = 0` carries the dataset metadata as
//! JSON, every other row carries one tile.
//!
//! - [`write_container`]: bulk writer, globally sorted output
//! - [`StreamingWriter`]: bounded-memory writer, sorted per row group only
//! - [`ContainerReader`], [`read_metadata`]: footer, metadata and row access
//! - [`validate`]: structural checks producing a [`ValidationResult`]
//! - [`split_by_zoom`]: one container per zoom level
//! - [`TileSource`], [`convert`]: feeding other formats into a container, with
//!   [`MBTilesSource`], [`PMTilesSource`] and [`GeoPackageSource`]
//!
//! ```no_run
//! use tilequet_container::{StreamingOptions, StreamingWriter, validate};
//! use tilequet_core::{TileFormat, TileQuetMetadata, TileType};
//! use std::path::Path;
//!
//! let path = Path::new("tiles.parquet");
//! let mut writer = StreamingWriter::create(path, StreamingOptions::default())?;
//! writer.add(5192650370358181887, b"\x89PNG...")?;
//! let metadata = TileQuetMetadata::builder(TileType::Raster, TileFormat::Png)
//! 	.max_zoom(0)
//! 	.num_tiles(writer.count())
//! 	.build()?;
//! writer.close(&metadata)?;
//!
//! assert!(validate(path).is_valid);
//! # Ok::<(), anyhow::Error>(())
//! ```

mod convert;
pub use convert::*;

mod reader;
pub use reader::*;

pub mod schema;
pub use schema::{ContainerCompression, WriterOptions};

mod source;
pub use source::*;

mod split;
pub use split::*;

pub mod storage;

mod validator;
pub use validator::*;

mod writer;
pub use writer::*;

#[cfg(test)]
mod testing;
