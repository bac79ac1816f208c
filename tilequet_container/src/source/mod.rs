//! Adapters that feed tiles from other formats into a container.

mod geopackage;
pub use geopackage::*;

mod mbtiles;
pub use mbtiles::*;

mod pmtiles;
pub use pmtiles::PMTilesSource;

use anyhow::Result;
use tilequet_core::{TileQuetMetadata, TileRow};

/// A producer of `(id, payload)` rows plus the dataset description derived from its source.
///
/// Ids are spatial index ids (see [`tilequet_core::Quadbin`]) and must not be `0`.
/// Order does not matter; writers sort as far as their mode allows.
pub trait TileSource {
	/// Short name of the source format, recorded as `processing.source_format`.
	fn source_format(&self) -> &str;

	/// Best-effort metadata; `num_tiles` is replaced by the actual count when converting.
	fn metadata(&self) -> Result<TileQuetMetadata>;

	/// Calls `callback` once per tile and stops at the first error.
	fn for_each_tile(&mut self, callback: &mut dyn FnMut(TileRow) -> Result<()>) -> Result<()>;
}
