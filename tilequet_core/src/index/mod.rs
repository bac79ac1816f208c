//! Spatial indices: bijections between [`TileCoord`]s and 64-bit row ids.
//!
//! Containers are sorted by these ids, so a codec that keeps neighbouring tiles close
//! in id space lets readers prune row groups by `id` statistics.

mod quadbin;
pub use quadbin::*;

use crate::TileCoord;
use anyhow::Result;

/// A spatial index codec as declared in the `tiling.scheme` metadata field.
///
/// Implementations must be bijective over the coordinates they accept, and must
/// never return [`SENTINEL_TILE_ID`](crate::SENTINEL_TILE_ID) from `encode`.
pub trait TileIndexCodec {
	/// The identifier stored in `tiling.scheme`.
	fn scheme(&self) -> &'static str;

	/// Maps a tile coordinate to its id.
	fn encode(&self, coord: &TileCoord) -> Result<u64>;

	/// Maps an id back to its tile coordinate; fails for ids that are not valid cells.
	fn decode(&self, id: u64) -> Result<TileCoord>;
}
