use crate::Blob;

/// The reserved id of the sentinel row that carries the dataset metadata.
/// No spatial index may produce it for a tile.
pub const SENTINEL_TILE_ID: u64 = 0;

/// One data row of a container: a spatial index id and the opaque tile payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileRow {
	pub id: u64,
	pub payload: Blob,
}

impl TileRow {
	pub fn new(id: u64, payload: impl Into<Blob>) -> TileRow {
		TileRow {
			id,
			payload: payload.into(),
		}
	}

	#[must_use]
	pub fn is_sentinel(&self) -> bool {
		self.id == SENTINEL_TILE_ID
	}
}
