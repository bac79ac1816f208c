//! Tile coordinates in a power-of-two (XYZ) tile pyramid.
//!
//! ```
//! use tilequet_core::TileCoord;
//!
//! let coord = TileCoord::new(4, 9, 8).unwrap();
//! assert_eq!(coord.level, 4);
//! assert_eq!(coord.flip_y().y, 7);
//! ```

use anyhow::{Result, ensure};
use std::fmt::{self, Debug, Display};

/// Highest zoom level any supported spatial index can address.
pub const MAX_TILE_LEVEL: u8 = 26;

/// A tile address with zoom `level`, column `x` and row `y` (row 0 is the northern edge).
#[derive(Eq, PartialEq, Clone, Copy, Hash, PartialOrd, Ord)]
pub struct TileCoord {
	pub level: u8,
	pub x: u32,
	pub y: u32,
}

impl TileCoord {
	/// Creates a coordinate, checking `level <= 26` and `x, y < 2^level`.
	pub fn new(level: u8, x: u32, y: u32) -> Result<TileCoord> {
		ensure!(
			level <= MAX_TILE_LEVEL,
			"level ({level}) must be <= {MAX_TILE_LEVEL}"
		);
		let size = 1u64 << level;
		ensure!(u64::from(x) < size, "x ({x}) out of bounds for level {level}");
		ensure!(u64::from(y) < size, "y ({y}) out of bounds for level {level}");
		Ok(TileCoord { level, x, y })
	}

	/// Mirrors the row index, converting between XYZ and TMS row numbering.
	#[must_use]
	pub fn flip_y(&self) -> TileCoord {
		let max_index = (1u64 << self.level) - 1;
		TileCoord {
			level: self.level,
			x: self.x,
			y: (max_index - u64::from(self.y)) as u32,
		}
	}

	/// Creates a coordinate from a TMS-numbered row, as stored in MBTiles.
	pub fn from_tms(level: u8, x: u32, tms_y: u32) -> Result<TileCoord> {
		Ok(TileCoord::new(level, x, tms_y)?.flip_y())
	}
}

impl Debug for TileCoord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "TileCoord({}, [{}, {}])", self.level, self.x, self.y)
	}
}

impl Display for TileCoord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}/{}", self.level, self.x, self.y)
	}
}
