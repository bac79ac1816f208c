//! The Quadbin spatial index.
//!
//! A Quadbin cell packs a tile into 64 bits:
//!
//! | bits    | content                                          |
//! |---------|--------------------------------------------------|
//! | 63      | `0`                                              |
//! | 59..=62 | mode, always `1`                                 |
//! | 57..=58 | mode dependent, always `0`                       |
//! | 52..=56 | zoom level (0..=26)                              |
//! | 0..=51  | Morton-interleaved `x`/`y`, padded with `1` bits |
//!
//! Ids of the same level sort in Z-order, and every id is far from `0`, the sentinel.
//!
//! ```
//! use tilequet_core::{Quadbin, TileCoord, TileIndexCodec};
//!
//! let coord = TileCoord::new(4, 9, 8).unwrap();
//! let id = Quadbin.encode(&coord).unwrap();
//! assert_eq!(id, 5209574053332910079);
//! assert_eq!(Quadbin.decode(id).unwrap(), coord);
//! ```

use super::TileIndexCodec;
use crate::{MAX_TILE_LEVEL, TileCoord};
use anyhow::{Result, ensure};

const HEADER: u64 = 0x4800_0000_0000_0000;
const HEADER_MASK: u64 = 0xFE00_0000_0000_0000;
const FOOTER: u64 = 0x000F_FFFF_FFFF_FFFF;

const B: [u64; 6] = [
	0x5555_5555_5555_5555,
	0x3333_3333_3333_3333,
	0x0F0F_0F0F_0F0F_0F0F,
	0x00FF_00FF_00FF_00FF,
	0x0000_FFFF_0000_FFFF,
	0x0000_0000_FFFF_FFFF,
];
const S: [u32; 5] = [1, 2, 4, 8, 16];

/// The Quadbin codec (`tiling.scheme = "quadbin"`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Quadbin;

impl Quadbin {
	pub const SCHEME: &'static str = "quadbin";

	/// Level of a cell without validating the rest of it.
	#[must_use]
	pub fn level_of(id: u64) -> u8 {
		((id >> 52) & 0x1F) as u8
	}
}

impl TileIndexCodec for Quadbin {
	fn scheme(&self) -> &'static str {
		Quadbin::SCHEME
	}

	fn encode(&self, coord: &TileCoord) -> Result<u64> {
		let level = u64::from(coord.level);
		ensure!(
			coord.level <= MAX_TILE_LEVEL,
			"quadbin supports levels up to {MAX_TILE_LEVEL}, got {}",
			coord.level
		);
		let x = spread(u64::from(coord.x) << (32 - level));
		let y = spread(u64::from(coord.y) << (32 - level));
		Ok(HEADER | (level << 52) | ((x | (y << 1)) >> 12) | (FOOTER >> (level * 2)))
	}

	fn decode(&self, id: u64) -> Result<TileCoord> {
		ensure!(id & HEADER_MASK == HEADER, "id {id} is not a quadbin cell (invalid header)");
		let level = Quadbin::level_of(id);
		ensure!(level <= MAX_TILE_LEVEL, "id {id} has invalid quadbin level {level}");
		let unused = FOOTER >> (u64::from(level) * 2);
		ensure!(id & unused == unused, "id {id} has invalid quadbin padding");

		let shift = 32 - u32::from(level);
		let q = (id & FOOTER) << 12;
		let x = (squeeze(q) >> shift) as u32;
		let y = (squeeze(q >> 1) >> shift) as u32;
		TileCoord::new(level, x, y)
	}
}

/// Spreads the lower 32 bits of `v` onto the even bit positions.
fn spread(mut v: u64) -> u64 {
	v = (v | (v << S[4])) & B[4];
	v = (v | (v << S[3])) & B[3];
	v = (v | (v << S[2])) & B[2];
	v = (v | (v << S[1])) & B[1];
	(v | (v << S[0])) & B[0]
}

/// Inverse of [`spread`]: collects the even bit positions into the lower 32 bits.
fn squeeze(v: u64) -> u64 {
	let mut v = v & B[0];
	v = (v | (v >> S[0])) & B[1];
	v = (v | (v >> S[1])) & B[2];
	v = (v | (v >> S[2])) & B[3];
	v = (v | (v >> S[3])) & B[4];
	(v | (v >> S[4])) & B[5]
}
