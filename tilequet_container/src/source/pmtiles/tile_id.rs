use anyhow::{Result, bail};
use tilequet_core::{MAX_TILE_LEVEL, TileCoord, TileQuetError};

/// Decodes a PMTiles tile id: the tiles of all shallower levels come first, then the
/// position of the tile along the Hilbert curve of its level.
pub fn tile_id_to_coord(tile_id: u64) -> Result<TileCoord> {
	let mut first_id = 0u64;
	for level in 0..=MAX_TILE_LEVEL {
		let level_size = 1u64 << (2 * u32::from(level));
		if tile_id - first_id < level_size {
			let n = 1u64 << level;
			let mut t = tile_id - first_id;
			let (mut x, mut y) = (0u64, 0u64);
			let mut s = 1u64;
			while s < n {
				let rx = (t / 2) & 1;
				let ry = (t ^ rx) & 1;
				rotate(s, &mut x, &mut y, rx, ry);
				x += s * rx;
				y += s * ry;
				t /= 4;
				s *= 2;
			}
			return TileCoord::new(level, x as u32, y as u32);
		}
		first_id += level_size;
	}
	bail!(TileQuetError::Malformed(format!(
		"tile id {tile_id} lies below level {MAX_TILE_LEVEL}"
	)))
}

fn rotate(s: u64, x: &mut u64, y: &mut u64, rx: u64, ry: u64) {
	if ry == 0 {
		if rx == 1 {
			*x = s - 1 - *x;
			*y = s - 1 - *y;
		}
		std::mem::swap(x, y);
	}
}
