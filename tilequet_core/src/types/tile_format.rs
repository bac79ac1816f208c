//! This module defines the [`TileFormat`] enum, the payload encoding tag stored in the
//! `tile_format` metadata field.
//!
//! The container does not decode payloads; the format only describes them. Adapters
//! that lack an explicit format can sniff it from the first payload with
//! [`TileFormat::detect`].
//!
//! ```rust
//! use tilequet_core::{TileFormat, TileType};
//!
//! let format = TileFormat::detect(b"\x89PNG\r\n\x1a\n");
//! assert_eq!(format, TileFormat::Png);
//! assert_eq!(format.tile_type(), TileType::Raster);
//! assert_eq!(TileFormat::try_from("jpg").unwrap(), TileFormat::Jpeg);
//! ```

use crate::TileType;
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileFormat {
	Png,
	#[serde(alias = "jpg")]
	Jpeg,
	Webp,
	Avif,
	#[serde(alias = "mvt")]
	Pbf,
	Gltf,
	Glb,
	B3dm,
	Pnts,
	Unknown,
}

impl TileFormat {
	#[must_use]
	pub fn as_str(&self) -> &'static str {
		use TileFormat::*;
		match self {
			Png => "png",
			Jpeg => "jpeg",
			Webp => "webp",
			Avif => "avif",
			Pbf => "pbf",
			Gltf => "gltf",
			Glb => "glb",
			B3dm => "b3dm",
			Pnts => "pnts",
			Unknown => "unknown",
		}
	}

	/// The tile kind implied by this payload format. Unrecognised payloads count as raster.
	#[must_use]
	pub fn tile_type(&self) -> TileType {
		use TileFormat::*;
		match self {
			Pbf => TileType::Vector,
			Gltf | Glb | B3dm | Pnts => TileType::ThreeD,
			Png | Jpeg | Webp | Avif | Unknown => TileType::Raster,
		}
	}

	/// Guesses the format from the leading bytes of a payload.
	#[must_use]
	pub fn detect(data: &[u8]) -> TileFormat {
		use TileFormat::*;
		match data {
			[0x89, b'P', b'N', b'G', ..] => Png,
			[0xFF, 0xD8, 0xFF, ..] => Jpeg,
			[b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Webp,
			[_, _, _, _, b'f', b't', b'y', b'p', b'a', b'v', b'i', b'f', ..] => Avif,
			[b'g', b'l', b'T', b'F', ..] => Glb,
			[b'b', b'3', b'd', b'm', ..] => B3dm,
			[b'p', b'n', b't', b's', ..] => Pnts,
			// gzip-compressed protobuf, the usual MBTiles encoding of vector tiles
			[0x1F, 0x8B, ..] => Pbf,
			// uncompressed protobuf starting with a length-delimited field 1..4
			[0x0A | 0x12 | 0x1A | 0x22, ..] => Pbf,
			[b'{', ..] => Gltf,
			_ => Unknown,
		}
	}
}

impl TryFrom<&str> for TileFormat {
	type Error = anyhow::Error;

	fn try_from(value: &str) -> Result<Self> {
		use TileFormat::*;
		Ok(match value.trim().to_lowercase().as_str() {
			"png" => Png,
			"jpg" | "jpeg" => Jpeg,
			"webp" => Webp,
			"avif" => Avif,
			"pbf" | "mvt" => Pbf,
			"gltf" => Gltf,
			"glb" => Glb,
			"b3dm" => B3dm,
			"pnts" => Pnts,
			"unknown" => Unknown,
			_ => bail!("unknown tile format '{value}'"),
		})
	}
}

impl Display for TileFormat {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}
