//! The kind of content a container holds: `vector`, `raster` or `3d` tiles.

use anyhow::bail;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileType {
	#[serde(rename = "vector")]
	Vector,
	#[serde(rename = "raster")]
	Raster,
	#[serde(rename = "3d")]
	ThreeD,
}

impl TileType {
	/// All values accepted in the `tile_type` metadata field.
	pub const ALL: [TileType; 3] = [TileType::Vector, TileType::Raster, TileType::ThreeD];

	/// Returns the string stored in the metadata record.
	///
	/// ```
	/// use tilequet_core::TileType;
	///
	/// assert_eq!(TileType::Raster.as_str(), "raster");
	/// assert_eq!(TileType::ThreeD.as_str(), "3d");
	/// ```
	#[must_use]
	pub fn as_str(&self) -> &'static str {
		use TileType::*;
		match self {
			Vector => "vector",
			Raster => "raster",
			ThreeD => "3d",
		}
	}
}

impl std::fmt::Display for TileType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

impl TryFrom<&str> for TileType {
	type Error = anyhow::Error;

	fn try_from(value: &str) -> Result<Self, Self::Error> {
		match value {
			"vector" => Ok(TileType::Vector),
			"raster" | "image" => Ok(TileType::Raster),
			"3d" => Ok(TileType::ThreeD),
			_ => bail!("invalid tile_type '{value}', expected 'vector', 'raster', or '3d'"),
		}
	}
}
