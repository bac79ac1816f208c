//! The dataset description stored as JSON in a container's sentinel row.
//!
//! A [`TileQuetMetadata`] record is created once through [`MetadataBuilder`] and is
//! immutable afterwards. Serialized, it looks like:
//!
//! ```json
//! {
//!   "file_format": "tilequet",
//!   "version": "0.1.0",
//!   "tile_type": "raster",
//!   "tile_format": "png",
//!   "bounds": [-180.0, -85.051129, 180.0, 85.051129],
//!   "bounds_crs": "EPSG:4326",
//!   "min_zoom": 0,
//!   "max_zoom": 14,
//!   "num_tiles": 0,
//!   "tiling": { "scheme": "quadbin" },
//!   "processing": { "created_by": "tilequet 0.1.0", "created_at": "2026-01-01T00:00:00Z" }
//! }
//! ```

mod builder;
pub use builder::*;

mod record;
pub use record::*;

mod tilejson;
pub use tilejson::*;

/// Value of the `file_format` field.
pub const FILE_FORMAT: &str = "tilequet";

/// Version of the container format written by this crate.
pub const FORMAT_VERSION: &str = "0.1.0";

/// Versions this crate knows how to read.
pub const SUPPORTED_VERSIONS: &[&str] = &[FORMAT_VERSION];

/// CRS of the `bounds` field.
pub const BOUNDS_CRS: &str = "EPSG:4326";

/// `[west, south, east, north]` of the whole Web Mercator world.
pub const WORLD_BOUNDS: [f64; 4] = [-180.0, -85.051129, 180.0, 85.051129];

/// Default zoom range when an adapter cannot determine one.
pub const DEFAULT_MIN_ZOOM: u8 = 0;
pub const DEFAULT_MAX_ZOOM: u8 = 14;

/// Tool identity stamped into `processing.created_by`.
#[must_use]
pub fn created_by() -> String {
	format!("tilequet {}", env!("CARGO_PKG_VERSION"))
}
