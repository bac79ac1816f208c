//! Core types of the TileQuet container format.
//!
//! - [`TileCoord`], [`TileType`], [`TileFormat`], [`Blob`] and [`TileRow`] describe tiles.
//! - [`TileIndexCodec`] maps tile coordinates to 64-bit ids; [`Quadbin`] is the codec
//!   every container declares in `tiling.scheme`.
//! - [`TileQuetMetadata`] is the dataset description stored in the sentinel row,
//!   created through [`MetadataBuilder`].
//! - [`TileQuetError`] classifies the failures callers may want to branch on.

mod error;
pub use error::*;

pub mod index;
pub use index::*;

pub mod metadata;
pub use metadata::*;

pub mod types;
pub use types::*;
