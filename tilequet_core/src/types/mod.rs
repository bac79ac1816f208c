//! Contains tile coordinates, tile kinds and formats, payload blobs and rows.

mod blob;
pub use blob::*;

mod tile_coord;
pub use tile_coord::*;

mod tile_format;
pub use tile_format::*;

mod tile_row;
pub use tile_row::*;

mod tile_type;
pub use tile_type::*;
