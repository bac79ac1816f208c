//! The two write paths.
//!
//! - [`write_container`] sorts the whole dataset in memory and produces a globally sorted container.
//! - [`StreamingWriter`] keeps memory bounded and only sorts within each row group.

mod bulk;
pub use bulk::*;

mod streaming;
pub use streaming::*;
