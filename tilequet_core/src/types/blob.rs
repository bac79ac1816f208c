//! This module provides the [`Blob`] struct, an owned tile payload.
//!
//! The container never interprets payload bytes, so a `Blob` is little more than a
//! `Vec<u8>` with conversions and a compact `Debug` output (large tiles would flood logs).
//!
//! ```rust
//! use tilequet_core::Blob;
//!
//! let blob = Blob::from("pbf");
//! assert_eq!(blob.len(), 3);
//! assert_eq!(blob.as_slice(), b"pbf");
//! ```

use std::fmt::Debug;

#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Blob(Vec<u8>);

impl Blob {
	#[must_use]
	pub fn new_empty() -> Blob {
		Blob(Vec::new())
	}

	#[must_use]
	pub fn as_slice(&self) -> &[u8] {
		self.0.as_slice()
	}

	#[must_use]
	pub fn into_vec(self) -> Vec<u8> {
		self.0
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl From<Vec<u8>> for Blob {
	fn from(value: Vec<u8>) -> Self {
		Blob(value)
	}
}

impl From<&[u8]> for Blob {
	fn from(value: &[u8]) -> Self {
		Blob(value.to_vec())
	}
}

impl<const N: usize> From<&[u8; N]> for Blob {
	fn from(value: &[u8; N]) -> Self {
		Blob(value.to_vec())
	}
}

impl From<&str> for Blob {
	fn from(value: &str) -> Self {
		Blob(value.as_bytes().to_vec())
	}
}

impl AsRef<[u8]> for Blob {
	fn as_ref(&self) -> &[u8] {
		&self.0
	}
}

impl Debug for Blob {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		const PREVIEW: usize = 16;
		let head = &self.0[..self.0.len().min(PREVIEW)];
		let ellipsis = if self.0.len() > PREVIEW { " …" } else { "" };
		write!(f, "Blob({} bytes: {head:02X?}{ellipsis})", self.0.len())
	}
}
