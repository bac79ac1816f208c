//! Crash-safe file creation: write to a temporary file next to the target, then
//! fsync and rename it over the target on success.
//!
//! A [`StagedFile`] that is dropped without [`commit`](StagedFile::commit) removes
//! its temporary file, so the target path never holds a truncated container.

use anyhow::{Context, Result};
use std::{
	io::{self, Write},
	path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tilequet_derive::context;

pub struct StagedFile {
	target: PathBuf,
	file: NamedTempFile,
}

impl StagedFile {
	#[context("staging a temporary file for '{}'", target.display())]
	pub fn create(target: &Path) -> Result<StagedFile> {
		let directory = match target.parent() {
			Some(parent) if !parent.as_os_str().is_empty() => parent,
			_ => Path::new("."),
		};
		let file = NamedTempFile::new_in(directory)?;
		log::trace!("staging '{}' at '{}'", target.display(), file.path().display());
		Ok(StagedFile {
			target: target.to_path_buf(),
			file,
		})
	}

	pub fn target(&self) -> &Path {
		&self.target
	}

	/// Flushes the data to disk and atomically replaces the target.
	#[context("committing '{}'", self.target.display())]
	pub fn commit(mut self) -> Result<()> {
		self.file.flush()?;
		self.file.as_file().sync_all()?;
		self.file
			.persist(&self.target)
			.with_context(|| format!("renaming the staged file to '{}'", self.target.display()))?;
		log::debug!("committed '{}'", self.target.display());
		Ok(())
	}
}

impl Write for StagedFile {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		self.file.write(buf)
	}

	fn flush(&mut self) -> io::Result<()> {
		self.file.flush()
	}
}

impl std::fmt::Debug for StagedFile {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("StagedFile")
			.field("target", &self.target)
			.field("staged", &self.file.path())
			.finish()
	}
}
