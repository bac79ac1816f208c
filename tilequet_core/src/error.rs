use thiserror::Error;

/// Classified failures of the container APIs.
///
/// Functions return `anyhow::Result`; these values travel inside the `anyhow::Error`
/// and can be recovered with `err.downcast_ref::<TileQuetError>()`, also after
/// context messages have been attached.
#[derive(Debug, Error)]
pub enum TileQuetError {
	/// An expected row or file is absent.
	#[error("not found: {0}")]
	NotFound(String),

	/// Structurally present but semantically invalid, e.g. a null required field.
	#[error("malformed container: {0}")]
	Malformed(String),

	/// Text is present but is not valid JSON.
	#[error("invalid JSON: {0}")]
	Parse(#[from] serde_json::Error),

	/// An operation was invoked outside its allowed lifecycle phase.
	#[error("invalid state: {0}")]
	InvalidState(&'static str),

	/// The underlying storage failed.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}

impl TileQuetError {
	/// Finds the classified error inside an `anyhow` chain, if there is one.
	pub fn classify(err: &anyhow::Error) -> Option<&TileQuetError> {
		err.chain().find_map(|cause| cause.downcast_ref::<TileQuetError>())
	}
}
