use super::MetadataBuilder;
use crate::{TileFormat, TileQuetError, TileType};
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};

/// Dataset-level description of a container, serialized into the sentinel row.
///
/// The record is the JSON object itself: reading a sentinel keeps every key and
/// value exactly as stored, and serializing writes them back unchanged. The typed
/// getters are views; they return `None` when a field is absent or does not have
/// the expected shape (a `tile_format` this crate does not know, a 2-element
/// `center`, ...). Structural checks of a stored record are the job of the validator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileQuetMetadata {
	record: Map<String, Value>,
}

/// Provenance of a container: which source format it came from, which tool wrote it, and when.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Processing {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub source_format: Option<String>,
	pub created_by: String,
	pub created_at: String,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

/// A vector tile layer descriptor, as in TileJSON `vector_layers`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VectorLayer {
	pub id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub minzoom: Option<u8>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub maxzoom: Option<u8>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub fields: Option<Map<String, Value>>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl VectorLayer {
	pub fn new(id: impl Into<String>) -> VectorLayer {
		VectorLayer {
			id: id.into(),
			description: None,
			minzoom: None,
			maxzoom: None,
			fields: None,
			extra: Map::new(),
		}
	}
}

impl TileQuetMetadata {
	/// Starts a new record; see [`MetadataBuilder`] for defaults.
	pub fn builder(tile_type: TileType, tile_format: TileFormat) -> MetadataBuilder {
		MetadataBuilder::new(tile_type, tile_format)
	}

	/// Wraps a JSON object as it is.
	pub fn from_map(record: Map<String, Value>) -> TileQuetMetadata {
		TileQuetMetadata { record }
	}

	/// Wraps a JSON value; anything but an object is [`TileQuetError::Malformed`].
	pub fn from_value(value: Value) -> Result<TileQuetMetadata> {
		match value {
			Value::Object(record) => Ok(TileQuetMetadata { record }),
			other => bail!(TileQuetError::Malformed(format!(
				"the metadata is not a JSON object: {}",
				json_kind(&other)
			))),
		}
	}

	/// Parses the sentinel row's text.
	///
	/// Text that is not JSON is [`TileQuetError::Parse`], JSON that is not an object is
	/// [`TileQuetError::Malformed`]. Nothing else is checked.
	pub fn from_json(text: &str) -> Result<TileQuetMetadata> {
		let value: Value = serde_json::from_str(text).map_err(TileQuetError::Parse)?;
		TileQuetMetadata::from_value(value)
	}

	/// Serializes the record into compact JSON text, keys in stored order.
	pub fn to_json(&self) -> Result<String> {
		serde_json::to_string(&self.record).map_err(|err| TileQuetError::Parse(err).into())
	}

	pub fn to_value(&self) -> Value {
		Value::Object(self.record.clone())
	}

	/// A copy with `min_zoom` and `max_zoom` replaced; every other key is kept untouched.
	#[must_use]
	pub fn with_zoom_range(&self, min_zoom: u8, max_zoom: u8) -> TileQuetMetadata {
		let mut record = self.record.clone();
		record.insert(String::from("min_zoom"), json!(min_zoom));
		record.insert(String::from("max_zoom"), json!(max_zoom));
		TileQuetMetadata { record }
	}

	/// A copy with `num_tiles` replaced.
	#[must_use]
	pub fn with_num_tiles(&self, num_tiles: u64) -> TileQuetMetadata {
		let mut record = self.record.clone();
		record.insert(String::from("num_tiles"), json!(num_tiles));
		TileQuetMetadata { record }
	}

	/// The raw value of a top-level key.
	pub fn get(&self, key: &str) -> Option<&Value> {
		self.record.get(key)
	}

	pub fn as_map(&self) -> &Map<String, Value> {
		&self.record
	}

	fn text(&self, key: &str) -> Option<&str> {
		self.record.get(key)?.as_str()
	}

	fn typed<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
		T::deserialize(self.record.get(key)?).ok()
	}

	pub fn file_format(&self) -> Option<&str> {
		self.text("file_format")
	}

	pub fn version(&self) -> Option<&str> {
		self.text("version")
	}

	pub fn tile_type(&self) -> Option<TileType> {
		self.typed("tile_type")
	}

	pub fn tile_format(&self) -> Option<TileFormat> {
		self.typed("tile_format")
	}

	/// `[west, south, east, north]` in [`bounds_crs`](Self::bounds_crs).
	pub fn bounds(&self) -> Option<[f64; 4]> {
		self.typed("bounds")
	}

	pub fn bounds_crs(&self) -> Option<&str> {
		self.text("bounds_crs")
	}

	/// `[longitude, latitude, zoom]`.
	pub fn center(&self) -> Option<[f64; 3]> {
		self.typed("center")
	}

	pub fn min_zoom(&self) -> Option<u8> {
		self.typed("min_zoom")
	}

	pub fn max_zoom(&self) -> Option<u8> {
		self.typed("max_zoom")
	}

	/// Declared number of data rows. Informational; readers do not check it.
	pub fn num_tiles(&self) -> Option<u64> {
		self.typed("num_tiles")
	}

	/// `tiling.scheme`, the spatial index codec.
	pub fn tiling_scheme(&self) -> Option<&str> {
		self.record.get("tiling")?.get("scheme")?.as_str()
	}

	pub fn name(&self) -> Option<&str> {
		self.text("name")
	}

	pub fn description(&self) -> Option<&str> {
		self.text("description")
	}

	pub fn attribution(&self) -> Option<&str> {
		self.text("attribution")
	}

	pub fn layers(&self) -> Option<Vec<VectorLayer>> {
		self.typed("layers")
	}

	pub fn processing(&self) -> Option<Processing> {
		self.typed("processing")
	}
}

fn json_kind(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "a boolean",
		Value::Number(_) => "a number",
		Value::String(_) => "a string",
		Value::Array(_) => "an array",
		Value::Object(_) => "an object",
	}
}
