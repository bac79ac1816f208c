use super::{VectorLayer, WORLD_BOUNDS};
use crate::TileQuetError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A TileJSON 3.0.0 document.
///
/// Adapters embed one as the `tilejson` extension of the container metadata, so map
/// clients can consume the dataset description without knowing the container format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileJson {
	pub tilejson: String,
	pub tiles: Vec<String>,
	pub bounds: [f64; 4],
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub center: Option<[f64; 3]>,
	pub minzoom: u8,
	pub maxzoom: u8,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub attribution: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub vector_layers: Option<Vec<VectorLayer>>,
}

impl TileJson {
	pub const VERSION: &'static str = "3.0.0";

	pub fn new(minzoom: u8, maxzoom: u8) -> TileJson {
		TileJson {
			tilejson: String::from(TileJson::VERSION),
			tiles: Vec::new(),
			bounds: WORLD_BOUNDS,
			center: None,
			minzoom,
			maxzoom,
			name: None,
			description: None,
			attribution: None,
			vector_layers: None,
		}
	}

	pub fn bounds(mut self, bounds: [f64; 4]) -> Self {
		self.bounds = bounds;
		self
	}

	pub fn center(mut self, center: Option<[f64; 3]>) -> Self {
		self.center = center;
		self
	}

	pub fn name(mut self, name: Option<String>) -> Self {
		self.name = name;
		self
	}

	pub fn description(mut self, description: Option<String>) -> Self {
		self.description = description;
		self
	}

	pub fn attribution(mut self, attribution: Option<String>) -> Self {
		self.attribution = attribution;
		self
	}

	pub fn vector_layers(mut self, vector_layers: Option<Vec<VectorLayer>>) -> Self {
		self.vector_layers = vector_layers;
		self
	}

	pub fn to_value(&self) -> Result<Value> {
		serde_json::to_value(self).map_err(|err| TileQuetError::Parse(err).into())
	}
}
