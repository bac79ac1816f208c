use serde::Serialize;
use serde_json::Value;
use std::{
	collections::BTreeMap,
	fmt::{Display, Formatter},
};

/// The outcome of [`validate`](super::validate).
///
/// `is_valid` is `true` exactly when `errors` is empty. `metadata` holds the
/// sentinel row's JSON whenever it parsed, also if it failed later checks.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ValidationResult {
	pub is_valid: bool,
	pub errors: Vec<String>,
	pub warnings: Vec<String>,
	pub metadata: Option<Value>,
	pub stats: BTreeMap<String, Value>,
}

impl ValidationResult {
	pub(crate) fn error(&mut self, message: impl Into<String>) {
		let message = message.into();
		log::debug!("validation error: {message}");
		self.errors.push(message);
	}

	pub(crate) fn warning(&mut self, message: impl Into<String>) {
		let message = message.into();
		log::debug!("validation warning: {message}");
		self.warnings.push(message);
	}

	pub(crate) fn stat(&mut self, key: &str, value: impl Into<Value>) {
		self.stats.insert(String::from(key), value.into());
	}

	pub(crate) fn finish(mut self) -> Self {
		self.is_valid = self.errors.is_empty();
		self
	}
}

impl Display for ValidationResult {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		writeln!(f, "valid: {}", self.is_valid)?;
		for (title, messages) in [("errors", &self.errors), ("warnings", &self.warnings)] {
			if messages.is_empty() {
				continue;
			}
			writeln!(f, "{title}:")?;
			for message in messages {
				writeln!(f, "  - {message}")?;
			}
		}
		if !self.stats.is_empty() {
			writeln!(f, "stats:")?;
			for (key, value) in &self.stats {
				match value {
					Value::String(text) => writeln!(f, "  {key}: {text}")?,
					other => writeln!(f, "  {key}: {other}")?,
				}
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;
	use serde_json::json;

	#[test]
	fn display() {
		let mut result = ValidationResult::default();
		result.error("missing required column 'payload'");
		result.warning("no tiles at zoom level 3");
		result.stat("num_rows", 4);
		result.stat("tile_format", "png");
		let result = result.finish();
		assert!(!result.is_valid);
		assert_eq!(
			result.to_string(),
			"valid: false\nerrors:\n  - missing required column 'payload'\nwarnings:\n  - no tiles at zoom level 3\nstats:\n  num_rows: 4\n  tile_format: png\n"
		);
	}

	#[test]
	fn serialize() {
		let mut result = ValidationResult::default();
		result.stat("sorted", true);
		let result = result.finish();
		assert_eq!(
			serde_json::to_value(&result).unwrap(),
			json!({
				"is_valid": true,
				"errors": [],
				"warnings": [],
				"metadata": null,
				"stats": { "sorted": true },
			})
		);
	}
}
