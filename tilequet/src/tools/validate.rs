use anyhow::{Result, bail};
use std::path::PathBuf;
use tilequet_container::validate;

#[derive(clap::Args, Debug)]
#[command(arg_required_else_help = true, disable_version_flag = true)]
pub struct Subcommand {
	/// TileQuet container (*.parquet)
	#[arg()]
	filename: PathBuf,

	/// print the report as JSON
	#[arg(long)]
	json: bool,
}

pub fn run(arguments: &Subcommand) -> Result<()> {
	eprintln!("validate {:?}", arguments.filename);

	let result = validate(&arguments.filename);
	if arguments.json {
		println!("{}", serde_json::to_string_pretty(&result)?);
	} else {
		print!("{result}");
	}

	if !result.is_valid {
		bail!(
			"'{}' is not a valid container ({} errors)",
			arguments.filename.display(),
			result.errors.len()
		);
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use crate::tests::run_command;
	use assert_fs::TempDir;
	use tilequet_container::{WriterOptions, write_container};
	use tilequet_core::{TileFormat, TileQuetMetadata, TileRow, TileType};

	#[test]
	fn valid_container() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("valid.parquet");
		let metadata = TileQuetMetadata::builder(TileType::Raster, TileFormat::Png)
			.num_tiles(1)
			.build()
			.unwrap();
		let rows = vec![TileRow::new(5192650370358181887, b"png".to_vec())];
		write_container(&path, rows, &metadata, &WriterOptions::default()).unwrap();

		run_command(&["tilequet", "validate", path.to_str().unwrap()]).unwrap();
		run_command(&["tilequet", "validate", "--json", path.to_str().unwrap()]).unwrap();
	}

	#[test]
	fn invalid_container_fails() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("plain.txt");
		std::fs::write(&path, "not parquet").unwrap();

		let err = run_command(&["tilequet", "validate", path.to_str().unwrap()]).unwrap_err();
		assert!(err.to_string().ends_with("is not a valid container (1 errors)"));
	}
}
