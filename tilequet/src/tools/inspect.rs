use anyhow::Result;
use std::{
	collections::BTreeMap,
	fmt::Write,
	path::{Path, PathBuf},
};
use tilequet_container::ContainerReader;
use tilequet_core::{Quadbin, TileIndexCodec};
use tilequet_derive::context;

#[derive(clap::Args, Debug)]
#[command(arg_required_else_help = true, disable_version_flag = true)]
pub struct Subcommand {
	/// TileQuet container (*.parquet)
	#[arg()]
	filename: PathBuf,
}

pub fn run(arguments: &Subcommand) -> Result<()> {
	eprintln!("inspect {:?}", arguments.filename);
	print!("{}", report(&arguments.filename)?);
	Ok(())
}

#[context("inspecting '{}'", path.display())]
fn report(path: &Path) -> Result<String> {
	let reader = ContainerReader::open(path)?;
	let metadata = reader.metadata()?;

	let mut per_zoom: BTreeMap<u8, u64> = BTreeMap::new();
	let mut undecodable = 0u64;
	reader.for_each_row(|row| {
		if !row.is_sentinel() {
			match Quadbin.decode(row.id) {
				Ok(coord) => *per_zoom.entry(coord.level).or_default() += 1,
				Err(_) => undecodable += 1,
			}
		}
		Ok(())
	})?;

	let mut text = String::new();
	writeln!(text, "file: {}", path.display())?;
	writeln!(text, "format version: {}", reader.file_format_version().unwrap_or("-"))?;
	writeln!(text, "rows: {}", reader.num_rows())?;
	writeln!(text, "row groups: {}", reader.num_row_groups())?;
	writeln!(text, "metadata:")?;
	for line in serde_json::to_string_pretty(&metadata.to_value())?.lines() {
		writeln!(text, "  {line}")?;
	}
	writeln!(text, "tiles per zoom:")?;
	for (level, count) in &per_zoom {
		writeln!(text, "  {level}: {count}")?;
	}
	if undecodable > 0 {
		writeln!(text, "undecodable ids: {undecodable}")?;
	}
	Ok(text)
}
