use anyhow::Result;
use std::path::PathBuf;
use tilequet_container::{ContainerCompression, WriterOptions, split_by_zoom};

#[derive(clap::Args, Debug)]
#[command(arg_required_else_help = true, disable_version_flag = true)]
pub struct Subcommand {
	/// TileQuet container to split
	#[arg()]
	input_file: PathBuf,

	/// directory for the zoom_<N>.parquet files, created if missing
	#[arg()]
	output_dir: PathBuf,

	/// maximum number of rows per row group
	#[arg(long, value_name = "int", default_value_t = 200)]
	row_group_size: usize,

	/// compression of the written containers
	#[arg(long, short, value_enum, default_value_t = ContainerCompression::Zstd)]
	compression: ContainerCompression,
}

pub fn run(arguments: &Subcommand) -> Result<()> {
	eprintln!("split {:?} into {:?}", arguments.input_file, arguments.output_dir);

	let options = WriterOptions {
		row_group_size: arguments.row_group_size,
		compression: arguments.compression,
	};
	let paths = split_by_zoom(&arguments.input_file, &arguments.output_dir, &options)?;
	for path in &paths {
		println!("{}", path.display());
	}

	eprintln!("finished writing {} containers", paths.len());
	Ok(())
}
