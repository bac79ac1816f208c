use anyhow::Result;
use std::path::PathBuf;
use tilequet_container::{
	ContainerCompression, ConversionMode, ConvertOptions, GeoPackageSource, MBTilesSource, PMTilesSource,
	StreamingOptions, TileSource, WriterOptions, convert,
};

#[derive(clap::Args, Debug)]
#[command(arg_required_else_help = true, disable_version_flag = true)]
pub struct Subcommand {
	#[command(subcommand)]
	source: SourceCommands,
}

#[derive(clap::Subcommand, Debug)]
enum SourceCommands {
	/// Convert an MBTiles database
	Mbtiles(Arguments),
	/// Convert a PMTiles v3 archive
	Pmtiles(Arguments),
	/// Convert a tile table of a GeoPackage
	Geopackage(GeoPackageArguments),
}

#[derive(clap::Args, Debug)]
#[command(arg_required_else_help = true, disable_version_flag = true)]
struct GeoPackageArguments {
	#[command(flatten)]
	arguments: Arguments,

	/// tile table to convert, defaults to the first one in gpkg_contents
	#[arg(long, value_name = "name", display_order = 0)]
	table: Option<String>,
}

#[derive(clap::Args, Debug)]
#[command(arg_required_else_help = true, disable_version_flag = true)]
struct Arguments {
	/// input tile archive
	#[arg()]
	input_file: PathBuf,

	/// TileQuet container to write (*.parquet)
	#[arg()]
	output_file: PathBuf,

	/// bulk sorts all tiles globally, streaming keeps memory bounded
	#[arg(long, value_enum, default_value_t = ConversionMode::Bulk, display_order = 1)]
	mode: ConversionMode,

	/// maximum number of rows per row group (bulk mode)
	#[arg(long, value_name = "int", default_value_t = 200, display_order = 2)]
	row_group_size: usize,

	/// buffered bytes that trigger a row group (streaming mode)
	#[arg(long, value_name = "bytes", default_value_t = 64 * 1024 * 1024, display_order = 2)]
	memory_threshold: usize,

	/// rewrite the file globally sorted after streaming
	#[arg(long, display_order = 2)]
	sort_on_close: bool,

	/// compression of the written container
	#[arg(long, short, value_enum, default_value_t = ContainerCompression::Uncompressed, display_order = 3)]
	compression: ContainerCompression,
}

impl Arguments {
	fn options(&self) -> ConvertOptions {
		ConvertOptions {
			mode: self.mode,
			writer: WriterOptions {
				row_group_size: self.row_group_size,
				compression: self.compression,
			},
			streaming: StreamingOptions {
				memory_threshold: self.memory_threshold,
				compression: self.compression,
				sort_on_close: self.sort_on_close,
				..StreamingOptions::default()
			},
		}
	}
}

pub fn run(command: &Subcommand) -> Result<()> {
	match &command.source {
		SourceCommands::Mbtiles(arguments) => {
			let source = MBTilesSource::open(&arguments.input_file)?;
			run_conversion(Box::new(source), arguments)
		}
		SourceCommands::Pmtiles(arguments) => {
			let source = PMTilesSource::open(&arguments.input_file)?;
			run_conversion(Box::new(source), arguments)
		}
		SourceCommands::Geopackage(GeoPackageArguments { arguments, table }) => {
			let source = GeoPackageSource::open(&arguments.input_file, table.as_deref())?;
			run_conversion(Box::new(source), arguments)
		}
	}
}

fn run_conversion(mut source: Box<dyn TileSource>, arguments: &Arguments) -> Result<()> {
	eprintln!(
		"convert {} {:?} to {:?}",
		source.source_format(),
		arguments.input_file,
		arguments.output_file
	);

	let options = arguments.options();
	log::debug!("{options:?}");
	let summary = convert(source.as_mut(), &arguments.output_file, &options)?;
	println!("{}", serde_json::to_string_pretty(&summary)?);

	eprintln!("finished converting {} tiles", summary.num_tiles);
	Ok(())
}
