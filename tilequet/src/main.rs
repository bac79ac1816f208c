mod tools;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};

#[derive(Parser, Debug)]
#[command(
	author,
	version,
	about,
	long_about = None,
	propagate_version = true,
	disable_help_subcommand = true,
)]
struct Cli {
	#[command(subcommand)]
	command: Commands,

	#[command(flatten)]
	verbose: Verbosity<WarnLevel>,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Show metadata, row groups and tiles per zoom level of a container
	Inspect(tools::inspect::Subcommand),

	/// Check a container against the format rules
	Validate(tools::validate::Subcommand),

	/// Write one container per zoom level
	SplitZoom(tools::split_zoom::Subcommand),

	/// Convert a tile archive into a container
	Convert(tools::convert::Subcommand),
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	env_logger::Builder::new()
		.filter_level(cli.verbose.log_level_filter())
		.format_timestamp(None)
		.init();

	run(&cli)
}

fn run(cli: &Cli) -> Result<()> {
	match &cli.command {
		Commands::Inspect(arguments) => tools::inspect::run(arguments),
		Commands::Validate(arguments) => tools::validate::run(arguments),
		Commands::SplitZoom(arguments) => tools::split_zoom::run(arguments),
		Commands::Convert(arguments) => tools::convert::run(arguments),
	}
}
