//! Convertir CLI - text weight dumps to binary network containers
//!
//! Usage: `convertir <INPUT> <OUTPUT> [--precision float|bf16]`
//!
//! Exits 1 on any failure (bad arguments, unreadable input, malformed dump,
//! unwritable output); no partial output file is ever left behind.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use convertir::convert::TxtToProtoConverter;
use convertir::proto::Precision;

/// Convertir - network weight dump converter
///
/// Converts a line-oriented text dump of trained network weights into the
/// binary container consumed by the inference engine.
#[derive(Parser)]
#[command(name = "convertir")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Text weight dump (line 1: version, then one vector per line)
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Destination for the binary container (overwritten if present)
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Weight encoding of the output container
    #[arg(short, long, value_enum, default_value = "float")]
    precision: Precision,
}

fn main() {
    // Argument errors exit 1 like every other failure.
    let cli = Cli::try_parse().unwrap_or_else(|e| {
        let _ = e.print();
        process::exit(1);
    });

    match TxtToProtoConverter::convert_file(&cli.input, &cli.output, cli.precision) {
        Ok(stats) => {
            println!("version: {}", stats.version);
            println!(
                "residual blocks: {}, parameters: {}",
                stats.num_residual, stats.total_parameters
            );
            println!(
                "written to {} ({} bytes)",
                cli.output.display(),
                stats.output_bytes
            );
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
