use std::path::PathBuf;

use clap::{Parser, Subcommand};
use farecard_scanner::ScannerConfig;
use tracing_subscriber::EnvFilter;

mod commands;
mod utils;

use commands::*;

#[derive(Parser)]
#[command(version, about = "Read and decode contactless transit cards")]
struct Cli {
    /// Debug level output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List PC/SC readers and PN533 USB devices
    List,

    /// Scan for cards and print what was read
    Scan {
        /// Key file: JSON key file, or a Proxmark3 binary key dump
        #[arg(short, long)]
        keys: Option<PathBuf>,

        /// Only use PC/SC readers whose name contains this
        #[arg(short, long)]
        reader: Option<String>,

        /// Skip PC/SC readers
        #[arg(long)]
        no_pcsc: bool,

        /// Skip PN533 USB devices
        #[arg(long)]
        no_pn533: bool,

        /// Stop after the first card
        #[arg(long)]
        once: bool,

        /// Write every card read as JSON into this directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decode a saved card dump
    Parse {
        /// Card dump JSON as written by `scan --output`
        file: PathBuf,
    },

    /// Print the BER-TLV tree of a hex buffer
    Tlv {
        /// Hex bytes; spaces and colons are ignored
        hex: String,

        /// Print JSON instead of an indented tree
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::List => list_command(),
        Commands::Scan {
            keys,
            reader,
            no_pcsc,
            no_pn533,
            once,
            output,
        } => {
            let mut config = ScannerConfig::new()
                .with_pcsc(!no_pcsc)
                .with_pn533(!no_pn533);
            if let Some(reader) = reader {
                config = config.with_reader_filter(reader);
            }
            if let Some(path) = keys {
                config = config.with_keys(utils::load_keys(&path)?);
            }
            scan_command(config, once, output.as_deref())
        }
        Commands::Parse { file } => parse_command(&file),
        Commands::Tlv { hex, json } => tlv_command(&hex, json),
    }
}

fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .init();
}
