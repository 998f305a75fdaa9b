use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::pipette::Span;

#[derive(Parser, Debug)]
#[command(name = "hpf-binner", author, version, about)]
pub struct Cli {
    /// Log verbosity (error, warn, info, debug, trace); RUST_LOG overrides
    #[arg(long, global = true, default_value = "info")]
    pub log_level: log::LevelFilter,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bin intensity files by treatment and write table plus summaries
    Bin {
        /// Run configuration (TOML)
        #[arg(short, long, default_value = "binner.toml")]
        config: PathBuf,

        /// Output directory (overrides config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Intensity CSVs or directories of them (replace `files` in config)
        #[arg(value_name = "INPUT")]
        inputs: Vec<PathBuf>,
    },

    /// Summarize an existing binned table (.csv, .json or .parquet)
    Summarize {
        #[arg(short, long, default_value = "binner.toml")]
        config: PathBuf,

        /// Output directory (overrides config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(value_name = "TABLE")]
        table: PathBuf,
    },

    /// Tabulate non-zero pixels of a 3D stack
    Pixels {
        /// Image file or directory of `*3dann*` frames
        #[arg(value_name = "STACK")]
        stack: PathBuf,

        #[arg(short, long, default_value = "pixels.csv")]
        output: PathBuf,

        /// Pixel size in µm
        #[arg(long)]
        pixel_size: Option<f64>,

        /// Time between frames in seconds
        #[arg(long)]
        interval: Option<f64>,
    },

    /// Fit aspiration/retraction spans of a pipette curve
    Pipette {
        /// Headerless x,y CSV
        #[arg(value_name = "CURVE")]
        curve: PathBuf,

        /// Aspiration span as start:end
        #[arg(long)]
        aspiration: Span,

        /// Retraction span as start:end
        #[arg(long)]
        retraction: Span,

        /// Pipette radius
        #[arg(long, default_value_t = 65.0)]
        radius: f64,

        /// Applied pressure
        #[arg(long, default_value_t = 70.0)]
        pressure: f64,

        /// Append results to this CSV
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write an example configuration file
    Init {
        #[arg(default_value = "binner.toml")]
        path: PathBuf,
    },
}
