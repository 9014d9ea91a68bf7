use batchforge_av::EngineKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "batchforge")]
#[command(author, version, about = "Batch media conversion dispatcher")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server that accepts conversion-run requests
    Start {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config and PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Convert every matching file in the input directory once
    Run {
        /// Input directory (overrides config)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output directory (overrides config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Files converted concurrently per batch
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Conversion engine
        #[arg(short, long)]
        engine: Option<EngineKind>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that the engine tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses --config or the default search if not specified)
        #[arg(value_name = "CONFIG")]
        file: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
