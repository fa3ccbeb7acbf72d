//! Specweave command-line tool
//!
//! Offline front end to the weaver: transform a class against a class path,
//! disassemble class files, and check their frame sizes.
//!
//! Logging goes to stderr and is filtered by `SPECWEAVE_LOG`
//! (for example `SPECWEAVE_LOG=specweave_engine=debug`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

/// Environment variable holding the log filter
const LOG_ENV: &str = "SPECWEAVE_LOG";

#[derive(Parser)]
#[command(name = "specweave")]
#[command(about = "Weave runtime-checked contracts into compiled classes", long_about = None)]
#[command(version)]
struct Cli {
    /// Color output: auto, always, never
    #[arg(long, global = true)]
    color: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Weave one class against a class path
    Weave {
        /// Internal class name, e.g. bank/Account
        class: String,
        /// Class path roots, searched in order
        #[arg(short = 'c', long = "class-path", required = true)]
        class_path: Vec<PathBuf>,
        /// Weaver configuration (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Where to write the woven class
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Disassemble a class file
    Dump {
        /// Class file
        file: PathBuf,
    },

    /// Decode a class file and check its frame sizes
    Verify {
        /// Class file
        file: PathBuf,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();
    let color = output::resolve_color_choice(cli.color.as_deref());

    match cli.command {
        Commands::Weave {
            class,
            class_path,
            config,
            output,
            json,
        } => commands::weave::execute(commands::weave::WeaveArgs {
            class,
            class_path,
            config,
            output,
            json,
            color,
        }),
        Commands::Dump { file } => commands::dump::execute(&file),
        Commands::Verify { file } => commands::verify::execute(&file, color),
    }
}
