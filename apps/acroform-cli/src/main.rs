//! AcroForm command-line tool
//!
//! Surveys templates into a field catalog and fills them from JSON payloads.
//! All logging goes to stderr so catalogs can be piped from stdout.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "acroform")]
#[command(version, about = "Survey and fill PDF AcroForm templates")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a field catalog for one or more PDFs
    Survey {
        /// Input PDFs; several are merged into one tagged catalog
        #[arg(required = true)]
        pdfs: Vec<PathBuf>,

        /// Catalog output path (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the sorted field names of a PDF
    Fields {
        pdf: PathBuf,
    },

    /// Fill a template from a JSON payload and flatten it
    Fill {
        /// Template PDF
        #[arg(short, long)]
        template: PathBuf,

        /// JSON payload; a flat field map, or a nested body with --field-map
        #[arg(short, long)]
        payload: PathBuf,

        /// Survey catalog used to dispatch by field kind
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Field map applied to the payload before filling
        #[arg(long)]
        field_map: Option<PathBuf>,

        /// Output PDF
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match cli.command {
        Command::Survey { pdfs, output } => commands::survey(&pdfs, output.as_deref()),
        Command::Fields { pdf } => commands::fields(&pdf),
        Command::Fill {
            template,
            payload,
            catalog,
            field_map,
            output,
        } => commands::fill(&commands::FillArgs {
            template,
            payload,
            catalog,
            field_map,
            output,
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
