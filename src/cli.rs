//! Command-line interface implementation for sheetform.
//! Provides argument parsing and help text formatting using clap.

use clap::{error::ErrorKind, CommandFactory, Parser};
use std::path::PathBuf;

use crate::constants::{DEFAULT_FILE_PATTERN, DEFAULT_OUTPUT_DIR};

/// Command-line arguments structure for sheetform.
#[derive(Parser, Debug)]
#[command(author, version, about = "sheetform: Terraform deployment packages from infrastructure workbooks", long_about = None)]
pub struct Args {
    /// Workbook to convert, or a directory of workbooks for batch mode
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Directory where the package is written; in batch mode, one
    /// subdirectory per workbook is created inside it
    #[arg(value_name = "OUTPUT_DIR", default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// JSON or YAML file merged over the built-in rule table
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// File name pattern selecting workbooks in batch mode
    #[arg(short, long, value_name = "GLOB", default_value = DEFAULT_FILE_PATTERN)]
    pub pattern: String,

    /// Write a JSON report of resolved fields and diagnostics to FILE
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Resolve and render without writing the package
    #[arg(long)]
    pub dry_run: bool,

    /// Write into an existing output directory
    #[arg(short, long)]
    pub force: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,
}

/// Parses command line arguments and returns the Args structure.
///
/// # Returns
/// * `Args` - Parsed command line arguments
///
/// # Exits
/// * With status code 1 if required arguments are missing
/// * With clap's default error handling for other argument errors
pub fn get_args() -> Args {
    match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            if e.kind() == ErrorKind::MissingRequiredArgument {
                let _ = Args::command()
                    .help_template(
                        r#"{about-section}
{usage-heading} {usage}

{all-args}
{after-help}
"#,
                    )
                    .print_help();
                std::process::exit(1);
            } else {
                e.exit();
            }
        }
    }
}
