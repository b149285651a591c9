//! Error handling for sheetform.
//! Defines the error type shared by every pipeline stage and the mapping
//! from errors to process exit codes.

use std::io;
use thiserror::Error;

/// Exit code for configuration or validation failures.
pub const EXIT_VALIDATION: i32 = 1;

/// Exit code for unexpected runtime failures.
pub const EXIT_RUNTIME: i32 = 2;

/// Custom error types for sheetform operations.
///
/// This enum represents all possible errors that can occur within the application.
/// It implements the standard Error trait through thiserror's derive macro.
#[derive(Error, Debug)]
pub enum Error {
    /// Represents errors that occur during file system operations
    #[error("IO error: {0}.")]
    IoError(#[from] io::Error),

    /// The workbook could not be opened or one of its sheets could not be read
    #[error("Cannot read workbook '{path}': {reason}.")]
    WorkbookError { path: String, reason: String },

    /// A sheet listed as required is absent from the workbook
    #[error("Required sheet '{sheet}' is missing from '{path}'.")]
    MissingSheetError { sheet: String, path: String },

    /// Represents errors that occur during configuration parsing or processing
    #[error("Configuration error: {0}.")]
    ConfigError(String),

    /// Represents errors raised by the MiniJinja engine
    #[error("Template error: {0}.")]
    MinijinjaError(#[from] minijinja::Error),

    /// Represents errors in locating or loading template files
    #[error("Template error: {0}.")]
    TemplateError(String),

    /// A single entity could not be rendered
    #[error("Cannot render {entity}: {reason}.")]
    RenderError { entity: String, reason: String },

    #[error("Output directory '{output_dir}' already exists. Use --force to write into it.")]
    OutputDirectoryExistsError { output_dir: String },

    #[error("No workbooks matching '{pattern}' found in '{input_dir}'.")]
    NoInputFilesError { input_dir: String, pattern: String },

    #[error("All {total} workbooks failed to process.")]
    BatchError { total: usize },
}

impl Error {
    /// Returns the process exit code for this error.
    ///
    /// Configuration and structural problems with the input map to `1`,
    /// anything unexpected at runtime maps to `2`.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::WorkbookError { .. }
            | Error::MissingSheetError { .. }
            | Error::ConfigError(_)
            | Error::OutputDirectoryExistsError { .. }
            | Error::NoInputFilesError { .. } => EXIT_VALIDATION,
            Error::IoError(_)
            | Error::MinijinjaError(_)
            | Error::TemplateError(_)
            | Error::RenderError { .. }
            | Error::BatchError { .. } => EXIT_RUNTIME,
        }
    }
}

/// Convenience type alias for Results with Error as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Default error handler that prints the error and exits the program.
///
/// # Arguments
/// * `err` - The Error to handle
///
/// # Behavior
/// Prints the error message to stderr and exits with the code from [`Error::exit_code`]
pub fn default_error_handler(err: Error) -> ! {
    eprintln!("{err}");
    std::process::exit(err.exit_code());
}
