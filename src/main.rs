//! sheetform's main application entry point.
//! Parses the command line, configures logging and hands over to the pipeline.

use sheetform::{
    cli::get_args,
    error::default_error_handler,
    logger::init_logger,
    pipeline::run,
};

/// Main application entry point.
fn main() {
    let args = get_args();

    init_logger(args.verbose);

    if let Err(err) = run(&args) {
        default_error_handler(err);
    }
}
