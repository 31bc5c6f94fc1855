#![warn(clippy::all, rust_2021_compatibility)]

use base::error::SpecFitError;
use clap::{CommandFactory, Parser};

mod app;

fn main() -> Result<(), SpecFitError> {
    let launch_time = chrono::Local::now();
    let args = app::args::CliArgs::parse();
    let log_level = if args.verbose { 4 } else { args.log_level };
    app::setup_logging(args.log_timestamp.then_some(launch_time), log_level);
    log::info!(
        "specfit launched at {} on {}.",
        launch_time.format("%Y-%m-%d %H:%M:%S"),
        std::env::consts::OS
    );

    let config = app::config::Config::load_config(args.config.as_deref())?;
    match args.command {
        Some(cmd) => app::cli::run(cmd, config),
        None => {
            app::args::CliArgs::command().print_help().map_err(|err| {
                SpecFitError::from_io_error(err, "Failed to print the help message")
            })?;
            Ok(())
        },
    }
}
