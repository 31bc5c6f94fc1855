use crate::app::cli::{InfoOptions, ShowBasisOptions, SynthOptions};
use std::path::PathBuf;

/// specfit command line interface arguments.
#[derive(clap::Parser, Debug)]
#[clap(
    author,
    version,
    about = "Decomposition of multi-view reflectance data into basis materials."
)]
pub struct CliArgs {
    /// Whether to print verbose information to stdout.
    #[clap(short, long, help = "Use verbose output (log level = 4)")]
    pub verbose: bool,

    /// Whether to show the timestamp in the log.
    #[clap(
        long,
        help = "Show timestamp for each log message in seconds since\nprogram starts"
    )]
    pub log_timestamp: bool,

    /// Verbosity level for the log.
    #[clap(
        long,
        help = "Setting logging verbosity level (higher for more\ndetails)\n  0 - error\n  1 - \
                warn + error\n  2 - info + warn + error\n  3 - debug + info + warn + error\n  4 - \
                trace + debug + info + warn + error\n\x08",
        default_value_t = 2
    )]
    pub log_level: u8,

    /// Path to the fitting settings file. If not specified, specfit looks
    /// for `specfit.toml` in the working directory, then in the system
    /// configuration directory.
    #[clap(short, long, help = "Path to the fitting settings file")]
    pub config: Option<PathBuf>,

    /// Command to execute.
    #[clap(subcommand)]
    pub command: Option<SubCommand>,
}

/// specfit command.
#[derive(clap::Subcommand, Debug)]
pub enum SubCommand {
    /// Renders a synthetic capture from known materials and decomposes it.
    Synth(SynthOptions),

    /// Prints a saved material basis.
    #[clap(name = "show-basis")]
    ShowBasis(ShowBasisOptions),

    /// Prints the active fitting settings.
    #[clap(name = "info")]
    Info(InfoOptions),
}
