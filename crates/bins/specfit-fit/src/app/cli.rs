use crate::app::{args::SubCommand, config::Config};
use base::error::SpecFitError;

/// ANSI color codes.
pub mod ansi {
    pub const BRIGHT_CYAN: &str = "\u{001b}[36m";
    pub const BRIGHT_YELLOW: &str = "\u{001b}[33m";
    pub const RESET: &str = "\u{001b}[0m";

    pub const CYAN_CHECK: &str = "\u{001b}[36m✓\u{001b}[0m";
    pub const CYAN_MINUS: &str = "\u{001b}[36m-\u{001b}[0m";
}

mod cmd_info;
mod cmd_show_basis;
mod cmd_synth;

pub use cmd_info::InfoOptions;
pub use cmd_show_basis::ShowBasisOptions;
pub use cmd_synth::SynthOptions;

/// Entry point of specfit CLI.
pub fn run(cmd: SubCommand, config: Config) -> Result<(), SpecFitError> {
    match cmd {
        SubCommand::Synth(opts) => cmd_synth::synth(opts, config),
        SubCommand::ShowBasis(opts) => cmd_show_basis::show_basis(opts, config),
        SubCommand::Info(opts) => cmd_info::print_info(opts, config),
    }
}
