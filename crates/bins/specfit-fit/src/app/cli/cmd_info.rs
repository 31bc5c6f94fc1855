use crate::app::{cli::ansi, config::Config};
use base::error::{RuntimeError, SpecFitError};
use std::path::PathBuf;

#[derive(clap::Args, Debug)]
#[clap(about = "Print the active fitting settings.")]
pub struct InfoOptions {
    #[clap(long, help = "Also write the active settings to this file")]
    pub save: Option<PathBuf>,
}

/// Prints where the settings come from and the settings themselves as TOML.
pub fn print_info(opts: InfoOptions, config: Config) -> Result<(), SpecFitError> {
    let settings = config.settings();
    let toml = toml::to_string_pretty(settings).map_err(|err| {
        SpecFitError::from_runtime_error(RuntimeError::from(err), "Failed to serialise settings")
    })?;

    println!(
        "{}Configuration{}\n  {} cwd: {}\n  {} sys config dir: {}\n  {} settings file: {}",
        ansi::BRIGHT_CYAN,
        ansi::RESET,
        ansi::CYAN_MINUS,
        config.cwd().display(),
        ansi::CYAN_MINUS,
        config
            .sys_config_dir()
            .map_or_else(|| String::from("<none>"), |dir| dir.display().to_string()),
        ansi::CYAN_MINUS,
        config
            .source()
            .map_or_else(|| String::from("<defaults>"), |path| path.display().to_string()),
    );
    println!("\n{}Fitting settings{}\n{}", ansi::BRIGHT_CYAN, ansi::RESET, toml);

    if let Some(path) = opts.save {
        let path = base::utils::resolve_path(config.cwd(), Some(&path));
        settings.save(&path)?;
        println!("{} Settings written to {}", ansi::CYAN_CHECK, path.display());
    }
    Ok(())
}
