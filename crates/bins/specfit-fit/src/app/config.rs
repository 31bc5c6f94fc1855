use base::{
    error::{RuntimeError, SpecFitError},
    settings::SpecularFitSettings,
    utils::resolve_path,
};
use std::path::{Path, PathBuf};

/// Name of the settings file looked up in the working directory and the
/// system configuration directory.
pub const SETTINGS_FILE_NAME: &str = "specfit.toml";

/// Default output directory, relative to the working directory.
pub const DEFAULT_OUTPUT_DIR: &str = "specfit-output";

/// specfit configuration.
#[derive(Debug)]
pub struct Config {
    /// Current working directory (where the user started the program).
    cwd: PathBuf,

    /// System configuration directory of specfit, if the platform has one.
    sys_config_dir: Option<PathBuf>,

    /// File the settings were loaded from; `None` for the defaults.
    source: Option<PathBuf>,

    /// Fitting settings.
    settings: SpecularFitSettings,
}

impl Config {
    /// Loads the configuration.
    ///
    /// The settings are read from `filepath` if given. Otherwise specfit
    /// looks for `specfit.toml` in the current working directory, then in
    /// the system configuration directory:
    ///
    /// + On *nix system: "$XDG_CONFIG_HOME/specfit" or "$HOME/.config/specfit"
    ///
    /// + On windows system: `%APPDATA%\specfit`
    ///
    /// + On macos system: "$HOME/Library/Application Support/specfit"
    ///
    /// Default settings are used if none of the files exist.
    pub fn load_config(filepath: Option<&Path>) -> Result<Self, SpecFitError> {
        log::info!("Loading configurations...");
        let cwd = std::env::current_dir().map_err(|err| {
            SpecFitError::from_io_error(err, "Failed to get current working directory.")
        })?;
        let sys_config_dir = match sys_config_dir() {
            Ok(dir) => {
                log::info!("  - Sys configuration directory: {}", dir.display());
                Some(dir)
            },
            Err(err) => {
                log::warn!("  - {}", err);
                None
            },
        };

        let source = match filepath {
            Some(path) => {
                let path = resolve_path(&cwd, Some(path));
                if !path.exists() {
                    return Err(SpecFitError::new(
                        format!("Settings file {} does not exist", path.display()),
                        None,
                    ));
                }
                Some(path)
            },
            None => locate_settings(&cwd, sys_config_dir.as_deref()),
        };

        let settings = match &source {
            Some(path) => {
                log::info!("  Load fitting settings from {}", path.display());
                SpecularFitSettings::load(path)?
            },
            None => {
                log::info!("  No settings file found; using defaults.");
                SpecularFitSettings::default()
            },
        };

        Ok(Self {
            cwd,
            sys_config_dir,
            source,
            settings,
        })
    }

    /// Current working directory.
    pub fn cwd(&self) -> &Path { &self.cwd }

    /// System configuration directory of specfit.
    pub fn sys_config_dir(&self) -> Option<&Path> { self.sys_config_dir.as_deref() }

    /// File the settings were loaded from.
    pub fn source(&self) -> Option<&Path> { self.source.as_deref() }

    /// Fitting settings.
    pub fn settings(&self) -> &SpecularFitSettings { &self.settings }

    /// Output directory: `requested` resolved against the working
    /// directory, or the default output directory.
    pub fn output_dir(&self, requested: Option<&Path>) -> PathBuf {
        resolve_path(&self.cwd, Some(requested.unwrap_or(Path::new(DEFAULT_OUTPUT_DIR))))
    }
}

fn sys_config_dir() -> Result<PathBuf, SpecFitError> {
    let mut config_dir = dirs::config_dir().ok_or(SpecFitError::new(
        "System configuration directory not found.",
        Some(Box::new(RuntimeError::SysConfigDirNotFound)),
    ))?;
    config_dir.push("specfit");
    Ok(config_dir)
}

/// Looks for the settings file in the working directory, then in the system
/// configuration directory.
fn locate_settings(cwd: &Path, sys_config_dir: Option<&Path>) -> Option<PathBuf> {
    std::iter::once(cwd)
        .chain(sys_config_dir)
        .map(|dir| dir.join(SETTINGS_FILE_NAME))
        .find(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_settings_order() {
        let cwd = tempfile::tempdir().unwrap();
        let sys = tempfile::tempdir().unwrap();
        assert_eq!(locate_settings(cwd.path(), Some(sys.path())), None);

        let sys_file = sys.path().join(SETTINGS_FILE_NAME);
        SpecularFitSettings::default().save(&sys_file).unwrap();
        assert_eq!(locate_settings(cwd.path(), Some(sys.path())), Some(sys_file));
        assert_eq!(locate_settings(cwd.path(), None), None);

        let cwd_file = cwd.path().join(SETTINGS_FILE_NAME);
        SpecularFitSettings::default().save(&cwd_file).unwrap();
        assert_eq!(locate_settings(cwd.path(), Some(sys.path())), Some(cwd_file));
    }
}
