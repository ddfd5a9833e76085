//! Launcher configuration.
//!
//! Every field has a default, so an empty file (or no file at all) gives the
//! stock behaviour.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LauncherError;
use crate::resolver::{CandidateVariable, Resolver};

/// Name of the directory under the app-data root that holds the environment.
pub const ENV_DIR_NAME: &str = "pyaedt_env_ide";

/// Name of the directory under the app-data root that holds `config.toml`.
pub const CONFIG_DIR_NAME: &str = "aedt_console";

/// How to start one front-end from the environment's scripts directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontEndCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl FrontEndCommand {
    fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontEnds {
    pub ide: FrontEndCommand,
    pub notebook: FrontEndCommand,
    pub shell: FrontEndCommand,
}

impl Default for FrontEnds {
    fn default() -> Self {
        Self {
            ide: FrontEndCommand::new("spyder", &[]),
            notebook: FrontEndCommand::new("jupyter", &["lab"]),
            shell: FrontEndCommand::new("ipython", &[]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// Candidate variables, newest release first
    pub candidates: Vec<String>,
    /// Shown when no candidate is defined
    pub minimum_version: String,
    /// Overrides `<appdata>/pyaedt_env_ide`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_dir: Option<PathBuf>,
    /// Bundled interpreter, relative to the install root
    pub interpreter: PathBuf,
    pub automation_package: String,
    pub front_end_packages: Vec<String>,
    /// Module run once with `python -m` after the packages are installed
    pub post_install_module: String,
    pub front_ends: FrontEnds,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            candidates: vec![
                "ANSYSEM_ROOT222".into(),
                "ANSYSEM_ROOT221".into(),
                "ANSYSEM_ROOT212".into(),
                "ANSYSEM_ROOT211".into(),
            ],
            minimum_version: "2021 R1".into(),
            env_dir: None,
            interpreter: ["commonfiles", "CPython", "3_7", "winx64", "Release", "python", "python.exe"]
                .iter()
                .collect(),
            automation_package: "pyaedt".into(),
            front_end_packages: vec![
                "jupyterlab".into(),
                "spyder".into(),
                "ipython".into(),
                "ipyvtklink".into(),
            ],
            post_install_module: "pyaedt.misc.aedtlib_personalib_install".into(),
            front_ends: FrontEnds::default(),
        }
    }
}

impl LauncherConfig {
    /// Parse and validate a configuration document
    pub fn from_toml(text: &str, origin: &Path) -> Result<Self, LauncherError> {
        let config: Self = toml::from_str(text).map_err(|source| LauncherError::ParseConfig {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`
    pub fn load(path: &Path) -> Result<Self, LauncherError> {
        let text = fs::read_to_string(path).map_err(|source| LauncherError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded configuration");
        Self::from_toml(&text, path)
    }

    /// Load `path` if it exists, otherwise fall back to the defaults
    pub fn load_or_default(path: &Path) -> Result<Self, LauncherError> {
        if path.is_file() {
            Self::load(path)
        } else {
            debug!(path = %path.display(), "no configuration file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), LauncherError> {
        if self.candidates.is_empty() {
            return Err(LauncherError::InvalidConfig(
                "at least one candidate variable is required".into(),
            ));
        }
        for name in &self.candidates {
            CandidateVariable::new(name.as_str())?;
        }
        if self.automation_package.trim().is_empty() {
            return Err(LauncherError::InvalidConfig(
                "automation_package must not be empty".into(),
            ));
        }
        if self.post_install_module.trim().is_empty() {
            return Err(LauncherError::InvalidConfig(
                "post_install_module must not be empty".into(),
            ));
        }
        if self.front_end_packages.iter().any(|p| p.trim().is_empty()) {
            return Err(LauncherError::InvalidConfig(
                "front_end_packages must not contain empty names".into(),
            ));
        }
        let front_ends = [
            ("ide", &self.front_ends.ide),
            ("notebook", &self.front_ends.notebook),
            ("shell", &self.front_ends.shell),
        ];
        for (name, command) in front_ends {
            if command.program.trim().is_empty() {
                return Err(LauncherError::InvalidConfig(format!(
                    "front_ends.{}.program must not be empty",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Build the resolver for the configured candidates
    pub fn resolver(&self) -> Result<Resolver, LauncherError> {
        let candidates = self
            .candidates
            .iter()
            .map(|name| CandidateVariable::new(name.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Resolver::new(candidates, self.minimum_version.clone()))
    }

    /// Where the isolated environment lives
    pub fn env_dir(&self, app_data_root: &Path) -> PathBuf {
        self.env_dir
            .clone()
            .unwrap_or_else(|| app_data_root.join(ENV_DIR_NAME))
    }

    /// Default location of the configuration file
    pub fn default_path(app_data_root: &Path) -> PathBuf {
        app_data_root.join(CONFIG_DIR_NAME).join("config.toml")
    }
}
