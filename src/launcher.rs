//! Top-level flow: resolve, provision, optionally update, launch.

use std::path::PathBuf;

use tracing::info;

use crate::config::LauncherConfig;
use crate::env::Environment;
use crate::error::LauncherError;
use crate::launch::{RunMode, launch};
use crate::pipeline::CommandRunner;
use crate::prompt::SelectionSource;
use crate::provision::{EnvironmentLayout, Provisioner};
use crate::resolver::{ResolvedInstallation, VersionLabel};

/// Per-invocation choices, normally taken from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Upgrade the automation package before launching
    pub update: bool,
    /// Bind to this release instead of the newest installed one
    pub version: Option<VersionLabel>,
    /// Environment location, overriding the configuration
    pub env_dir: Option<PathBuf>,
}

pub struct Launcher {
    config: LauncherConfig,
    env: Environment,
}

impl Launcher {
    pub fn new(config: LauncherConfig, env: Environment) -> Self {
        Self { config, env }
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    /// Pick the installation to bind to
    pub fn resolve(&self, options: &LaunchOptions) -> Result<ResolvedInstallation, LauncherError> {
        let resolver = self.config.resolver()?;
        let installation = match options.version {
            Some(label) => resolver.resolve_version(&self.env, label)?,
            None => resolver.resolve(&self.env)?,
        };
        info!(
            variable = %installation.variable,
            version = %installation.label,
            path = %installation.install_path.display(),
            "resolved AEDT installation"
        );
        Ok(installation)
    }

    /// Every installed release, newest first
    pub fn installed(&self) -> Result<Vec<ResolvedInstallation>, LauncherError> {
        let resolver = self.config.resolver()?;
        Ok(resolver.installed(&self.env).collect())
    }

    pub fn env_dir(&self, options: &LaunchOptions) -> Result<PathBuf, LauncherError> {
        match &options.env_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(self.config.env_dir(&self.env.app_data_root()?)),
        }
    }

    /// Run the whole flow and return the front-end's exit code.
    ///
    /// Nothing is provisioned or launched unless an installation resolves.
    /// The selection is only read once the environment is ready.
    pub fn run(
        &self,
        options: &LaunchOptions,
        runner: &mut dyn CommandRunner,
        selection: &mut dyn SelectionSource,
    ) -> Result<u8, LauncherError> {
        let installation = self.resolve(options)?;
        let layout = EnvironmentLayout::new(self.env_dir(options)?);
        let provisioner = Provisioner::new(layout, installation, &self.env);

        let ran = provisioner.ensure(&self.config, runner)?;
        if !ran.is_empty() {
            info!(steps = ran.len(), "provisioning complete");
        }

        if options.update {
            provisioner.update(&self.config, runner)?;
        }

        let mode = RunMode::from_selection(&selection.read_selection()?);
        launch(mode, &self.config.front_ends, &provisioner, runner)
    }
}
