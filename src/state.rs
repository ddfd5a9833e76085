//! Provisioning state, persisted next to the environment it describes.
//!
//! The environment directory alone cannot tell a finished first run from one
//! that died halfway through `pip install`, so every completed step is
//! recorded here and `complete` is only set once the last one succeeds.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LauncherError;
use crate::pipeline::StepKind;

pub const STATE_FILE_NAME: &str = "aedt_console_state.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionState {
    pub install_variable: String,
    pub version_label: String,
    #[serde(default)]
    pub completed: Vec<StepKind>,
    #[serde(default)]
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionStatus {
    /// No environment directory at all
    Unprovisioned,
    /// Directory exists but provisioning never finished
    Partial(ProvisionState),
    Provisioned(ProvisionState),
}

impl ProvisionState {
    pub fn new(install_variable: impl Into<String>, version_label: impl Into<String>) -> Self {
        Self {
            install_variable: install_variable.into(),
            version_label: version_label.into(),
            completed: Vec::new(),
            complete: false,
        }
    }

    pub fn is_done(&self, kind: StepKind) -> bool {
        self.completed.contains(&kind)
    }

    pub fn mark_done(&mut self, kind: StepKind) {
        if !self.is_done(kind) {
            self.completed.push(kind);
        }
    }

    pub fn path_in(env_dir: &Path) -> PathBuf {
        env_dir.join(STATE_FILE_NAME)
    }

    /// Inspect `env_dir` and classify it
    pub fn status(env_dir: &Path) -> Result<ProvisionStatus, LauncherError> {
        if !env_dir.is_dir() {
            return Ok(ProvisionStatus::Unprovisioned);
        }

        let path = Self::path_in(env_dir);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "environment directory without state file");
                return Ok(ProvisionStatus::Partial(Self::default()));
            }
            Err(source) => return Err(LauncherError::ReadState { path, source }),
        };

        let state: Self =
            toml::from_str(&text).map_err(|source| LauncherError::ParseState { path, source })?;

        if state.complete {
            Ok(ProvisionStatus::Provisioned(state))
        } else {
            Ok(ProvisionStatus::Partial(state))
        }
    }

    /// Write to `env_dir`, replacing any previous state atomically
    pub fn save(&self, env_dir: &Path) -> Result<(), LauncherError> {
        let path = Self::path_in(env_dir);
        let write_err = |reason: String| LauncherError::WriteState {
            path: path.clone(),
            reason,
        };

        let text = toml::to_string(self).map_err(|e| write_err(e.to_string()))?;
        let tmp = path.with_extension("toml.tmp");
        fs::write(&tmp, text).map_err(|e| write_err(e.to_string()))?;
        fs::rename(&tmp, &path).map_err(|e| write_err(e.to_string()))?;
        debug!(path = %path.display(), completed = self.completed.len(), "saved provisioning state");
        Ok(())
    }
}
