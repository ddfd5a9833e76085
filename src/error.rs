//! Error type shared by every launcher phase.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Everything that can stop the launcher before the front-end takes over.
#[derive(Debug, Error)]
pub enum LauncherError {
    /// None of the candidate variables is defined.
    #[error("no supported AEDT installation found (searched {})", .searched.join(", "))]
    EnvironmentNotFound {
        minimum_version: String,
        searched: Vec<String>,
    },

    /// A specific version was requested but its variable is not defined.
    #[error("AEDT {label} is not installed: {variable} is not set")]
    VersionNotInstalled { label: String, variable: String },

    /// A candidate name does not end in a `YYZ` version token.
    #[error("candidate variable `{0}` does not end in a three-digit version token")]
    InvalidCandidate(String),

    /// A pipeline step ran but exited unsuccessfully.
    #[error("step `{step}` exited with status {exit_code}")]
    StepFailed { step: String, exit_code: u8 },

    /// A pipeline step could not be started at all.
    #[error("step `{step}` could not start `{program}`")]
    Spawn {
        step: String,
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to read configuration {path}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration {path}")]
    ParseConfig {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Configuration parsed but holds values the launcher cannot use.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read provisioning state {path}")]
    ReadState {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt provisioning state {path}")]
    ParseState {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to write provisioning state {path}: {reason}")]
    WriteState { path: PathBuf, reason: String },

    /// Neither the platform data directory nor the home directory is known.
    #[error("cannot locate the user application-data directory")]
    NoAppDataDir,

    #[error("failed to read the run mode selection")]
    Prompt(#[source] io::Error),

    /// The user aborted the selection prompt.
    #[error("cancelled")]
    Cancelled,
}

impl LauncherError {
    /// Fixed user-facing text for the not-found case.
    pub fn not_found_message(minimum_version: &str) -> String {
        format!(
            "AEDT is not installed or not supported. Install AEDT {} or newer and try again.",
            minimum_version
        )
    }
}
