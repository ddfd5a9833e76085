//! Detects an installed AEDT release, keeps a dedicated PyAEDT Python
//! environment provisioned for it, and starts an interactive front-end
//! (Spyder, JupyterLab or IPython) inside that environment.

pub mod cli;
pub mod config;
pub mod env;
pub mod error;
pub mod launch;
pub mod launcher;
pub mod pipeline;
pub mod prompt;
pub mod provision;
pub mod resolver;
pub mod state;

pub use config::LauncherConfig;
pub use env::Environment;
pub use error::LauncherError;
pub use launch::RunMode;
pub use launcher::{LaunchOptions, Launcher};
pub use pipeline::{CommandLine, CommandRunner, RunResult, StepKind, SystemRunner};
pub use prompt::{FixedSelection, SelectionSource, TerminalSelection};
pub use resolver::{CandidateVariable, ResolvedInstallation, Resolver, VersionLabel};
