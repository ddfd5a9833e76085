use std::fmt;

use tracing::info;

use crate::config::{FrontEndCommand, FrontEnds};
use crate::error::LauncherError;
use crate::pipeline::{CommandLine, CommandRunner};
use crate::provision::Provisioner;

/// Which front-end to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Selection `0`
    Ide,
    /// Selection `1`
    Notebook,
    /// Selection `2`, and anything that is not `0` or `1`
    Shell,
}

impl RunMode {
    /// Map raw prompt input to a mode.
    ///
    /// Only an exact `0` or `1` (surrounding whitespace ignored) selects the IDE
    /// or the notebook server. Everything else, including empty input, falls
    /// through to the shell without complaint.
    pub fn from_selection(input: &str) -> Self {
        match input.trim() {
            "1" => RunMode::Notebook,
            "0" => RunMode::Ide,
            _ => RunMode::Shell,
        }
    }

    pub fn command<'a>(&self, front_ends: &'a FrontEnds) -> &'a FrontEndCommand {
        match self {
            RunMode::Ide => &front_ends.ide,
            RunMode::Notebook => &front_ends.notebook,
            RunMode::Shell => &front_ends.shell,
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunMode::Ide => "ide",
            RunMode::Notebook => "notebook",
            RunMode::Shell => "shell",
        })
    }
}

/// The command that starts `mode` inside the provisioned environment
pub fn front_end_command(
    mode: RunMode,
    front_ends: &FrontEnds,
    provisioner: &Provisioner,
) -> CommandLine {
    let front_end = mode.command(front_ends);
    CommandLine::new(provisioner.layout().executable(&front_end.program))
        .args(front_end.args.iter().cloned())
        .envs(provisioner.overlay())
        .interactive()
}

/// Start the front-end and block until it exits.
///
/// The child's exit status is returned as-is; a front-end that exits non-zero
/// is not a launcher failure.
pub fn launch(
    mode: RunMode,
    front_ends: &FrontEnds,
    provisioner: &Provisioner,
    runner: &mut dyn CommandRunner,
) -> Result<u8, LauncherError> {
    let command = front_end_command(mode, front_ends, provisioner);
    info!(mode = %mode, command = %command, "launching front-end");

    let result = runner.run(&command).map_err(|source| LauncherError::Spawn {
        step: format!("launch-{}", mode),
        program: command.program.display().to_string(),
        source,
    })?;

    info!(mode = %mode, exit_code = result.exit_code, "front-end exited");
    Ok(result.exit_code)
}
