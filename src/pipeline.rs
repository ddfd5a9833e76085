use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use serde::{Deserialize, Serialize};
use signal_hook::SigId;
use tracing::{debug, info, warn};

use crate::error::LauncherError;

/// A program invocation with an environment overlay applied on top of the
/// launcher's own environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env_overlay: BTreeMap<String, OsString>,
    /// Hand the terminal to the child; the launcher ignores Ctrl+C meanwhile
    pub interactive: bool,
}

impl CommandLine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env_overlay: BTreeMap::new(),
            interactive: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn envs(mut self, overlay: &BTreeMap<String, OsString>) -> Self {
        self.env_overlay
            .extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.contains(' ') {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunResult {
    pub exit_code: u8,
}

impl RunResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs commands to completion. Tests substitute a recording implementation.
pub trait CommandRunner {
    fn run(&mut self, command: &CommandLine) -> io::Result<RunResult>;
}

/// Runs commands as real child processes and waits for each one.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&mut self, command: &CommandLine) -> io::Result<RunResult> {
        let _guard = if command.interactive {
            Some(InterruptGuard::install()?)
        } else {
            None
        };

        debug!(command = %command, "spawning");
        let status = Command::new(&command.program)
            .args(&command.args)
            .envs(&command.env_overlay)
            .status()?;

        Ok(RunResult {
            exit_code: exit_code_of(status),
        })
    }
}

/// Keeps SIGINT from terminating the launcher while a child owns the terminal.
/// The child still receives the signal from the terminal itself.
struct InterruptGuard {
    id: SigId,
}

impl InterruptGuard {
    fn install() -> io::Result<Self> {
        let id = signal_hook::flag::register(
            signal_hook::consts::SIGINT,
            Arc::new(AtomicBool::new(false)),
        )?;
        Ok(Self { id })
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        signal_hook::low_level::unregister(self.id);
    }
}

/// Convert a child's exit status into a shell-style exit code
pub(crate) fn exit_code_of(status: ExitStatus) -> u8 {
    if let Some(code) = status.code() {
        return u8::try_from(code).unwrap_or(1);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            let name = nix::sys::signal::Signal::try_from(signal)
                .map(|s| s.as_str())
                .unwrap_or("unknown signal");
            warn!(signal = name, "child terminated by signal");
            return 128u8.wrapping_add(signal as u8);
        }
    }

    1
}

/// Identifies each step of provisioning and updating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    CreateEnvironment,
    UpgradePip,
    InstallAutomationPackage,
    InstallFrontEnds,
    ConfigureAutomationPackage,
    UpdateAutomationPackage,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::CreateEnvironment => "create-environment",
            StepKind::UpgradePip => "upgrade-pip",
            StepKind::InstallAutomationPackage => "install-automation-package",
            StepKind::InstallFrontEnds => "install-front-ends",
            StepKind::ConfigureAutomationPackage => "configure-automation-package",
            StepKind::UpdateAutomationPackage => "update-automation-package",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub kind: StepKind,
    pub command: CommandLine,
}

/// Run one step and fail unless it exits cleanly
pub fn run_step(runner: &mut dyn CommandRunner, step: &Step) -> Result<(), LauncherError> {
    info!(step = %step.kind, command = %step.command, "running step");
    let result = runner
        .run(&step.command)
        .map_err(|source| LauncherError::Spawn {
            step: step.kind.to_string(),
            program: step.command.program.display().to_string(),
            source,
        })?;

    if !result.success() {
        warn!(step = %step.kind, exit_code = result.exit_code, "step failed");
        return Err(LauncherError::StepFailed {
            step: step.kind.to_string(),
            exit_code: result.exit_code,
        });
    }

    info!(step = %step.kind, "step finished");
    Ok(())
}

/// Run steps in order, stopping at the first failure.
///
/// `on_success` is called after each step that exits cleanly, before the
/// next one starts.
pub fn run_steps<F>(
    runner: &mut dyn CommandRunner,
    steps: &[Step],
    mut on_success: F,
) -> Result<(), LauncherError>
where
    F: FnMut(StepKind) -> Result<(), LauncherError>,
{
    for step in steps {
        run_step(runner, step)?;
        on_success(step.kind)?;
    }
    Ok(())
}
