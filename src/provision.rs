use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::LauncherConfig;
use crate::env::Environment;
use crate::error::LauncherError;
use crate::pipeline::{CommandLine, CommandRunner, Step, StepKind, run_step, run_steps};
use crate::resolver::ResolvedInstallation;
use crate::state::{ProvisionState, ProvisionStatus};

/// Variables exported to every child so it knows which AEDT it is bound to.
pub const INSTALL_DIR_VAR: &str = "AEDT_INSTALL_DIR";
pub const VERSION_VAR: &str = "AEDT_VERSION";

/// Where things live inside a virtual environment created by `python -m venv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentLayout {
    root: PathBuf,
}

impl EnvironmentLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scripts_dir(&self) -> PathBuf {
        if cfg!(windows) {
            self.root.join("Scripts")
        } else {
            self.root.join("bin")
        }
    }

    /// An executable installed into the scripts directory
    pub fn executable(&self, name: &str) -> PathBuf {
        let dir = self.scripts_dir();
        if cfg!(windows) && Path::new(name).extension().is_none() {
            dir.join(format!("{}.exe", name))
        } else {
            dir.join(name)
        }
    }

    pub fn python(&self) -> PathBuf {
        self.executable("python")
    }

    /// Variables that activate the environment for a child process, plus the
    /// resolved installation
    pub fn activation(
        &self,
        parent: &Environment,
        installation: &ResolvedInstallation,
    ) -> BTreeMap<String, OsString> {
        let mut overlay = BTreeMap::new();
        overlay.insert("VIRTUAL_ENV".to_string(), self.root.clone().into_os_string());
        overlay.insert(
            "PATH".to_string(),
            parent.path_with_prefix(&self.scripts_dir()),
        );
        overlay.insert(
            INSTALL_DIR_VAR.to_string(),
            installation.install_path.clone().into_os_string(),
        );
        overlay.insert(
            VERSION_VAR.to_string(),
            OsString::from(installation.label.to_string()),
        );
        overlay
    }
}

/// Builds and runs the provisioning and update steps for one environment.
#[derive(Debug, Clone)]
pub struct Provisioner {
    layout: EnvironmentLayout,
    installation: ResolvedInstallation,
    overlay: BTreeMap<String, OsString>,
}

impl Provisioner {
    pub fn new(
        layout: EnvironmentLayout,
        installation: ResolvedInstallation,
        parent: &Environment,
    ) -> Self {
        let overlay = layout.activation(parent, &installation);
        Self {
            layout,
            installation,
            overlay,
        }
    }

    pub fn layout(&self) -> &EnvironmentLayout {
        &self.layout
    }

    pub fn overlay(&self) -> &BTreeMap<String, OsString> {
        &self.overlay
    }

    fn pip(&self) -> CommandLine {
        CommandLine::new(self.layout.python())
            .args(["-m", "pip", "install"])
            .envs(&self.overlay)
    }

    /// The first-run steps, in order
    pub fn plan(&self, config: &LauncherConfig) -> Vec<Step> {
        self.plan_from(config, false)
    }

    /// With `clear`, venv wipes whatever an earlier run left in the directory
    fn plan_from(&self, config: &LauncherConfig, clear: bool) -> Vec<Step> {
        let bundled = self.installation.install_path.join(&config.interpreter);
        let mut create = CommandLine::new(bundled).args(["-m", "venv"]);
        if clear {
            create = create.arg("--clear");
        }
        vec![
            Step {
                kind: StepKind::CreateEnvironment,
                command: create.arg(self.layout.root().display().to_string()),
            },
            Step {
                kind: StepKind::UpgradePip,
                command: self.pip().args(["--upgrade", "pip"]),
            },
            Step {
                kind: StepKind::InstallAutomationPackage,
                command: self.pip().arg(config.automation_package.as_str()),
            },
            Step {
                kind: StepKind::InstallFrontEnds,
                command: self.pip().args(config.front_end_packages.iter().cloned()),
            },
            Step {
                kind: StepKind::ConfigureAutomationPackage,
                command: CommandLine::new(self.layout.python())
                    .arg("-m")
                    .arg(config.post_install_module.as_str())
                    .arg(self.installation.variable.as_str())
                    .envs(&self.overlay),
            },
        ]
    }

    /// The in-place upgrade of the automation package
    pub fn update_step(&self, config: &LauncherConfig) -> Step {
        Step {
            kind: StepKind::UpdateAutomationPackage,
            command: self
                .pip()
                .arg("--upgrade")
                .arg(config.automation_package.as_str()),
        }
    }

    /// Bring the environment to the provisioned state.
    ///
    /// Returns the steps that actually ran. A fully provisioned environment
    /// runs nothing; a partial one resumes after its last recorded step,
    /// unless it was started for another installation, in which case it is
    /// rebuilt from scratch.
    pub fn ensure(
        &self,
        config: &LauncherConfig,
        runner: &mut dyn CommandRunner,
    ) -> Result<Vec<StepKind>, LauncherError> {
        let root = self.layout.root();
        let mut clear = false;
        let mut state = match ProvisionState::status(root)? {
            ProvisionStatus::Provisioned(state) => {
                if state.version_label != self.installation.label.to_string() {
                    warn!(
                        environment = %state.version_label,
                        resolved = %self.installation.label,
                        "environment was provisioned for a different AEDT release"
                    );
                }
                return Ok(Vec::new());
            }
            ProvisionStatus::Partial(state)
                if !state.install_variable.is_empty()
                    && state.install_variable != self.installation.variable =>
            {
                warn!(
                    environment = %state.install_variable,
                    resolved = %self.installation.variable,
                    "incomplete environment was started for another installation, rebuilding"
                );
                clear = true;
                ProvisionState::default()
            }
            ProvisionStatus::Partial(state) => {
                info!(
                    completed = state.completed.len(),
                    "resuming incomplete provisioning"
                );
                state
            }
            ProvisionStatus::Unprovisioned => {
                info!(path = %root.display(), "provisioning new environment");
                ProvisionState::default()
            }
        };
        state.install_variable = self.installation.variable.clone();
        state.version_label = self.installation.label.to_string();

        let pending: Vec<Step> = self
            .plan_from(config, clear)
            .into_iter()
            .filter(|step| !state.is_done(step.kind))
            .collect();
        let mut ran = Vec::with_capacity(pending.len());

        run_steps(runner, &pending, |kind| {
            ran.push(kind);
            // venv creates the directory; make sure it exists before saving into it
            fs::create_dir_all(root).map_err(|e| LauncherError::WriteState {
                path: ProvisionState::path_in(root),
                reason: e.to_string(),
            })?;
            state.mark_done(kind);
            state.save(root)
        })?;

        state.complete = true;
        state.save(root)?;
        info!(path = %root.display(), "environment provisioned");
        Ok(ran)
    }

    /// Upgrade the automation package in place
    pub fn update(
        &self,
        config: &LauncherConfig,
        runner: &mut dyn CommandRunner,
    ) -> Result<(), LauncherError> {
        run_step(runner, &self.update_step(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::CandidateVariable;
    use std::io;

    use crate::pipeline::RunResult;

    #[derive(Default)]
    struct Recorder {
        commands: Vec<CommandLine>,
        fail_on: Option<usize>,
    }

    impl CommandRunner for Recorder {
        fn run(&mut self, command: &CommandLine) -> io::Result<RunResult> {
            self.commands.push(command.clone());
            let exit_code = match self.fail_on {
                Some(n) if n + 1 == self.commands.len() => 1,
                _ => 0,
            };
            Ok(RunResult { exit_code })
        }
    }

    fn installation() -> ResolvedInstallation {
        let candidate = CandidateVariable::new("ANSYSEM_ROOT221").unwrap();
        ResolvedInstallation {
            variable: candidate.name().to_string(),
            label: candidate.label(),
            install_path: PathBuf::from("/ansys/v221"),
        }
    }

    fn provisioner(root: &Path) -> Provisioner {
        let parent: Environment = [("PATH", "/usr/bin")].into_iter().collect();
        Provisioner::new(EnvironmentLayout::new(root), installation(), &parent)
    }

    #[test]
    fn plan_uses_bundled_interpreter_then_environment_python() {
        let config = LauncherConfig::default();
        let p = provisioner(Path::new("/data/env"));
        let plan = p.plan(&config);

        let kinds: Vec<StepKind> = plan.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            [
                StepKind::CreateEnvironment,
                StepKind::UpgradePip,
                StepKind::InstallAutomationPackage,
                StepKind::InstallFrontEnds,
                StepKind::ConfigureAutomationPackage,
            ]
        );
        assert!(plan[0].command.program.starts_with("/ansys/v221"));
        assert_eq!(plan[0].command.args, ["-m", "venv", "/data/env"]);
        for step in &plan[1..] {
            assert_eq!(step.command.program, p.layout().python());
        }
        assert_eq!(
            plan[3].command.args[3..],
            ["jupyterlab", "spyder", "ipython", "ipyvtklink"]
        );
        assert_eq!(
            plan[4].command.args,
            ["-m", "pyaedt.misc.aedtlib_personalib_install", "ANSYSEM_ROOT221"]
        );
    }

    #[test]
    fn activation_exports_installation() {
        let p = provisioner(Path::new("/data/env"));
        let overlay = p.overlay();
        assert_eq!(overlay[VERSION_VAR], OsString::from("22R1"));
        assert_eq!(overlay[INSTALL_DIR_VAR], OsString::from("/ansys/v221"));
        assert_eq!(overlay["VIRTUAL_ENV"], OsString::from("/data/env"));
    }

    #[test]
    fn first_run_executes_every_step_and_records_completion() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let root = dir.path().join("env");
        let mut runner = Recorder::default();
        let ran = provisioner(&root)
            .ensure(&LauncherConfig::default(), &mut runner)
            .unwrap();

        assert_eq!(ran.len(), 5);
        assert_eq!(runner.commands.len(), 5);
        match ProvisionState::status(&root).unwrap() {
            ProvisionStatus::Provisioned(state) => {
                assert_eq!(state.install_variable, "ANSYSEM_ROOT221");
                assert_eq!(state.completed.len(), 5);
            }
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[test]
    fn provisioned_environment_runs_nothing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let mut state = ProvisionState::new("ANSYSEM_ROOT221", "22R1");
        state.complete = true;
        state.save(dir.path()).unwrap();

        let mut runner = Recorder::default();
        let ran = provisioner(dir.path())
            .ensure(&LauncherConfig::default(), &mut runner)
            .unwrap();
        assert!(ran.is_empty());
        assert!(runner.commands.is_empty());
    }

    #[test]
    fn failed_run_resumes_at_the_failing_step() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let root = dir.path().join("env");
        let config = LauncherConfig::default();

        let mut runner = Recorder {
            fail_on: Some(2),
            ..Recorder::default()
        };
        let err = provisioner(&root).ensure(&config, &mut runner).unwrap_err();
        assert!(matches!(err, LauncherError::StepFailed { ref step, .. } if step == "install-automation-package"));
        assert!(matches!(
            ProvisionState::status(&root).unwrap(),
            ProvisionStatus::Partial(_)
        ));

        let mut runner = Recorder::default();
        let ran = provisioner(&root).ensure(&config, &mut runner).unwrap();
        assert_eq!(
            ran,
            [
                StepKind::InstallAutomationPackage,
                StepKind::InstallFrontEnds,
                StepKind::ConfigureAutomationPackage,
            ]
        );
    }

    #[test]
    fn partial_run_for_another_installation_starts_over() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let mut state = ProvisionState::new("ANSYSEM_ROOT212", "21R2");
        state.mark_done(StepKind::CreateEnvironment);
        state.mark_done(StepKind::UpgradePip);
        state.save(dir.path()).unwrap();

        let mut runner = Recorder::default();
        let ran = provisioner(dir.path())
            .ensure(&LauncherConfig::default(), &mut runner)
            .unwrap();

        assert_eq!(ran.len(), 5);
        assert!(runner.commands[0].program.starts_with("/ansys/v221"));
        assert!(runner.commands[0].args.iter().any(|a| a == "--clear"));
        match ProvisionState::status(dir.path()).unwrap() {
            ProvisionStatus::Provisioned(state) => {
                assert_eq!(state.install_variable, "ANSYSEM_ROOT221");
                assert_eq!(state.version_label, "22R1");
            }
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[test]
    fn partial_run_for_same_installation_does_not_clear() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let mut state = ProvisionState::new("ANSYSEM_ROOT221", "22R1");
        state.mark_done(StepKind::CreateEnvironment);
        state.save(dir.path()).unwrap();

        let mut runner = Recorder::default();
        let ran = provisioner(dir.path())
            .ensure(&LauncherConfig::default(), &mut runner)
            .unwrap();

        assert_eq!(ran.len(), 4);
        assert!(runner.commands.iter().all(|c| !c.args.iter().any(|a| a == "--clear")));
    }

    #[test]
    fn update_is_a_single_upgrade_install() {
        let config = LauncherConfig::default();
        let mut runner = Recorder::default();
        provisioner(Path::new("/data/env"))
            .update(&config, &mut runner)
            .unwrap();
        assert_eq!(runner.commands.len(), 1);
        assert_eq!(
            runner.commands[0].args,
            ["-m", "pip", "install", "--upgrade", "pyaedt"]
        );
    }
}
