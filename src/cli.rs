use std::ffi::OsString;
use std::path::PathBuf;

use clap::{CommandFactory, Parser};
use tracing::Level;

use crate::launcher::LaunchOptions;
use crate::resolver::VersionLabel;

#[derive(Parser, Debug)]
#[command(
    name = "aedt_console",
    version,
    about = "Launch a PyAEDT front-end in a dedicated Python environment"
)]
pub struct Cli {
    /// Upgrade pyaedt in place before launching (also accepted as `-update`)
    #[arg(long)]
    pub update: bool,

    /// Answer the run mode prompt: 0 = IDE, 1 = notebook, anything else = shell
    #[arg(long, value_name = "SELECTION", allow_hyphen_values = true)]
    pub mode: Option<String>,

    /// Use this AEDT release (e.g. 22R1) instead of the newest installed one
    #[arg(long = "aedt-version", value_name = "YYRZ")]
    pub aedt_version: Option<VersionLabel>,

    /// List installed AEDT releases and exit
    #[arg(long)]
    pub list_versions: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    pub print_config: bool,

    /// Configuration file (default: <appdata>/aedt_console/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Location of the Python environment
    #[arg(long, value_name = "PATH")]
    pub env_dir: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Parse arguments, accepting the legacy single-dash `-update`
    pub fn parse_from_env() -> Self {
        Self::parse_from(normalize_args(std::env::args_os()))
    }

    pub fn log_level(&self) -> Level {
        match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }

    pub fn launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            update: self.update,
            version: self.aedt_version,
            env_dir: self.env_dir.clone(),
        }
    }
}

/// Rewrite `-update` to `--update`; everything else passes through.
///
/// The value of an option given as a separate argument (`--mode -update`)
/// and anything after `--` are left alone.
pub fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut command = Cli::command();
    command.build();
    let takes_value: Vec<String> = command
        .get_arguments()
        .filter(|arg| arg.get_action().takes_values())
        .filter_map(|arg| arg.get_long())
        .map(|long| format!("--{}", long))
        .collect();

    let mut normalized = Vec::new();
    let mut expect_value = false;
    let mut passthrough = false;
    for arg in args {
        if passthrough || expect_value {
            expect_value = false;
            normalized.push(arg);
            continue;
        }
        if arg == "--" {
            passthrough = true;
        } else if arg == "-update" {
            normalized.push(OsString::from("--update"));
            continue;
        } else if let Some(flag) = arg.to_str() {
            expect_value = takes_value.iter().any(|long| long == flag);
        }
        normalized.push(arg);
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let argv = std::iter::once("aedt_console")
            .chain(args.iter().copied())
            .map(OsString::from);
        Cli::try_parse_from(normalize_args(argv)).expect("valid arguments")
    }

    #[test]
    fn legacy_update_flag() {
        assert!(parse(&["-update"]).update);
        assert!(parse(&["--update"]).update);
        assert!(!parse(&[]).update);
    }

    #[test]
    fn version_and_mode() {
        let cli = parse(&["--aedt-version", "21R2", "--mode", "1"]);
        assert_eq!(cli.aedt_version.map(|v| v.to_string()).as_deref(), Some("21R2"));
        assert_eq!(cli.mode.as_deref(), Some("1"));
    }

    #[test]
    fn update_spelling_as_option_value_is_kept() {
        let cli = parse(&["--mode", "-update"]);
        assert_eq!(cli.mode.as_deref(), Some("-update"));
        assert!(!cli.update);

        let cli = parse(&["--mode=-update", "-update"]);
        assert_eq!(cli.mode.as_deref(), Some("-update"));
        assert!(cli.update);

        let argv = ["aedt_console", "--env-dir", "-update"].map(OsString::from);
        assert_eq!(normalize_args(argv)[2], OsString::from("-update"));
    }

    #[test]
    fn verbosity_levels() {
        assert_eq!(parse(&[]).log_level(), Level::WARN);
        assert_eq!(parse(&["-vv"]).log_level(), Level::DEBUG);
    }

    #[test]
    fn bad_version_is_rejected() {
        let argv = ["aedt_console", "--aedt-version", "2022"].map(OsString::from);
        assert!(Cli::try_parse_from(argv).is_err());
    }
}
