use std::process::ExitCode;

use aedt_console::cli::Cli;
use aedt_console::prompt::pause_for_acknowledgment;
use aedt_console::{
    Environment, FixedSelection, LauncherConfig, LauncherError, Launcher, SelectionSource,
    SystemRunner, TerminalSelection,
};
use anyhow::{Context, Result};
use tracing::debug;

fn main() -> ExitCode {
    let cli = Cli::parse_from_env();

    // Logs go to stderr so the front-end owns stdout
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level())
        .with_writer(std::io::stderr)
        .init();

    match try_main(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

fn try_main(cli: &Cli) -> Result<u8> {
    // The only place the process environment is read
    let env = Environment::from_parent();
    debug!(variables = env.len(), "captured parent environment");

    let config = match &cli.config {
        Some(path) => LauncherConfig::load(path)?,
        None => {
            let root = env
                .app_data_root()
                .context("cannot locate the default configuration file")?;
            LauncherConfig::load_or_default(&LauncherConfig::default_path(&root))?
        }
    };

    if cli.print_config {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(0);
    }

    let launcher = Launcher::new(config, env);

    if cli.list_versions {
        for installation in launcher.installed()? {
            println!(
                "{}\t{}\t{}\t{}",
                installation.label,
                installation.label.release_id(),
                installation.variable,
                installation.install_path.display()
            );
        }
        return Ok(0);
    }

    let mut selection: Box<dyn SelectionSource> = match &cli.mode {
        Some(mode) => Box::new(FixedSelection(mode.clone())),
        None => Box::new(TerminalSelection::new(&launcher.config().front_ends)),
    };

    let code = launcher.run(&cli.launch_options(), &mut SystemRunner, selection.as_mut())?;
    Ok(code)
}

fn report(err: &anyhow::Error) {
    match err.downcast_ref::<LauncherError>() {
        Some(LauncherError::EnvironmentNotFound {
            minimum_version, ..
        }) => {
            eprintln!("{}", LauncherError::not_found_message(minimum_version));
            debug!("{:#}", err);
            if let Err(pause_err) = pause_for_acknowledgment() {
                debug!(error = %pause_err, "could not wait for acknowledgment");
            }
        }
        Some(LauncherError::Cancelled) => eprintln!("Cancelled."),
        _ => eprintln!("error: {:#}", err),
    }
}
