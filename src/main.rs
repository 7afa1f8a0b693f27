//! Binary entry point for the `yandex-machine` CLI.

use std::io::{self, Write};
use std::process;

use camino::Utf8Path;
use clap::Parser;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use yandex_machine::driver::{ResolvedPlacement, check_local_preconditions};
use yandex_machine::files::expand_tilde;
use yandex_machine::{
    CloudInitError, ConfigError, DriverError, LifecycleDriver, Machine, MachineState, SshHost,
    YandexApiError, YandexBackend, YandexConfig, read_public_key,
};

mod cli;

use cli::{Cli, CreateCommand, InstanceArgs};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to connect to Yandex Cloud: {0}")]
    Connect(#[from] YandexApiError),
    #[error("failed to read the SSH public key: {0}")]
    PublicKey(#[from] CloudInitError),
    #[error(transparent)]
    Driver(#[from] DriverError<YandexApiError>),
}

/// Result of a successful subcommand, rendered on stdout.
#[derive(Debug)]
enum Outcome {
    Created(Machine),
    Checked(ResolvedPlacement),
    Done,
    State(MachineState),
    Url(String),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,yandex_machine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(outcome) => {
            write_outcome(io::stdout(), &outcome);
            0
        }
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<Outcome, CliError> {
    let config = YandexConfig::load_without_cli_args()?;
    match cli {
        Cli::Create(command) => exec_create(&config, &command).await,
        Cli::Start(args) => {
            connect(&config).await?.start(&args.instance_id).await?;
            Ok(Outcome::Done)
        }
        Cli::Stop(args) => {
            connect(&config).await?.stop(&args.instance_id).await?;
            Ok(Outcome::Done)
        }
        Cli::Kill(args) => {
            connect(&config).await?.kill(&args.instance_id).await?;
            Ok(Outcome::Done)
        }
        Cli::Restart(args) => {
            connect(&config).await?.restart(&args.instance_id).await?;
            Ok(Outcome::Done)
        }
        Cli::Remove(args) => {
            connect(&config).await?.remove(&args.instance_id).await?;
            Ok(Outcome::Done)
        }
        Cli::State(args) => exec_state(&config, &args).await,
        Cli::Url(args) => {
            let url = connect(&config)
                .await?
                .url(&args.instance_id, config.address_policy())
                .await?;
            Ok(Outcome::Url(url))
        }
    }
}

async fn connect(config: &YandexConfig) -> Result<LifecycleDriver<YandexBackend>, CliError> {
    let backend = YandexBackend::connect(&config.api_config()).await?;
    Ok(LifecycleDriver::new(backend))
}

async fn exec_create(config: &YandexConfig, command: &CreateCommand) -> Result<Outcome, CliError> {
    let mut machine_config = config.as_machine_config(&command.name)?;
    if let Some(key) = command.ssh_key.as_deref() {
        machine_config
            .identity
            .set_ssh_key_path(expand_tilde(Utf8Path::new(key)));
    }
    let public_key = read_public_key(&machine_config.identity)?;
    check_local_preconditions::<YandexApiError>(&machine_config)?;

    let driver = connect(config).await?;
    let placement = driver.pre_create_check(&machine_config).await?;
    if command.check_only {
        return Ok(Outcome::Checked(placement));
    }

    let machine = driver
        .create_placed(&machine_config, &placement, &public_key)
        .await?;
    Ok(Outcome::Created(machine))
}

async fn exec_state(config: &YandexConfig, args: &InstanceArgs) -> Result<Outcome, CliError> {
    let state = connect(config).await?.state(&args.instance_id).await?;
    Ok(Outcome::State(state))
}

fn write_outcome(mut target: impl Write, outcome: &Outcome) {
    let written = match outcome {
        Outcome::Created(machine) => writeln!(
            target,
            "instance_id={}\naddress={}",
            machine.instance_id, machine.address
        ),
        Outcome::Checked(placement) => writeln!(
            target,
            "pre-create checks passed: folder {} subnet {}",
            placement.folder_id, placement.subnet_id
        ),
        Outcome::Done => Ok(()),
        Outcome::State(state) => writeln!(target, "{state}"),
        Outcome::Url(url) => writeln!(target, "{url}"),
    };
    written.ok();
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
