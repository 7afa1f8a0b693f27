//! Command-line interface definitions for the `yandex-machine` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser};

/// Top-level CLI for the `yandex-machine` binary.
#[derive(Debug, Parser)]
#[command(
    name = "yandex-machine",
    about = "Provision and manage a single Docker host on Yandex Cloud",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Create a machine and print its instance id and address.
    #[command(name = "create", about = "Create a machine and wait until it is running")]
    Create(CreateCommand),
    /// Start a stopped machine.
    #[command(name = "start", about = "Start a stopped machine")]
    Start(InstanceArgs),
    /// Stop a running machine.
    #[command(name = "stop", about = "Stop a running machine")]
    Stop(InstanceArgs),
    /// Stop a machine without a graceful shutdown request.
    #[command(name = "kill", about = "Stop a machine immediately")]
    Kill(InstanceArgs),
    /// Restart a machine.
    #[command(name = "restart", about = "Restart a machine")]
    Restart(InstanceArgs),
    /// Delete a machine.
    #[command(name = "remove", about = "Delete a machine and its boot disk")]
    Remove(InstanceArgs),
    /// Print the coarse machine state.
    #[command(name = "state", about = "Print the machine state")]
    State(InstanceArgs),
    /// Print the Docker daemon URL.
    #[command(name = "url", about = "Print the Docker daemon URL of a machine")]
    Url(InstanceArgs),
}

/// Arguments for the `yandex-machine create` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct CreateCommand {
    /// Instance name, unique within the target folder.
    #[arg(value_name = "NAME")]
    pub(crate) name: String,
    /// Private SSH key whose `.pub` sibling is installed on the machine.
    ///
    /// Overrides `YC_SSH_KEY_PATH` and the `ssh_key_path` configuration key.
    #[arg(long, value_name = "PATH")]
    pub(crate) ssh_key: Option<String>,
    /// Only run the pre-create checks without creating anything.
    #[arg(long)]
    pub(crate) check_only: bool,
}

/// Arguments shared by the subcommands that act on an existing instance.
#[derive(Debug, Args)]
pub(crate) struct InstanceArgs {
    /// Provider instance identifier returned by `create`.
    #[arg(value_name = "INSTANCE_ID")]
    pub(crate) instance_id: String,
}
