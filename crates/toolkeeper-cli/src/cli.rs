//! Argument definitions for the `toolkeeper` binary.

use clap::{Parser, Subcommand};

/// Supervises the browser-tools collection server and bridge client.
#[derive(Parser, Debug)]
#[command(name = "toolkeeper", version, disable_help_subcommand = true)]
pub(crate) struct Cli {
    /// What to do.
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Supervisor commands.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CliCommand {
    /// Starts both services and keeps them running until interrupted.
    Start,
    /// Stops both services, including ones started elsewhere.
    Stop,
    /// Reports whether the services, port, config, and browser are healthy.
    Status {
        /// Emits the status as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Runs the failure checks and prints remedies.
    Diagnose,
    /// Prints instructions for configuring the host by hand.
    Guide,
    /// Prints the supervisor log.
    Logs,
    /// Empties the supervisor log.
    ClearLogs,
    /// Removes the managed entry from the host configuration.
    Uninstall,
}
