//! CLI entrypoint for the browser-tools supervisor.
//!
//! The binary delegates to [`toolkeeper_cli::run`], which loads layered
//! configuration, parses the subcommand, and drives the orchestrator.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    toolkeeper_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
