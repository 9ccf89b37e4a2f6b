//! Command-line runtime for the browser-tools supervisor.
//!
//! Leading configuration flags are resolved through `ortho_config`
//! (defaults, file, `TOOLKEEPER_*` environment, flags), the remaining tokens
//! select a subcommand, and the subcommand drives a
//! [`toolkeeper::Orchestrator`] on a single-threaded Tokio runtime. IO streams
//! are injected so the runtime can be exercised from tests.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use toolkeeper::{Orchestrator, initialise_telemetry};

mod cli;
mod commands;
mod config;
mod errors;

use cli::Cli;
use config::{ConfigLoader, OrthoConfigLoader, split_arguments};
use errors::AppError;

/// Runs the CLI with the given arguments and output streams.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with_loader(args, stdout, stderr, &OrthoConfigLoader)
}

pub(crate) fn run_with_loader<I, W, E, L>(
    args: I,
    stdout: &mut W,
    stderr: &mut E,
    loader: &L,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let args: Vec<OsString> = args.into_iter().collect();
    match execute(&args, stdout, stderr, loader) {
        Ok(code) => code,
        Err(AppError::CliUsage(error)) => {
            // clap renders help and version requests through the error path.
            let code = if error.use_stderr() {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            };
            let rendered = error.render().to_string();
            let stream: &mut dyn Write = if error.use_stderr() { stderr } else { stdout };
            if stream.write_all(rendered.as_bytes()).is_err() {
                return ExitCode::FAILURE;
            }
            code
        }
        Err(error) => {
            if writeln!(stderr, "{error}").is_err() {
                return ExitCode::FAILURE;
            }
            ExitCode::FAILURE
        }
    }
}

fn execute<W, E, L>(
    args: &[OsString],
    stdout: &mut W,
    stderr: &mut E,
    loader: &L,
) -> Result<ExitCode, AppError>
where
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let split = split_arguments(args);
    let cli = Cli::try_parse_from(&split.command_arguments).map_err(AppError::CliUsage)?;
    let config = loader.load(&split.config_arguments)?;
    let orchestrator = Orchestrator::from_config(&config)?;
    initialise_telemetry(&config, &orchestrator.log_path())?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(AppError::Runtime)?;
    runtime.block_on(commands::dispatch(cli.command, orchestrator, stdout, stderr))
}
