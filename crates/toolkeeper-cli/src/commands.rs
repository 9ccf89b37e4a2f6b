//! Subcommand handlers.

use std::io::Write;
use std::process::ExitCode;

use tokio::signal::unix::{SignalKind, signal};
use toolkeeper::diagnosis::suggestions_for;
use toolkeeper::process::ExitRecord;
use toolkeeper::{
    ClientOutcome, ClientStatus, ConfigOutcome, Orchestrator, ReadyReport, ServiceStatus,
};
use tracing::info;

use crate::cli::CliCommand;
use crate::errors::AppError;

const CLI_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::commands");

/// Why a foreground `start` stopped waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shutdown {
    Interrupted,
    Terminated,
    ServerExited(Option<ExitRecord>),
}

pub(crate) async fn dispatch<W, E>(
    command: CliCommand,
    mut orchestrator: Orchestrator,
    stdout: &mut W,
    stderr: &mut E,
) -> Result<ExitCode, AppError>
where
    W: Write,
    E: Write,
{
    match command {
        CliCommand::Start => start(&mut orchestrator, stdout, stderr).await,
        CliCommand::Stop => {
            if !orchestrator.stop().await {
                return Err(AppError::StopIncomplete);
            }
            writeln!(stdout, "browser tools stopped").map_err(AppError::Output)?;
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Status { json } => {
            let status = orchestrator.get_status().await;
            let server_port = orchestrator.settings().server_port;
            let debug_port = orchestrator.settings().browser_debug_port;
            if json {
                let rendered =
                    serde_json::to_string_pretty(&status).map_err(AppError::SerialiseStatus)?;
                writeln!(stdout, "{rendered}").map_err(AppError::Output)?;
            } else {
                write_status(stdout, &status, server_port, debug_port)
                    .map_err(AppError::Output)?;
            }
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Diagnose => {
            let issues = orchestrator.diagnose().await;
            let suggestions = suggestions_for(&issues);
            if issues.is_empty() {
                writeln!(stdout, "No issues found.").map_err(AppError::Output)?;
            } else {
                writeln!(stdout, "Issues found:").map_err(AppError::Output)?;
                for (number, issue) in (1..).zip(&issues) {
                    writeln!(stdout, "{number}. {issue}").map_err(AppError::Output)?;
                }
            }
            writeln!(stdout, "Suggestions:").map_err(AppError::Output)?;
            for (number, suggestion) in (1..).zip(&suggestions) {
                writeln!(stdout, "{number}. {suggestion}").map_err(AppError::Output)?;
            }
            Ok(if issues.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        CliCommand::Guide => {
            let guide = orchestrator.config_guide().await;
            write!(stdout, "{guide}").map_err(AppError::Output)?;
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Logs => {
            let logs = orchestrator.get_logs()?;
            stdout
                .write_all(logs.as_bytes())
                .map_err(AppError::Output)?;
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::ClearLogs => {
            orchestrator.clear_logs()?;
            writeln!(stdout, "log cleared").map_err(AppError::Output)?;
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Uninstall => {
            if !orchestrator.uninstall_cleanup_config() {
                return Err(AppError::UninstallFailed);
            }
            writeln!(
                stdout,
                "removed {} from {}",
                orchestrator.settings().service_name,
                orchestrator.settings().host_config_path.display()
            )
            .map_err(AppError::Output)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn start<W, E>(
    orchestrator: &mut Orchestrator,
    stdout: &mut W,
    stderr: &mut E,
) -> Result<ExitCode, AppError>
where
    W: Write,
    E: Write,
{
    let report = match orchestrator.start_detailed().await {
        Ok(report) => report,
        Err(failure) => {
            writeln!(stderr, "{}", failure.detailed_message()).map_err(AppError::Output)?;
            return Ok(ExitCode::FAILURE);
        }
    };
    write_ready(stdout, &report, orchestrator.settings().server_port)
        .map_err(AppError::Output)?;

    let shutdown = wait_for_shutdown(orchestrator).await;
    info!(target: CLI_TARGET, reason = ?shutdown, "shutting down browser tools");
    let stopped = orchestrator.stop().await;
    let shutdown = shutdown?;

    if let Shutdown::ServerExited(exit) = shutdown {
        let detail = exit.map_or_else(|| "unknown status".to_owned(), |record| record.to_string());
        writeln!(stderr, "server exited unexpectedly ({detail})").map_err(AppError::Output)?;
        return Ok(ExitCode::FAILURE);
    }
    if !stopped {
        return Err(AppError::StopIncomplete);
    }
    Ok(ExitCode::SUCCESS)
}

async fn wait_for_shutdown(orchestrator: &Orchestrator) -> Result<Shutdown, AppError> {
    let mut terminate = signal(SignalKind::terminate()).map_err(AppError::Signal)?;
    tokio::select! {
        interrupted = tokio::signal::ctrl_c() => {
            interrupted.map_err(AppError::Signal)?;
            Ok(Shutdown::Interrupted)
        }
        _ = terminate.recv() => Ok(Shutdown::Terminated),
        exit = orchestrator.wait_for_server_exit() => Ok(Shutdown::ServerExited(exit)),
    }
}

fn write_ready<W: Write>(out: &mut W, report: &ReadyReport, port: u16) -> std::io::Result<()> {
    writeln!(
        out,
        "browser tools server ready on port {port} (pid {})",
        report.server_pid
    )?;
    let config = match &report.config {
        ConfigOutcome::Created => "created".to_owned(),
        ConfigOutcome::Updated => "updated".to_owned(),
        ConfigOutcome::Unchanged => "unchanged".to_owned(),
        ConfigOutcome::Reset { backup } => {
            format!("reset (original saved to {})", backup.display())
        }
        ConfigOutcome::Skipped => "skipped".to_owned(),
    };
    writeln!(out, "host configuration {config}")?;
    match &report.client {
        ClientStatus::Spawned {
            pid,
            outcome: ClientOutcome::Confirmed,
        } => writeln!(out, "bridge client connected (pid {pid})"),
        ClientStatus::Spawned {
            pid,
            outcome: ClientOutcome::LikelyStarted,
        } => writeln!(out, "bridge client started (pid {pid})"),
        ClientStatus::Spawned {
            pid,
            outcome: ClientOutcome::Failed { exit },
        } => writeln!(out, "bridge client (pid {pid}) failed: {exit}"),
        ClientStatus::NotStarted { reason } => {
            writeln!(out, "bridge client not started: {reason}")
        }
    }?;
    writeln!(out, "press Ctrl-C to stop")
}

fn write_status<W: Write>(
    out: &mut W,
    status: &ServiceStatus,
    server_port: u16,
    debug_port: u16,
) -> std::io::Result<()> {
    let state = |flag: bool, yes: &'static str, no: &'static str| if flag { yes } else { no };
    writeln!(
        out,
        "server:             {}",
        state(status.server_running, "running", "stopped")
    )?;
    writeln!(
        out,
        "client:             {}",
        state(status.client_running, "running", "stopped")
    )?;
    writeln!(
        out,
        "port {server_port}:{:pad$}{}",
        "",
        state(status.port_occupied, "in use", "free"),
        pad = 14_usize.saturating_sub(server_port.to_string().len()),
    )?;
    writeln!(
        out,
        "host configuration: {}",
        state(status.config_valid, "valid", "missing or invalid")
    )?;
    writeln!(
        out,
        "browser debugging:  {} (port {debug_port})",
        state(status.browser_debugging, "available", "unavailable")
    )
}
