//! Managed child processes.
//!
//! Launches the server and client with piped stdio, records their PIDs in
//! files so later invocations can find them, forwards every output line to
//! the log, and signals them on the way down.

mod errors;
mod pid_file;
mod signal;
mod spawn;

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");

pub use errors::{PidFileError, SpawnError};
pub use pid_file::PidFile;
pub use signal::{Termination, is_alive, terminate, terminate_with_grace};
pub use spawn::{
    ChildEvent, ChildEvents, ExitRecord, LaunchSpec, PID_POLL_ATTEMPTS, PID_POLL_INTERVAL,
    ProcessHandle, ProcessSupervisor, ServiceRole,
};
