//! What to launch and how to start it.

use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use tracing::debug;

/// A companion process to start: program path plus arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    program: PathBuf,
    args: Vec<OsString>,
}

impl LaunchRequest {
    /// Creates a request for `program` with no arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    /// Appends several arguments.
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }

    /// Path of the program to start.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments passed to the program, in order.
    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    /// Directory the process is started in: the program's own directory.
    pub fn working_dir(&self) -> Option<&Path> {
        self.program
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
    }
}

/// Returns the path of `file_name` in the directory of the running
/// executable.
pub fn sibling_path(file_name: impl AsRef<Path>) -> io::Result<PathBuf> {
    let mut path = std::env::current_exe()?;
    path.pop();
    path.push(file_name);
    Ok(path)
}

/// Starts a launch request.
///
/// The launcher treats spawning as best effort: an error is logged and the
/// launcher still tries to open the channel, since the peer may already be
/// running.
pub trait Spawner {
    /// Starts the process without waiting for it. `Ok` only means the OS
    /// accepted the start.
    fn spawn(&self, request: &LaunchRequest) -> io::Result<()>;
}

impl<F> Spawner for F
where
    F: Fn(&LaunchRequest) -> io::Result<()>,
{
    fn spawn(&self, request: &LaunchRequest) -> io::Result<()> {
        self(request)
    }
}

/// Starts the program as a detached OS process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessSpawner;

impl Spawner for ProcessSpawner {
    fn spawn(&self, request: &LaunchRequest) -> io::Result<()> {
        let mut command = Command::new(request.program());
        command.args(request.arguments()).stdin(Stdio::null());
        if let Some(dir) = request.working_dir() {
            command.current_dir(dir);
        }

        let mut child = command.spawn()?;
        let pid = child.id();
        debug!(pid, program = %request.program().display(), "process spawned");

        // Reap the child when it exits; the launcher never joins it.
        thread::spawn(move || {
            if let Ok(status) = child.wait() {
                debug!(pid, %status, "process exited");
            }
        });
        Ok(())
    }
}
