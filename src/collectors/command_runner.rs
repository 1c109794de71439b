use crate::error::CommandError;
use crate::events::{SampleResult, FAILED_EXIT_CODE};
use log::{debug, error, warn};
use std::io::{ErrorKind, Read};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};

/// Shell used to interpret diagnostic commands
pub const DEFAULT_SHELL: &str = "sh";

/// Runs a diagnostic command and captures everything it printed
///
/// Implementations must never panic or return early on failure: a command
/// that could not be run is reported through the returned [`SampleResult`].
#[cfg_attr(test, mockall::automock)]
pub trait CommandExecutor: Send + Sync {
    fn execute(&self, command: &str) -> SampleResult;
}

/// Executes commands through `sh -c`, draining stdout and stderr concurrently
///
/// Each stream gets its own reader thread so a child blocked on a full stderr
/// pipe can't stall while we are still waiting for stdout to close.
#[derive(Debug, Clone)]
pub struct ShellCommandRunner {
    shell: String,
}

impl Default for ShellCommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellCommandRunner {
    /// Create a runner that uses the system `sh`
    pub fn new() -> Self {
        Self::with_shell(DEFAULT_SHELL)
    }

    /// Create a runner that interprets commands with a specific shell binary
    ///
    /// The shell is invoked as `<shell> -c <command>`.
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    fn run(&self, command: &str) -> Result<SampleResult, CommandError> {
        debug!("Spawning '{} -c {}'", self.shell, command);

        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CommandError::SubprocessSpawn(format!("{}: {}", command, e)))?;

        let readers = Self::spawn_readers(&mut child);
        let (stdout_reader, stderr_reader) = match readers {
            Ok(readers) => readers,
            Err(e) => {
                Self::reap(&mut child);
                return Err(e);
            }
        };

        // Join both drains before waiting so neither pipe can fill up behind us
        let stdout = Self::join_reader(stdout_reader, "stdout");
        if stdout.is_err() {
            // Nobody drains stdout any more; the child could block on it forever
            Self::reap(&mut child);
        }
        let stderr = Self::join_reader(stderr_reader, "stderr");
        let (stdout, stderr) = match (stdout, stderr) {
            (Ok(stdout), Ok(stderr)) => (stdout, stderr),
            (Err(e), _) | (_, Err(e)) => {
                Self::reap(&mut child);
                return Err(e);
            }
        };

        let status = child
            .wait()
            .map_err(|e| CommandError::SubprocessWait(format!("{}: {}", command, e)))?;

        let exit_code = match status.code() {
            Some(code) => code,
            None => {
                warn!("'{}' terminated without an exit code: {}", command, status);
                FAILED_EXIT_CODE
            }
        };

        Ok(SampleResult::new(
            command,
            exit_code,
            String::from_utf8_lossy(&stdout).into_owned(),
            String::from_utf8_lossy(&stderr).into_owned(),
        ))
    }

    #[allow(clippy::type_complexity)]
    fn spawn_readers(
        child: &mut Child,
    ) -> Result<
        (
            JoinHandle<Result<Vec<u8>, CommandError>>,
            JoinHandle<Result<Vec<u8>, CommandError>>,
        ),
        CommandError,
    > {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CommandError::StreamRead {
                stream: "stdout",
                reason: "stream not captured".to_string(),
            })?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| CommandError::StreamRead {
                stream: "stderr",
                reason: "stream not captured".to_string(),
            })?;

        let stdout_reader = Self::spawn_drain(stdout, "stdout")?;
        // If the second drain can't start, the first still finishes on its own
        // once the child is killed and its pipe closes
        let stderr_reader = Self::spawn_drain(stderr, "stderr")?;

        Ok((stdout_reader, stderr_reader))
    }

    /// Copy a stream into memory on a dedicated thread until EOF
    fn spawn_drain<R>(
        mut stream: R,
        name: &'static str,
    ) -> Result<JoinHandle<Result<Vec<u8>, CommandError>>, CommandError>
    where
        R: Read + Send + 'static,
    {
        thread::Builder::new()
            .name(format!("disk-monitor-{}", name))
            .spawn(move || {
                let mut buffer = Vec::new();
                let mut temp_buf = [0u8; 4096];

                loop {
                    match stream.read(&mut temp_buf) {
                        Ok(0) => break,
                        Ok(n) => buffer.extend_from_slice(&temp_buf[..n]),
                        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                        Err(e) => {
                            error!("Failed to read {} of subprocess: {}", name, e);
                            return Err(CommandError::StreamRead {
                                stream: name,
                                reason: e.to_string(),
                            });
                        }
                    }
                }

                Ok(buffer)
            })
            .map_err(CommandError::IoError)
    }

    fn join_reader(
        handle: JoinHandle<Result<Vec<u8>, CommandError>>,
        stream: &'static str,
    ) -> Result<Vec<u8>, CommandError> {
        handle.join().map_err(|_| CommandError::StreamRead {
            stream,
            reason: "reader thread panicked".to_string(),
        })?
    }

    /// Kill and reap a child we gave up on
    fn reap(child: &mut Child) {
        if let Err(e) = child.kill() {
            debug!("Failed to kill subprocess: {}", e);
        }
        if let Err(e) = child.wait() {
            debug!("Failed to reap subprocess: {}", e);
        }
    }
}

impl CommandExecutor for ShellCommandRunner {
    fn execute(&self, command: &str) -> SampleResult {
        match self.run(command) {
            Ok(result) => result,
            Err(e) => {
                error!("Failed to execute '{}': {}", command, e);
                SampleResult::failed(command, e.to_string())
            }
        }
    }
}
