/// Shell command execution with concurrent stdout/stderr capture
pub mod command_runner;

#[cfg(test)]
pub use command_runner::MockCommandExecutor;
pub use command_runner::{CommandExecutor, ShellCommandRunner};
