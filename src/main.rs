use clap::Parser;
use diskmon::collectors::{CommandExecutor, ShellCommandRunner};
use diskmon::config::Config;
use diskmon::sampler::DIAGNOSTIC_COMMANDS;
use diskmon::DiskMonitor;
use log::{error, info, warn};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;

/// Command-line arguments for the disk monitor
#[derive(Parser)]
#[command(
    name = "diskmon",
    about = "Capture iostat/iotop bursts whenever a disk stall is reported",
    long_about = "Runs a background disk sampler. Every line read on standard input counts as \
                  one fsync-stall trigger and schedules one more burst of `iostat -d -x` and \
                  `iotop -botq --iter=3` samples, which are written to the log."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(
        short,
        long,
        help = "Enable verbose logging output (sets RUST_LOG=debug)"
    )]
    verbose: bool,

    /// Run each diagnostic command once and exit
    #[arg(long, help = "Check that iostat and iotop can be executed, then exit")]
    check_tools: bool,
}

impl Cli {
    /// Validate the CLI arguments
    ///
    /// # Returns
    ///
    /// `Ok(())` if all arguments are valid, `Err(String)` with error message otherwise
    fn validate(&self) -> Result<(), String> {
        if let Some(ref config_path) = self.config {
            // Missing files fall back to defaults in Config::load
            if config_path.exists() {
                if !config_path.is_file() {
                    return Err(format!(
                        "Configuration path is not a file: {}",
                        config_path.display()
                    ));
                }

                if let Some(extension) = config_path.extension() {
                    if extension != "toml" {
                        warn!(
                            "Configuration file does not have .toml extension: {}",
                            config_path.display()
                        );
                    }
                }
            }
        }

        Ok(())
    }
}

/// Why the main thread woke up
#[derive(Debug)]
enum ControlMessage {
    Shutdown,
    InputClosed,
}

/// Run every diagnostic command once and report whether each one worked
fn check_tools(executor: &dyn CommandExecutor) -> bool {
    let mut all_ok = true;

    for command in DIAGNOSTIC_COMMANDS {
        let result = executor.execute(command);
        if result.is_success() {
            info!("'{}' is available", command);
        } else {
            error!(
                "'{}' failed with exit code {}: {}",
                command,
                result.exit_code,
                result.stderr.trim()
            );
            all_ok = false;
        }
    }

    all_ok
}

/// Turn every stdin line into a trigger until stdin closes
fn spawn_stdin_trigger_thread(
    monitor: Arc<DiskMonitor>,
    control: Sender<ControlMessage>,
) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("diskmon-stdin".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(_) => monitor.trigger(),
                    Err(e) => {
                        error!("Failed to read trigger input: {}", e);
                        break;
                    }
                }
            }

            info!("Trigger input closed");
            // The receiver is gone once main has already begun shutting down
            control.send(ControlMessage::InputClosed).ok();
        })
        .map(|_| ())
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::init();

    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    let mut config = Config::load(cli.config.as_deref());
    config.apply_env_overrides();

    if cli.check_tools {
        let ok = check_tools(&ShellCommandRunner::new());
        std::process::exit(if ok { 0 } else { 1 });
    }

    let monitor = Arc::new(DiskMonitor::new(&config.monitor));
    if let Err(e) = monitor.start() {
        error!("Failed to start disk monitor: {}", e);
        std::process::exit(1);
    }

    if !monitor.is_started() {
        info!("Disk monitor is disabled, exiting");
        return;
    }

    let (control_sender, control_receiver) = mpsc::channel();

    let shutdown_sender = control_sender.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received interrupt signal (SIGINT), shutting down gracefully...");
        if let Err(e) = shutdown_sender.send(ControlMessage::Shutdown) {
            error!("Failed to send shutdown signal: {}", e);
        }
    }) {
        error!("Error setting SIGINT handler: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = spawn_stdin_trigger_thread(Arc::clone(&monitor), control_sender) {
        error!("Failed to spawn trigger input thread: {}", e);
        std::process::exit(1);
    }

    info!("Disk monitor is running. Each input line triggers a burst; press Ctrl+C to stop.");

    match control_receiver.recv() {
        Ok(message) => info!("Shutting down: {:?}", message),
        Err(e) => error!("Error waiting for shutdown: {}", e),
    }

    if let Err(e) = monitor.stop() {
        error!("Error during shutdown: {}", e);
        std::process::exit(1);
    }

    info!("Disk monitor shutdown complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use diskmon::SampleResult;

    struct FixedExecutor {
        exit_code: i32,
    }

    impl CommandExecutor for FixedExecutor {
        fn execute(&self, command: &str) -> SampleResult {
            SampleResult::new(command, self.exit_code, String::new(), "boom".to_string())
        }
    }

    #[test]
    fn test_cli_validation_with_existing_file() {
        let temp_file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        std::fs::write(temp_file.path(), "[monitor]\nenabled = true").unwrap();

        let cli = Cli {
            config: Some(temp_file.path().to_path_buf()),
            verbose: false,
            check_tools: false,
        };

        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_cli_validation_with_missing_file() {
        let cli = Cli {
            config: Some(PathBuf::from("/nonexistent/diskmon.toml")),
            verbose: false,
            check_tools: false,
        };

        // Missing files are handled by falling back to defaults
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_cli_validation_with_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli {
            config: Some(dir.path().to_path_buf()),
            verbose: false,
            check_tools: false,
        };

        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::try_parse_from(["diskmon", "--config", "a.toml", "-v", "--check-tools"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("a.toml")));
        assert!(cli.verbose);
        assert!(cli.check_tools);
    }

    #[test]
    fn test_check_tools_reports_failures() {
        assert!(check_tools(&FixedExecutor { exit_code: 0 }));
        assert!(!check_tools(&FixedExecutor { exit_code: 1 }));
    }
}
