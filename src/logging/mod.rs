pub mod config;
pub mod context;
pub mod layers;

pub use context::{detect_context, ExecutionContext};
pub use layers::console::ConsoleOutput;

use crate::logging::config::LoggingConfig;
use crate::logging::layers::{console, file};
use crate::{cli::Command, Result};
use anyhow::{anyhow, Context};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::Registry;

static LOGGER_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Guards that keep logging sinks active for the duration of the command.
pub struct LoggingGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
    console_output: ConsoleOutput,
    log_file_path: PathBuf,
}

impl LoggingGuard {
    /// Returns the console output configuration used during initialization.
    pub fn console_output(&self) -> ConsoleOutput {
        self.console_output
    }

    /// Returns the log file path backed by the file sink.
    pub fn log_file_path(&self) -> &Path {
        &self.log_file_path
    }
}

/// Initialize the logging framework for the provided CLI command.
///
/// Filters, the file sink and the console sink follow the precedence defaults, then
/// `.apiflows/config/logging.toml`, then environment. It errors when invoked more than once
/// per process invocation unless tests explicitly reset the guard.
pub fn init(command: &Command) -> Result<LoggingGuard> {
    if LOGGER_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(anyhow!("logging already initialized"));
    }

    let context = detect_context(command);
    let workspace_root = resolve_workspace_path(command);
    let config = LoggingConfig::load(workspace_root.as_deref())?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_level))
        .context("failed to configure tracing level")?;
    let log_file_path = layers::file::log_file_path(&config, workspace_root.as_deref())?;
    type BaseRegistry = Registry;
    type FileSubscriber = file::FileLayerStack<BaseRegistry>;

    let (file_layer, file_guard) =
        file::file_layer::<BaseRegistry>(&log_file_path, config.enable_file)?;

    let subscriber = tracing_subscriber::registry();
    let subscriber = subscriber.with(file_layer);

    let console_output = console::select_console_output(context, config.console_output);
    let console_layer = console::console_layer::<FileSubscriber>(console_output);
    let subscriber = subscriber.with(console_layer);

    let subscriber = subscriber.with(env_filter);
    subscriber
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
        console_output,
        log_file_path,
    })
}

fn resolve_workspace_path(command: &Command) -> Option<PathBuf> {
    command
        .workspace()
        .map(Path::to_path_buf)
        .or_else(|| env::current_dir().ok())
}

#[cfg(test)]
/// Reset the initialization guard so tests can reconfigure logging multiple times.
pub fn reset_for_tests() {
    LOGGER_INITIALIZED.store(false, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Args;
    use clap::Parser;
    use serial_test::serial;
    use std::fs;
    use std::sync::{Arc, Mutex};

    #[test]
    #[serial]
    fn init_writes_file_and_console_once_per_process() {
        reset_for_tests();
        env::remove_var("CI");
        env::remove_var("APIFLOWS_LOG_LEVEL");
        let workspace = tempfile::tempdir().unwrap();
        let args = Args::parse_from([
            "apiflows",
            "unfold",
            "snapshot.yaml",
            "--workspace",
            workspace.path().to_str().unwrap(),
        ]);

        let buffer = Arc::new(Mutex::new(Vec::new()));
        console::set_test_output(buffer.clone());

        let guard = init(&args.command).unwrap();
        assert_eq!(guard.console_output(), ConsoleOutput::Stderr);
        assert!(guard
            .log_file_path()
            .ends_with(".apiflows/logs/apiflows.log"));

        tracing::info!("multi sink event");
        assert!(init(&args.command).is_err());

        let log_path = guard.log_file_path().to_path_buf();
        drop(guard);
        let file_contents = fs::read_to_string(log_path).unwrap();
        assert!(file_contents.contains("multi sink event"));

        let console_contents = String::from_utf8_lossy(&buffer.lock().unwrap()).to_string();
        assert!(console_contents.contains("multi sink event"));

        console::clear_test_output();
    }
}
