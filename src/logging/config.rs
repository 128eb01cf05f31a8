use crate::logging::layers::console::ConsoleOutput;
use crate::Result;
use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing_subscriber::filter::Directive;

const DEFAULT_LEVEL: &str = "info";
const LEVEL_ENV: &str = "APIFLOWS_LOG_LEVEL";

/// Resolved logging configuration after reading config files and env overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub log_dir: Option<PathBuf>,
    pub default_level: String,
    pub enable_file: bool,
    pub console_output: Option<ConsoleOutput>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            default_level: DEFAULT_LEVEL.to_string(),
            enable_file: true,
            console_output: None,
        }
    }
}

impl LoggingConfig {
    /// Load configuration with deterministic precedence: defaults, config file, env overrides.
    pub fn load(workspace_root: Option<&Path>) -> Result<Self> {
        let mut config = LoggingConfig::default();
        if let Some(workspace) = workspace_root {
            if let Some(workspace_config) = Self::load_from_workspace(workspace)? {
                config.apply(workspace_config);
            }
        }
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// `<workspace>/.apiflows/config/logging.toml`
    pub fn config_path(workspace_root: &Path) -> PathBuf {
        workspace_root
            .join(".apiflows")
            .join("config")
            .join("logging.toml")
    }

    fn load_from_workspace(workspace_root: &Path) -> Result<Option<TomlLogging>> {
        Self::load_from_file(&Self::config_path(workspace_root))
    }

    fn load_from_file(path: &Path) -> Result<Option<TomlLogging>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read logging config {}", path.display()))?;
        let parsed: TomlLogging = toml::from_str(&content)
            .with_context(|| format!("failed to parse logging config {}", path.display()))?;
        Ok(Some(parsed))
    }

    fn apply(&mut self, toml: TomlLogging) {
        if let Some(logging) = toml.logging {
            if let Some(log_dir) = logging.log_dir {
                self.log_dir = Some(PathBuf::from(log_dir));
            }
            if let Some(default_level) = logging.default_level {
                self.default_level = default_level;
            }
            if let Some(enable_file) = logging.enable_file {
                self.enable_file = enable_file;
            }
            if let Some(console_output) = logging.console_output {
                self.console_output = Some(console_output);
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(level) = env::var(LEVEL_ENV) {
            if !level.trim().is_empty() {
                self.default_level = level.trim().to_string();
            }
        }
    }

    fn validate(&self) -> Result<()> {
        Directive::from_str(&self.default_level)
            .map_err(|_| anyhow!("logging.default_level must be a valid tracing directive"))?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TomlLogging {
    pub logging: Option<TomlLoggingSection>,
}

#[derive(Debug, Deserialize)]
struct TomlLoggingSection {
    pub log_dir: Option<String>,
    pub default_level: Option<String>,
    pub enable_file: Option<bool>,
    #[serde(default)]
    pub console_output: Option<ConsoleOutput>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn write_config(workspace: &Path, content: &str) {
        let path = LoggingConfig::config_path(workspace);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    #[serial]
    fn defaults_without_workspace_file() {
        env::remove_var(LEVEL_ENV);
        let workspace = tempfile::tempdir().unwrap();
        let config = LoggingConfig::load(Some(workspace.path())).unwrap();
        assert_eq!(config, LoggingConfig::default());
    }

    #[test]
    #[serial]
    fn file_then_env_precedence() {
        let workspace = tempfile::tempdir().unwrap();
        write_config(
            workspace.path(),
            "[logging]\ndefault_level = \"warn\"\nenable_file = false\nconsole_output = \"stdout\"\n",
        );

        env::remove_var(LEVEL_ENV);
        let config = LoggingConfig::load(Some(workspace.path())).unwrap();
        assert_eq!(config.default_level, "warn");
        assert!(!config.enable_file);
        assert_eq!(config.console_output, Some(ConsoleOutput::Stdout));

        env::set_var(LEVEL_ENV, "debug");
        let config = LoggingConfig::load(Some(workspace.path())).unwrap();
        assert_eq!(config.default_level, "debug");
        env::remove_var(LEVEL_ENV);
    }

    #[test]
    #[serial]
    fn rejects_invalid_level() {
        env::remove_var(LEVEL_ENV);
        let workspace = tempfile::tempdir().unwrap();
        write_config(workspace.path(), "[logging]\ndefault_level = \"app=verbose\"\n");
        assert!(LoggingConfig::load(Some(workspace.path())).is_err());
    }
}
