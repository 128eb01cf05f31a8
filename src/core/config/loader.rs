#![allow(clippy::result_large_err)]

use super::ApiflowsConfig;
use crate::core::error::AppError;
use std::env;
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "apiflows.toml";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load config from workspace root (workspace/apiflows.toml)
    /// Environment variables override config file values
    /// A missing file yields defaults + env vars
    pub fn load_from_workspace(workspace_path: &Path) -> Result<ApiflowsConfig, AppError> {
        let config_path = workspace_path.join(CONFIG_FILE_NAME);
        let config_file = Self::load_from_file(&config_path)?;

        let mut config = config_file.unwrap_or_default();

        // Apply environment variable overrides
        Self::apply_env_overrides(&mut config);

        Ok(config)
    }

    /// Load config from specific file path
    /// Returns Ok(None) if file doesn't exist
    pub fn load_from_file(path: &Path) -> Result<Option<ApiflowsConfig>, AppError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::new(
                crate::core::types::ErrorCategory::IoError,
                format!("Failed to read config file {}: {}", path.display(), e),
            )
            .with_code("CFG-001")
        })?;

        let config: ApiflowsConfig = toml::from_str(&content).map_err(|e| {
            AppError::new(
                crate::core::types::ErrorCategory::ValidationError,
                format!("Failed to parse config file {}: {}", path.display(), e),
            )
            .with_code("CFG-002")
        })?;

        Ok(Some(config))
    }

    /// Apply environment variable overrides to the configuration
    /// Unparseable values are ignored
    fn apply_env_overrides(config: &mut ApiflowsConfig) {
        // Generator overrides
        if let Some(max_tests) = parsed_var("APIFLOWS_GENERATOR_MAX_TESTS") {
            config.generator.max_tests = max_tests;
        }

        if let Some(skip) = parsed_var("APIFLOWS_GENERATOR_SKIP_DOUBLERUN") {
            config.generator.skip_doublerun = skip;
        }

        if let Some(fold) = parsed_var("APIFLOWS_GENERATOR_FOLD") {
            config.generator.fold = fold;
        }

        // Normalizer overrides
        if let Some(generalize) = parsed_var("APIFLOWS_NORMALIZER_GENERALIZE_PATHS") {
            config.normalizer.generalize_paths = generalize;
        }

        if let Ok(token_name) = env::var("APIFLOWS_NORMALIZER_TOKEN_NAME") {
            config.normalizer.token_name = token_name;
        }

        // Replay overrides
        if let Ok(statuses) = env::var("APIFLOWS_REPLAY_ERROR_STATUSES") {
            let parsed: Result<Vec<u16>, _> = statuses
                .split(',')
                .map(|status| status.trim().parse::<u16>())
                .collect();
            if let Ok(parsed) = parsed {
                config.replay.error_statuses = parsed;
            }
        }

        if let Some(strict) = parsed_var("APIFLOWS_REPLAY_STRICT_POINTS") {
            config.replay.strict_points = strict;
        }
    }

    /// Get documentation for supported environment variables
    pub fn env_var_documentation() -> &'static [&'static str] {
        &[
            "APIFLOWS_GENERATOR_MAX_TESTS - Override the generated test budget (default: 100)",
            "APIFLOWS_GENERATOR_SKIP_DOUBLERUN - Skip the repeat pass (true/false, default: false)",
            "APIFLOWS_GENERATOR_FOLD - Fold pipelines into a tree (true/false, default: true)",
            "APIFLOWS_NORMALIZER_GENERALIZE_PATHS - Rewrite token path segments (true/false, default: true)",
            "APIFLOWS_NORMALIZER_TOKEN_NAME - Placeholder name for path tokens (default: token)",
            "APIFLOWS_REPLAY_ERROR_STATUSES - Comma separated error statuses (default: 408,500,503)",
            "APIFLOWS_REPLAY_STRICT_POINTS - Require calls to follow declared points (true/false, default: false)",
            "APIFLOWS_LOG_LEVEL - Override the default log level",
        ]
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|value| value.trim().parse().ok())
}
