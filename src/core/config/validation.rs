#![allow(clippy::result_large_err)]

use super::ApiflowsConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;

pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate configuration rules
    pub fn validate(config: &ApiflowsConfig) -> Result<(), AppError> {
        if config.generator.max_tests == 0 {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                "generator.max_tests must be greater than 0",
            )
            .with_code("CFG-004"));
        }

        let mut normalizer = config.normalizer.clone();
        normalizer.generalize_paths = true;
        normalizer.path_generalizer()?;

        if config.normalizer.token_name.trim().is_empty() {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                "normalizer.token_name cannot be empty",
            )
            .with_code("CFG-005"));
        }

        if let Some(status) = config
            .replay
            .error_statuses
            .iter()
            .find(|status| !(100..=599).contains(*status))
        {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                format!("replay.error_statuses contains invalid HTTP status {}", status),
            )
            .with_code("CFG-006"));
        }

        Ok(())
    }
}
