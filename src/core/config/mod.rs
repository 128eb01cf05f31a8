#![allow(clippy::result_large_err)]

use crate::core::error::AppError;
use crate::core::generalizer::{PathGeneralizer, DEFAULT_TOKEN_NAME, DEFAULT_TOKEN_PATTERNS};
use crate::core::points::Point;
use crate::core::session::GenerationSession;
use crate::core::stub::{ExternalServices, ReplayStubs, StubData};
use crate::core::stubgen::CombinationGenerator;
use crate::core::transformer::expand::DEFAULT_ERROR_STATUSES;
use crate::core::transformer::{ExpandOptions, NormalizeOptions};
use crate::core::types::ErrorCategory;
use serde::{Deserialize, Serialize};

/// Main configuration loaded from apiflows.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ApiflowsConfig {
    /// Generation session settings
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Snapshot normalization settings
    #[serde(default)]
    pub normalizer: NormalizerConfig,

    /// Replay settings
    #[serde(default)]
    pub replay: ReplayConfig,

    /// Host prefix to service name. A configured table replaces the built-in one.
    #[serde(default)]
    pub externals: ExternalServices,
}

/// Generator configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratorConfig {
    /// Upper bound on generated tests; a session runs at most twice as many combinations
    #[serde(default = "default_max_tests")]
    pub max_tests: usize,

    /// Skip the repeat pass used to detect unstable values
    #[serde(default)]
    pub skip_doublerun: bool,

    /// Fold pipelines into a branching tree before writing the snapshot
    #[serde(default = "default_true")]
    pub fold: bool,
}

/// Normalizer configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizerConfig {
    #[serde(default = "default_true")]
    pub generalize_paths: bool,

    /// Regexes a whole path segment must match to count as a token
    #[serde(default = "default_token_patterns")]
    pub token_patterns: Vec<String>,

    #[serde(default = "default_token_name")]
    pub token_name: String,
}

/// Replay configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplayConfig {
    /// Statuses that mark an expanded test as an error test
    #[serde(default = "default_error_statuses")]
    pub error_statuses: Vec<u16>,

    /// Every outbound call must line up with the next declared point
    #[serde(default)]
    pub strict_points: bool,
}

fn default_max_tests() -> usize {
    100
}

fn default_true() -> bool {
    true
}

fn default_token_patterns() -> Vec<String> {
    DEFAULT_TOKEN_PATTERNS.iter().map(|p| p.to_string()).collect()
}

fn default_token_name() -> String {
    DEFAULT_TOKEN_NAME.to_string()
}

fn default_error_statuses() -> Vec<u16> {
    DEFAULT_ERROR_STATUSES.to_vec()
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            max_tests: default_max_tests(),
            skip_doublerun: false,
            fold: true,
        }
    }
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        NormalizerConfig {
            generalize_paths: true,
            token_patterns: default_token_patterns(),
            token_name: default_token_name(),
        }
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        ReplayConfig {
            error_statuses: default_error_statuses(),
            strict_points: false,
        }
    }
}

impl GeneratorConfig {
    /// Combination generator over `data`, with the repeat pass as configured.
    pub fn generator(
        &self,
        data: StubData,
        contexts: Vec<String>,
        initials_count: usize,
        externals: ExternalServices,
    ) -> CombinationGenerator {
        CombinationGenerator::new(data, contexts, initials_count, externals)
            .skip_doublerun(self.skip_doublerun)
    }

    /// Session capped at `max_tests` generated tests.
    pub fn session(&self, generator: CombinationGenerator, initials: Vec<Vec<Point>>) -> GenerationSession {
        GenerationSession::new(generator, initials, self.max_tests)
    }
}

impl NormalizerConfig {
    pub fn path_generalizer(&self) -> Result<Option<PathGeneralizer>, AppError> {
        if !self.generalize_paths {
            return Ok(None);
        }
        PathGeneralizer::new(&self.token_patterns, &self.token_name)
            .map(Some)
            .map_err(|e| {
                AppError::new(
                    ErrorCategory::ValidationError,
                    format!("Invalid normalizer.token_patterns: {}", e),
                )
                .with_code("CFG-003")
            })
    }

    pub fn options(&self) -> Result<NormalizeOptions, AppError> {
        let mut options = NormalizeOptions::default();
        if let Some(generalizer) = self.path_generalizer()? {
            options = options.with_path_generalizer(generalizer);
        }
        Ok(options)
    }
}

impl ReplayConfig {
    pub fn replay_stubs(&self, data: StubData, externals: ExternalServices) -> ReplayStubs {
        ReplayStubs::new(data, externals).strict(self.strict_points)
    }

    pub fn expand_options(&self) -> ExpandOptions {
        ExpandOptions {
            error_statuses: self.error_statuses.clone(),
            ..Default::default()
        }
    }
}


pub mod loader;
pub mod validation;

pub use loader::ConfigLoader;
pub use validation::ConfigValidator;
