#![allow(clippy::result_large_err)]

//! Stub data in apistubs notation and resolution of outbound calls against it.
//!
//! ```yaml
//! {service}:
//!   {method}#{path}:
//!     {status}-{alias}: {content}
//! ```

pub mod externals;
pub mod pattern;
pub mod replay;
pub mod transport;

pub use externals::ExternalServices;
pub use pattern::{select_path, PathTemplate, TemplateError};
pub use replay::ReplayStubs;
pub use transport::{normalize_query, MockResponse, OutboundRequest, ResponseSource};

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use apiflows_types::{EndpointKey, VariantKey};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Response variants of one endpoint keyed by `"<status>-<alias>"`, in file order.
pub type Variants = IndexMap<String, Value>;

/// Endpoints of one service keyed by `"<method>#<path-or-pattern>"`.
pub type ServiceStubs = IndexMap<String, Variants>;

const IGNORED_ROOT_KEY: &str = "apistubs";
const PRUNE_DEPTH: usize = 3;

/// Result of resolving a literal path against stored templates.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution<'a> {
    pub pattern: Option<String>,
    pub variants: Option<&'a Variants>,
}

/// `service -> method#pattern -> status-alias -> content`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StubData {
    services: IndexMap<String, ServiceStubs>,
}

impl StubData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::new(
                ErrorCategory::IoError,
                format!("Failed to read stub file {}: {}", path.display(), e),
            )
        })?;
        Self::from_yaml_str(&content).map_err(|err| err.with_context(path.display().to_string()))
    }

    /// Parse stub YAML, dropping the `apistubs` marker and `_`-prefixed (commented) keys.
    pub fn from_yaml_str(content: &str) -> Result<Self, AppError> {
        let mut document: serde_yaml::Value = serde_yaml::from_str(content)?;
        if document.is_null() {
            return Ok(Self::default());
        }
        if let serde_yaml::Value::Mapping(root) = &mut document {
            root.remove(IGNORED_ROOT_KEY);
        }
        prune_commented(&mut document, 0);
        let services: IndexMap<String, Option<IndexMap<String, Option<Variants>>>> =
            serde_yaml::from_value(document).map_err(|e| {
                AppError::new(
                    ErrorCategory::ValidationError,
                    format!("Invalid stub file layout: {}", e),
                )
                .with_code("STUB-000")
            })?;
        let services = services
            .into_iter()
            .map(|(service, endpoints)| {
                let endpoints = endpoints
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(endpoint, variants)| (endpoint, variants.unwrap_or_default()))
                    .collect();
                (service, endpoints)
            })
            .collect();
        let data = Self { services };
        data.validate()?;
        Ok(data)
    }

    pub fn to_yaml_string(&self) -> Result<String, AppError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Every endpoint key must be `method#path` and every variant key `status-alias`.
    pub fn validate(&self) -> Result<(), AppError> {
        for (service, endpoints) in &self.services {
            for (endpoint, variants) in endpoints {
                endpoint.parse::<EndpointKey>().map_err(|reason| {
                    AppError::new(ErrorCategory::ValidationError, reason)
                        .with_code("STUB-000")
                        .with_context(service.clone())
                })?;
                for variant in variants.keys() {
                    variant.parse::<VariantKey>().map_err(|reason| {
                        AppError::new(ErrorCategory::ValidationError, reason)
                            .with_code("STUB-000")
                            .with_context(format!("{} {}", service, endpoint))
                    })?;
                }
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn services(&self) -> impl Iterator<Item = (&String, &ServiceStubs)> {
        self.services.iter()
    }

    pub fn service(&self, service: &str) -> Option<&ServiceStubs> {
        self.services.get(service)
    }

    pub fn variants(&self, service: &str, endpoint: &str) -> Option<&Variants> {
        self.services.get(service)?.get(endpoint)
    }

    pub fn contains(&self, service: &str, endpoint: &str) -> bool {
        self.variants(service, endpoint).is_some()
    }

    pub fn insert(&mut self, service: &str, endpoint: &str, variants: Variants) {
        self.services
            .entry(service.to_string())
            .or_default()
            .insert(endpoint.to_string(), variants);
    }

    /// Resolve a literal path of `service` to its stored template and, when `method` is
    /// given, the variants stored under `method#template`.
    ///
    /// Templates of every method of the service compete; an unknown endpoint yields
    /// `(None, None)` and is left to dynamic discovery by the caller.
    pub fn resolve(&self, service: &str, path: &str, method: Option<&str>) -> Resolution<'_> {
        let Some(endpoints) = self.services.get(service) else {
            return Resolution {
                pattern: None,
                variants: None,
            };
        };
        let templates: Vec<&str> = endpoints
            .keys()
            .filter_map(|key| key.split_once('#').map(|(_, pattern)| pattern))
            .collect();
        let pattern = select_path(templates, path).map(str::to_string);
        let variants = match (&pattern, method) {
            (Some(pattern), Some(method)) => endpoints.get(&format!("{}#{}", method, pattern)),
            _ => None,
        };
        tracing::debug!(
            service,
            path,
            pattern = pattern.as_deref().unwrap_or("-"),
            "resolved stub path"
        );
        Resolution { pattern, variants }
    }
}

/// Parsed variant keys in stored order. Keys were validated on load.
pub fn variant_keys(variants: &Variants) -> Vec<VariantKey> {
    variants
        .keys()
        .filter_map(|key| key.parse::<VariantKey>().ok())
        .collect()
}

fn prune_commented(value: &mut serde_yaml::Value, depth: usize) {
    if depth == PRUNE_DEPTH {
        return;
    }
    if let serde_yaml::Value::Mapping(mapping) = value {
        mapping.retain(|key, _| !matches!(key.as_str(), Some(text) if text.starts_with('_')));
        for (_, child) in mapping.iter_mut() {
            prune_commented(child, depth + 1);
        }
    }
}
